//! Packing functions: map a pair of child non-terminals onto a single matrix column.
//!
//! Binary pairs go through a [`PerfectHash`] built over the pairs the grammar
//! actually contains, so the column space grows with the number of valid pairs
//! rather than with |V|². Unary and lexical productions get closed-form negative
//! columns so that a packed value alone says what kind of production it is.

use crate::rules::{NonTerminal, Terminal};

/// Returned for pairs that never occur together in a production
pub const INVALID: i32 = i32::MIN;

/// What a packed column decodes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unpacked {
  Binary(NonTerminal, NonTerminal),
  Unary(NonTerminal),
  Lexical(Terminal),
  Invalid,
}

/// Displacement-table perfect hash over a fixed set of `(k1, k2)` pairs.
///
/// Each `k1` owns a segment of the key table. Inside a segment, `k2` is split
/// into `(row, col) = (k2 >> shift, k2 & mask)` of an `m x m` matrix, and each
/// row is shifted by its own displacement so that no two occupied columns of
/// different rows land on the same slot. The packed value is the global slot
/// index, which is verified against the stored key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerfectHash {
  shift: u32,
  mask: u32,
  /// rows per k1 (`m`)
  rows: usize,
  /// `displacements[k1 * rows + row]`, relative to the k1 segment
  displacements: Vec<u32>,
  /// `segment_offsets[k1]..segment_offsets[k1 + 1]` is k1's slice of `keys`
  segment_offsets: Vec<u32>,
  /// the k2 stored at each slot, -1 for empty slots
  keys: Vec<i32>,
  pairs: usize,
}

impl PerfectHash {
  /// Builds the table for `num_k1` first keys. Pairs may repeat.
  pub fn new<I>(num_k1: usize, pairs: I) -> Self
  where
    I: IntoIterator<Item = (u16, u16)>,
  {
    let mut by_k1: Vec<Vec<u16>> = vec![Vec::new(); num_k1];
    let mut max_k2 = 0u32;
    for (k1, k2) in pairs {
      assert!((k1 as usize) < num_k1, "k1 {} out of range {}", k1, num_k1);
      by_k1[k1 as usize].push(k2);
      max_k2 = max_k2.max(k2 as u32);
    }
    for k2s in by_k1.iter_mut() {
      k2s.sort_unstable();
      k2s.dedup();
    }

    // m x m must cover every k2
    let m = ((max_k2 + 1) as f64).sqrt().ceil().max(1.0) as u32;
    let m = m.next_power_of_two();
    let shift = m.trailing_zeros();
    let mask = m - 1;
    let rows = m as usize;

    let mut displacements = vec![0u32; num_k1 * rows];
    let mut segment_offsets = Vec::with_capacity(num_k1 + 1);
    let mut keys: Vec<i32> = Vec::new();
    let mut pairs = 0;

    for (k1, k2s) in by_k1.iter().enumerate() {
      segment_offsets.push(keys.len() as u32);

      if k2s.is_empty() {
        // one slot that never matches
        keys.push(-1);
        continue;
      }
      pairs += k2s.len();

      let mut row_members: Vec<Vec<u16>> = vec![Vec::new(); rows];
      for &k2 in k2s {
        row_members[(k2 >> shift) as usize].push(k2);
      }

      // most populated rows first, first fit
      let mut order: Vec<usize> = (0..rows).filter(|&r| !row_members[r].is_empty()).collect();
      order.sort_by(|&a, &b| row_members[b].len().cmp(&row_members[a].len()).then(a.cmp(&b)));

      let mut occupied: Vec<bool> = Vec::new();
      for row in order {
        let cols: Vec<usize> = row_members[row]
          .iter()
          .map(|&k2| (k2 as u32 & mask) as usize)
          .collect();
        let mut d = 0usize;
        while cols.iter().any(|&c| occupied.get(d + c).copied().unwrap_or(false)) {
          d += 1;
        }
        for &c in cols.iter() {
          if occupied.len() <= d + c {
            occupied.resize(d + c + 1, false);
          }
          occupied[d + c] = true;
        }
        displacements[k1 * rows + row] = d as u32;
      }

      let base = keys.len();
      keys.resize(base + occupied.len(), -1);
      for &k2 in k2s {
        let row = (k2 >> shift) as usize;
        let slot = displacements[k1 * rows + row] as usize + (k2 as u32 & mask) as usize;
        debug_assert_eq!(keys[base + slot], -1);
        keys[base + slot] = k2 as i32;
      }
    }
    segment_offsets.push(keys.len() as u32);

    Self {
      shift,
      mask,
      rows,
      displacements,
      segment_offsets,
      keys,
      pairs,
    }
  }

  /// The slot of `(k1, k2)`, or [`INVALID`]
  #[inline]
  pub fn pack(&self, k1: u16, k2: u16) -> i32 {
    let k1 = k1 as usize;
    if k1 + 1 >= self.segment_offsets.len() {
      return INVALID;
    }
    let row = (k2 >> self.shift) as usize;
    if row >= self.rows {
      return INVALID;
    }
    let start = self.segment_offsets[k1] as usize;
    let end = self.segment_offsets[k1 + 1] as usize;
    let slot = start + self.displacements[k1 * self.rows + row] as usize + (k2 as u32 & self.mask) as usize;
    if slot < end && self.keys[slot] == k2 as i32 {
      slot as i32
    } else {
      INVALID
    }
  }

  /// Inverse of [`pack`](Self::pack) for slots that hold a pair
  pub fn unpack(&self, packed: i32) -> Option<(u16, u16)> {
    if packed < 0 || packed as usize >= self.keys.len() {
      return None;
    }
    let slot = packed as usize;
    let k2 = self.keys[slot];
    if k2 < 0 {
      return None;
    }
    let k1 = self.segment_offsets.partition_point(|&o| o as usize <= slot) - 1;
    Some((k1 as u16, k2 as u16))
  }

  /// Number of slots, i.e. the number of columns a matrix keyed by this hash needs
  pub fn size(&self) -> usize {
    self.keys.len()
  }

  /// Number of distinct pairs stored
  pub fn len(&self) -> usize {
    self.pairs
  }

  pub fn is_empty(&self) -> bool {
    self.pairs == 0
  }
}

/// Packing for every kind of production: binary pairs are hashed, unary
/// children map to `-child - 1` and lexical terminals to `-|V| - 1 - terminal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackingFunction {
  hash: PerfectHash,
  num_nts: i32,
}

impl PackingFunction {
  pub fn new<I>(num_nts: usize, pairs: I) -> Self
  where
    I: IntoIterator<Item = (NonTerminal, NonTerminal)>,
  {
    Self {
      hash: PerfectHash::new(num_nts, pairs),
      num_nts: num_nts as i32,
    }
  }

  #[inline]
  pub fn pack(&self, left: NonTerminal, right: NonTerminal) -> i32 {
    self.hash.pack(left, right)
  }

  #[inline]
  pub fn pack_unary(&self, child: NonTerminal) -> i32 {
    -(child as i32) - 1
  }

  #[inline]
  pub fn pack_lexical(&self, terminal: Terminal) -> i32 {
    debug_assert!((terminal as i64) < i32::MAX as i64 - self.num_nts as i64 - 1);
    -self.num_nts - 1 - terminal as i32
  }

  pub fn unpack(&self, packed: i32) -> Unpacked {
    if packed == INVALID {
      Unpacked::Invalid
    } else if packed >= 0 {
      match self.hash.unpack(packed) {
        Some((l, r)) => Unpacked::Binary(l, r),
        None => Unpacked::Invalid,
      }
    } else if packed >= -self.num_nts {
      Unpacked::Unary((-packed - 1) as NonTerminal)
    } else {
      Unpacked::Lexical((-packed - 1 - self.num_nts) as Terminal)
    }
  }

  /// Left child of a binary column, the child of a unary one, the terminal of a lexical one
  pub fn unpack_left_child(&self, packed: i32) -> Option<u32> {
    match self.unpack(packed) {
      Unpacked::Binary(l, _) => Some(l as u32),
      Unpacked::Unary(c) => Some(c as u32),
      Unpacked::Lexical(t) => Some(t),
      Unpacked::Invalid => None,
    }
  }

  /// Right child of a binary column; `None` for everything else
  pub fn unpack_right_child(&self, packed: i32) -> Option<NonTerminal> {
    match self.unpack(packed) {
      Unpacked::Binary(_, r) => Some(r),
      _ => None,
    }
  }

  /// Columns needed by a matrix keyed by binary packings
  pub fn num_columns(&self) -> usize {
    self.hash.size()
  }

  pub fn num_pairs(&self) -> usize {
    self.hash.len()
  }
}
