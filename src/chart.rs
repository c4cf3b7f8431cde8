//! The packed parse chart.
//!
//! Cells are laid out in one flat array per field, `capacity` entries per cell,
//! indexed by span length then start position. Each cell keeps only the
//! non-terminals that survived its beam, sorted by id, together with their
//! inside and outside values, Viterbi log score and best backpointer.
//!
//! A cell moves `Empty -> InProgress -> Finalized`. [`Chart::open_cell`] lends
//! out a dense [`ScratchCell`] to accumulate into; [`Chart::finalize_cell`]
//! copies the selected entries back and keeps the scratch buffer for the next cell.

use std::fmt;
use std::marker::PhantomData;

use crate::grammar::SparseGrammar;
use crate::packing::{INVALID, Unpacked};
use crate::rules::NonTerminal;
use crate::semiring::{ProbabilitySemiring, Real};

/// Position of cell `(start, end)` among all cells of an `n`-word chart.
/// Span-1 cells come first, then span 2, and so on.
#[inline]
pub fn cell_index(start: usize, end: usize, n: usize) -> usize {
  debug_assert!(start < end && end <= n);
  let span = end - start;
  (n * (n + 1) - (n - span + 1) * (n - span + 2)) / 2 + start
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellState {
  #[default]
  Empty,
  /// A scratch buffer is out for this cell
  InProgress,
  Finalized { len: usize },
}

/// Dense per-cell accumulator, sized to the grammar's non-terminal count
#[derive(Debug, Clone)]
pub struct ScratchCell<S: ProbabilitySemiring = Real> {
  pub start: usize,
  pub end: usize,
  /// semiring values at `inside_step`
  pub inside: Vec<f64>,
  /// Viterbi log score
  pub viterbi: Vec<f64>,
  pub children: Vec<i32>,
  pub midpoints: Vec<u32>,
  pub inside_step: i32,
  touched: Vec<NonTerminal>,
  present: Vec<bool>,
  _semiring: PhantomData<S>,
}

impl<S: ProbabilitySemiring> ScratchCell<S> {
  pub fn new(num_nts: usize) -> Self {
    Self {
      start: 0,
      end: 0,
      inside: vec![S::zero(); num_nts],
      viterbi: vec![f64::NEG_INFINITY; num_nts],
      children: vec![INVALID; num_nts],
      midpoints: vec![0; num_nts],
      inside_step: 0,
      touched: Vec::new(),
      present: vec![false; num_nts],
      _semiring: PhantomData,
    }
  }

  /// Clears the entries written since the last clear
  fn clear(&mut self) {
    for &nt in self.touched.iter() {
      let nt = nt as usize;
      self.inside[nt] = S::zero();
      self.viterbi[nt] = f64::NEG_INFINITY;
      self.children[nt] = INVALID;
      self.midpoints[nt] = 0;
      self.present[nt] = false;
    }
    self.touched.clear();
    self.inside_step = 0;
  }

  #[inline]
  fn touch(&mut self, nt: NonTerminal) {
    if !self.present[nt as usize] {
      self.present[nt as usize] = true;
      self.touched.push(nt);
    }
  }

  /// Adds `value` to the inside sum of `nt`
  #[inline]
  pub fn add_inside(&mut self, nt: NonTerminal, value: f64) {
    self.touch(nt);
    let slot = &mut self.inside[nt as usize];
    *slot = S::plus(*slot, value);
  }

  /// Overwrites the inside value of `nt`
  #[inline]
  pub fn set_inside(&mut self, nt: NonTerminal, value: f64) {
    self.touch(nt);
    self.inside[nt as usize] = value;
  }

  /// Records a derivation of `nt` if it strictly improves its Viterbi score
  #[inline]
  pub fn relax(&mut self, nt: NonTerminal, score: f64, children: i32, midpoint: u32) -> bool {
    self.touch(nt);
    let n = nt as usize;
    if score > self.viterbi[n] {
      self.viterbi[n] = score;
      self.children[n] = children;
      self.midpoints[n] = midpoint;
      true
    } else {
      false
    }
  }

  /// Like [`relax`](Self::relax), but an equal score also takes over the backpointer
  #[inline]
  pub fn relax_or_tie(&mut self, nt: NonTerminal, score: f64, children: i32, midpoint: u32) -> bool {
    self.touch(nt);
    let n = nt as usize;
    if score >= self.viterbi[n] {
      self.viterbi[n] = score;
      self.children[n] = children;
      self.midpoints[n] = midpoint;
      true
    } else {
      false
    }
  }

  /// Non-terminals written since the cell was opened, in first-write order
  pub fn touched(&self) -> &[NonTerminal] {
    &self.touched
  }

  pub fn is_present(&self, nt: NonTerminal) -> bool {
    self.present[nt as usize]
  }

  /// Highest Viterbi score among the written entries
  pub fn max_viterbi(&self) -> f64 {
    self
      .touched
      .iter()
      .map(|&nt| self.viterbi[nt as usize])
      .fold(f64::NEG_INFINITY, f64::max)
  }
}

/// Read-only view of a finalized cell
#[derive(Debug, Clone, Copy)]
pub struct Cell<'a> {
  pub start: usize,
  pub end: usize,
  /// sorted ascending
  pub nts: &'a [NonTerminal],
  pub inside: &'a [f64],
  pub outside: &'a [f64],
  pub viterbi: &'a [f64],
  pub children: &'a [i32],
  pub midpoints: &'a [u32],
  pub inside_step: i32,
  pub outside_step: i32,
}

impl<'a> Cell<'a> {
  pub fn len(&self) -> usize {
    self.nts.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nts.is_empty()
  }

  pub fn span(&self) -> usize {
    self.end - self.start
  }

  /// Entry index of `nt`, by binary search
  #[inline]
  pub fn index_of(&self, nt: NonTerminal) -> Option<usize> {
    self.nts.binary_search(&nt).ok()
  }

  pub fn contains(&self, nt: NonTerminal) -> bool {
    self.index_of(nt).is_some()
  }

  /// Natural log of the unscaled inside value of entry `i`
  pub fn inside_ln<S: ProbabilitySemiring>(&self, i: usize) -> f64 {
    S::ln(self.inside[i], self.inside_step)
  }

  pub fn outside_ln<S: ProbabilitySemiring>(&self, i: usize) -> f64 {
    S::ln(self.outside[i], self.outside_step)
  }

  /// Entry with the highest Viterbi score; ties go to the smaller id
  pub fn best_entry(&self) -> Option<usize> {
    (0..self.len()).fold(None, |best, i| match best {
      Some(b) if self.viterbi[b] >= self.viterbi[i] => Some(b),
      _ => Some(i),
    })
  }
}

#[derive(Debug, Clone)]
pub struct Chart<S: ProbabilitySemiring = Real> {
  size: usize,
  num_nts: usize,
  capacity: usize,
  states: Vec<CellState>,
  nts: Vec<NonTerminal>,
  inside: Vec<f64>,
  outside: Vec<f64>,
  viterbi: Vec<f64>,
  children: Vec<i32>,
  midpoints: Vec<u32>,
  inside_steps: Vec<i32>,
  outside_steps: Vec<i32>,
  spare: Vec<ScratchCell<S>>,
}

impl<S: ProbabilitySemiring> Chart<S> {
  /// A chart for an `size`-word sentence keeping at most `capacity` entries per cell
  pub fn new(size: usize, num_nts: usize, capacity: usize) -> Self {
    let mut chart = Self {
      size: 0,
      num_nts,
      capacity: 0,
      states: Vec::new(),
      nts: Vec::new(),
      inside: Vec::new(),
      outside: Vec::new(),
      viterbi: Vec::new(),
      children: Vec::new(),
      midpoints: Vec::new(),
      inside_steps: Vec::new(),
      outside_steps: Vec::new(),
      spare: Vec::new(),
    };
    chart.reset(size, capacity);
    chart
  }

  /// Makes the chart indistinguishable from `Chart::new(size, num_nts, capacity)`,
  /// reusing its allocations
  pub fn reset(&mut self, size: usize, capacity: usize) {
    let capacity = capacity.clamp(1, self.num_nts.max(1));
    let cells = size * (size + 1) / 2;
    let entries = cells * capacity;
    self.size = size;
    self.capacity = capacity;

    fn refill<T: Clone>(v: &mut Vec<T>, len: usize, value: T) {
      v.clear();
      v.resize(len, value);
    }
    refill(&mut self.states, cells, CellState::Empty);
    refill(&mut self.inside_steps, cells, 0);
    refill(&mut self.outside_steps, cells, 0);
    refill(&mut self.nts, entries, 0);
    refill(&mut self.inside, entries, S::zero());
    refill(&mut self.outside, entries, S::zero());
    refill(&mut self.viterbi, entries, f64::NEG_INFINITY);
    refill(&mut self.children, entries, INVALID);
    refill(&mut self.midpoints, entries, 0);
  }

  /// Sentence length
  pub fn size(&self) -> usize {
    self.size
  }

  /// Entries allowed per cell
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn num_nts(&self) -> usize {
    self.num_nts
  }

  pub fn state(&self, start: usize, end: usize) -> CellState {
    self.states[cell_index(start, end, self.size)]
  }

  /// Moves an empty cell to `InProgress` and hands out a cleared scratch buffer for it
  pub fn open_cell(&mut self, start: usize, end: usize) -> ScratchCell<S> {
    let idx = cell_index(start, end, self.size);
    assert_eq!(
      self.states[idx],
      CellState::Empty,
      "cell {}..{} opened twice",
      start,
      end
    );
    self.states[idx] = CellState::InProgress;
    let mut scratch = self
      .spare
      .pop()
      .unwrap_or_else(|| ScratchCell::new(self.num_nts));
    scratch.start = start;
    scratch.end = end;
    scratch
  }

  /// Copies the `selected` entries of `scratch` into its cell, rescales them,
  /// and takes the scratch buffer back. Unselected entries are dropped.
  pub fn finalize_cell(&mut self, mut scratch: ScratchCell<S>, selected: &mut Vec<NonTerminal>) {
    let (start, end) = (scratch.start, scratch.end);
    let idx = cell_index(start, end, self.size);
    assert_eq!(self.states[idx], CellState::InProgress);
    assert!(
      selected.len() <= self.capacity,
      "{} entries selected for a cell of capacity {}",
      selected.len(),
      self.capacity
    );

    selected.sort_unstable();
    selected.dedup();
    let offset = idx * self.capacity;
    for (i, &nt) in selected.iter().enumerate() {
      let n = nt as usize;
      self.nts[offset + i] = nt;
      self.inside[offset + i] = scratch.inside[n];
      self.outside[offset + i] = S::zero();
      self.viterbi[offset + i] = scratch.viterbi[n];
      self.children[offset + i] = scratch.children[n];
      self.midpoints[offset + i] = scratch.midpoints[n];
    }
    let len = selected.len();
    self.inside_steps[idx] = S::scale(&mut self.inside[offset..offset + len], scratch.inside_step);
    self.states[idx] = CellState::Finalized { len };

    scratch.clear();
    self.spare.push(scratch);
  }

  /// Finalizes a cell the parser never populates
  pub fn finalize_empty(&mut self, start: usize, end: usize) {
    let idx = cell_index(start, end, self.size);
    assert_eq!(self.states[idx], CellState::Empty);
    self.states[idx] = CellState::Finalized { len: 0 };
  }

  /// View of a cell. Cells that aren't finalized yet read as empty.
  pub fn cell(&self, start: usize, end: usize) -> Cell<'_> {
    let idx = cell_index(start, end, self.size);
    let len = match self.states[idx] {
      CellState::Finalized { len } => len,
      _ => 0,
    };
    let range = idx * self.capacity..idx * self.capacity + len;
    Cell {
      start,
      end,
      nts: &self.nts[range.clone()],
      inside: &self.inside[range.clone()],
      outside: &self.outside[range.clone()],
      viterbi: &self.viterbi[range.clone()],
      children: &self.children[range.clone()],
      midpoints: &self.midpoints[range],
      inside_step: self.inside_steps[idx],
      outside_step: self.outside_steps[idx],
    }
  }

  /// Stores the outside values of a finalized cell from a dense `|V|` vector at scale `step`
  pub fn set_outside(&mut self, start: usize, end: usize, dense: &[f64], step: i32) {
    let idx = cell_index(start, end, self.size);
    let len = match self.states[idx] {
      CellState::Finalized { len } => len,
      state => panic!("outside written to cell {}..{} in state {:?}", start, end, state),
    };
    let offset = idx * self.capacity;
    for i in offset..offset + len {
      self.outside[i] = dense[self.nts[i] as usize];
    }
    self.outside_steps[idx] = S::scale(&mut self.outside[offset..offset + len], step);
  }

  /// Log inside probability of `nt` over the whole sentence, `-inf` if it isn't in the top cell
  pub fn root_inside_ln(&self, nt: NonTerminal) -> f64 {
    if self.size == 0 {
      return f64::NEG_INFINITY;
    }
    let top = self.cell(0, self.size);
    top
      .index_of(nt)
      .map(|i| top.inside_ln::<S>(i))
      .unwrap_or(f64::NEG_INFINITY)
  }

  /// Total number of entries across all finalized cells
  pub fn num_entries(&self) -> usize {
    self
      .states
      .iter()
      .map(|s| match s {
        CellState::Finalized { len } => *len,
        _ => 0,
      })
      .sum()
  }

  /// Renders the chart with grammar labels
  pub fn display<'a>(&'a self, grammar: &'a SparseGrammar) -> ChartDisplay<'a, S> {
    ChartDisplay {
      chart: self,
      grammar,
    }
  }
}

impl<S: ProbabilitySemiring> PartialEq for Chart<S> {
  /// Compares everything a parse can observe; spare scratch buffers are not part of the state
  fn eq(&self, other: &Self) -> bool {
    self.size == other.size
      && self.num_nts == other.num_nts
      && self.capacity == other.capacity
      && self.states == other.states
      && self.nts == other.nts
      && self.inside == other.inside
      && self.outside == other.outside
      && self.viterbi == other.viterbi
      && self.children == other.children
      && self.midpoints == other.midpoints
      && self.inside_steps == other.inside_steps
      && self.outside_steps == other.outside_steps
  }
}

pub struct ChartDisplay<'a, S: ProbabilitySemiring> {
  chart: &'a Chart<S>,
  grammar: &'a SparseGrammar,
}

impl<'a, S: ProbabilitySemiring> fmt::Display for ChartDisplay<'a, S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let n = self.chart.size();
    let packing = self.grammar.packing();
    for span in 1..=n {
      for start in 0..=n - span {
        let cell = self.chart.cell(start, start + span);
        if cell.is_empty() {
          continue;
        }
        writeln!(f, "{}..{}:", cell.start, cell.end)?;
        for i in 0..cell.len() {
          let derivation = match packing.unpack(cell.children[i]) {
            Unpacked::Binary(l, r) => format!(
              "{} {} @{}",
              self.grammar.nt_name(l),
              self.grammar.nt_name(r),
              cell.midpoints[i]
            ),
            Unpacked::Unary(c) => self.grammar.nt_name(c).to_string(),
            Unpacked::Lexical(t) => self.grammar.terminals().name(t).to_string(),
            Unpacked::Invalid => "?".to_string(),
          };
          writeln!(
            f,
            "  {} -> {}  inside={:.4} outside={:.4} viterbi={:.4}",
            self.grammar.nt_name(cell.nts[i]),
            derivation,
            cell.inside_ln::<S>(i),
            cell.outside_ln::<S>(i),
            cell.viterbi[i],
          )?;
        }
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::semiring::Log;

  #[test]
  fn test_cell_index_is_dense() {
    let n = 5;
    let mut seen = vec![false; n * (n + 1) / 2];
    for span in 1..=n {
      for start in 0..=n - span {
        let idx = cell_index(start, start + span, n);
        assert!(!seen[idx]);
        seen[idx] = true;
      }
    }
    assert!(seen.iter().all(|&s| s));
    assert_eq!(cell_index(0, 1, n), 0);
    assert_eq!(cell_index(0, n, n), n * (n + 1) / 2 - 1);
  }

  fn fill_cell<S: ProbabilitySemiring>(chart: &mut Chart<S>, start: usize, end: usize) {
    let mut scratch = chart.open_cell(start, end);
    scratch.add_inside(4, S::weight(0.5, 0.5f64.ln()));
    scratch.relax(4, 0.5f64.ln(), -5, 0);
    scratch.add_inside(1, S::weight(0.25, 0.25f64.ln()));
    scratch.relax(1, 0.25f64.ln(), -2, 0);
    scratch.add_inside(7, S::weight(0.1, 0.1f64.ln()));
    let mut selected = vec![4, 1];
    chart.finalize_cell(scratch, &mut selected);
  }

  #[test]
  fn test_finalize_keeps_selected_sorted() {
    let mut chart: Chart = Chart::new(3, 10, 4);
    fill_cell(&mut chart, 1, 2);
    let cell = chart.cell(1, 2);
    assert_eq!(cell.nts, &[1, 4]);
    assert!((cell.inside[0] - 0.25).abs() < 1e-12);
    assert_eq!(cell.children, &[-2, -5]);
    assert_eq!(cell.index_of(4), Some(1));
    assert_eq!(cell.index_of(7), None);
    assert_eq!(cell.best_entry(), Some(1));
    assert_eq!(chart.state(1, 2), CellState::Finalized { len: 2 });
    assert_eq!(chart.state(0, 1), CellState::Empty);
    assert!(chart.cell(0, 1).is_empty());
  }

  #[test]
  fn test_log_chart() {
    let mut chart: Chart<Log> = Chart::new(2, 10, 4);
    fill_cell(&mut chart, 0, 1);
    let cell = chart.cell(0, 1);
    assert!((cell.inside_ln::<Log>(1) - 0.5f64.ln()).abs() < 1e-12);
  }

  #[test]
  #[should_panic]
  fn test_open_twice_panics() {
    let mut chart: Chart = Chart::new(2, 10, 4);
    let _a = chart.open_cell(0, 1);
    let _b = chart.open_cell(0, 1);
  }

  #[test]
  fn test_outside_is_scaled() {
    let mut chart: Chart = Chart::new(1, 10, 4);
    fill_cell(&mut chart, 0, 1);
    let mut dense = vec![0.0; 10];
    dense[1] = 1e-120;
    dense[4] = 3e-121;
    chart.set_outside(0, 1, &dense, 0);
    let cell = chart.cell(0, 1);
    assert_eq!(cell.outside_step, -2);
    assert!((cell.outside_ln::<Real>(0) - 1e-120f64.ln()).abs() < 1e-9);
  }

  #[test]
  fn test_reset_reproduces_fresh_chart() {
    let mut chart: Chart = Chart::new(4, 10, 4);
    fill_cell(&mut chart, 0, 1);
    fill_cell(&mut chart, 2, 4);
    chart.finalize_empty(1, 2);

    chart.reset(3, 4);
    assert_eq!(chart, Chart::new(3, 10, 4));

    chart.reset(4, 6);
    assert_eq!(chart, Chart::new(4, 10, 6));
  }
}
