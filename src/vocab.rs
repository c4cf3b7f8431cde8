use std::fmt;

use integeriser::{HashIntegeriser, Integeriser};

/// Prefix marking non-terminals introduced by binarization
pub const FACTORED_PREFIX: char = '@';

/// Terminal that unknown input words fall back to
pub const UNKNOWN_WORD: &str = "UNK";

/// Bidirectional string <-> dense id interning
#[derive(Debug, Clone)]
pub struct SymbolTable {
  integeriser: HashIntegeriser<String>,
  len: usize,
}

impl SymbolTable {
  pub fn new() -> Self {
    Self {
      integeriser: HashIntegeriser::new(),
      len: 0,
    }
  }

  /// Returns the id of `name`, adding it if it isn't present yet
  pub fn intern(&mut self, name: &str) -> u32 {
    if let Some(id) = self.get(name) {
      return id;
    }
    self.len += 1;
    self.integeriser.integerise(name.to_string()) as u32
  }

  pub fn get(&self, name: &str) -> Option<u32> {
    self.integeriser.find_key(&name.to_string()).map(|id| id as u32)
  }

  /// Panics on ids that were never interned
  pub fn name(&self, id: u32) -> &str {
    match self.integeriser.find_value(id as usize) {
      Some(name) => name,
      None => panic!("symbol id {} out of range for a table of {}", id, self.len),
    }
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
    (0..self.len).filter_map(|id| {
      self
        .integeriser
        .find_value(id)
        .map(|name| (id as u32, name.as_str()))
    })
  }
}

impl Default for SymbolTable {
  fn default() -> Self {
    Self::new()
  }
}

impl PartialEq for SymbolTable {
  fn eq(&self, other: &Self) -> bool {
    self.len == other.len && self.iter().eq(other.iter())
  }
}

impl Eq for SymbolTable {}

impl<S: AsRef<str>> FromIterator<S> for SymbolTable {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    let mut table = Self::new();
    for name in iter {
      table.intern(name.as_ref());
    }
    table
  }
}

impl fmt::Display for SymbolTable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (id, name) in self.iter() {
      writeln!(f, "{}\t{}", id, name)?;
    }
    Ok(())
  }
}

pub fn is_factored_label(label: &str) -> bool {
  label.starts_with(FACTORED_PREFIX)
}

/// Strips a latent split annotation: `NP_12` -> `NP`. Labels without one are their own base.
pub fn base_label(label: &str) -> &str {
  regex_static!(SPLIT_SUFFIX, r"^(.+?)_\d+$");
  SPLIT_SUFFIX
    .captures(label)
    .and_then(|caps| caps.get(1))
    .map(|m| m.as_str())
    .unwrap_or(label)
}

/// Maps split non-terminals of a latent-variable grammar back to their base labels
#[derive(Debug, Clone, PartialEq)]
pub struct SplitVocabulary {
  base_of: Vec<u16>,
  bases: SymbolTable,
  splits: Vec<Vec<u16>>,
  factored: Vec<bool>,
}

impl SplitVocabulary {
  /// `labels` are the grammar's non-terminal names in id order
  pub fn new<'a, I>(labels: I) -> Self
  where
    I: IntoIterator<Item = &'a str>,
  {
    let mut bases = SymbolTable::new();
    let mut base_of = Vec::new();
    let mut splits: Vec<Vec<u16>> = Vec::new();

    for (nt, label) in labels.into_iter().enumerate() {
      let base = bases.intern(base_label(label)) as usize;
      if base == splits.len() {
        splits.push(Vec::new());
      }
      splits[base].push(nt as u16);
      base_of.push(base as u16);
    }

    let factored = bases.iter().map(|(_, name)| is_factored_label(name)).collect();

    Self {
      base_of,
      bases,
      splits,
      factored,
    }
  }

  #[inline]
  pub fn base(&self, nt: u16) -> u16 {
    self.base_of[nt as usize]
  }

  pub fn base_name(&self, base: u16) -> &str {
    self.bases.name(base as u32)
  }

  /// Split non-terminals of `base`, in id order
  pub fn splits_of(&self, base: u16) -> &[u16] {
    &self.splits[base as usize]
  }

  #[inline]
  pub fn is_factored_base(&self, base: u16) -> bool {
    self.factored[base as usize]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_symbol_table() {
    let mut t = SymbolTable::new();
    assert_eq!(t.intern("NP"), 0);
    assert_eq!(t.intern("VP"), 1);
    assert_eq!(t.intern("NP"), 0);
    assert_eq!(t.get("VP"), Some(1));
    assert_eq!(t.get("PP"), None);
    assert_eq!(t.name(1), "VP");
    assert_eq!(t.len(), 2);
    assert_eq!(t.iter().collect::<Vec<_>>(), vec![(0, "NP"), (1, "VP")]);

    let same: SymbolTable = ["NP", "VP", "NP"].into_iter().collect();
    assert_eq!(same, t);
    assert_ne!(same, ["VP", "NP"].into_iter().collect::<SymbolTable>());
    assert_eq!(t.to_string(), "0\tNP\n1\tVP\n");
  }

  #[test]
  fn test_base_label() {
    assert_eq!(base_label("NP_3"), "NP");
    assert_eq!(base_label("@S_0"), "@S");
    assert_eq!(base_label("._1"), ".");
    assert_eq!(base_label("PRP_S_12"), "PRP_S");
    assert_eq!(base_label("ROOT"), "ROOT");
    assert_eq!(base_label("_5"), "_5");
  }

  #[test]
  fn test_split_vocabulary() {
    let v = SplitVocabulary::new(["ROOT_0", "NP_0", "@NP_0", "NP_1", "NN_0"]);
    assert_eq!(v.base(1), v.base(3));
    assert_ne!(v.base(1), v.base(2));
    assert_eq!(v.base_name(v.base(3)), "NP");
    assert_eq!(v.base_name(v.base(4)), "NN");
    assert_eq!(v.splits_of(v.base(1)), &[1, 3]);
    assert_eq!(v.splits_of(v.base(2)), &[2]);
    assert!(v.is_factored_base(v.base(2)));
    assert!(!v.is_factored_base(v.base(1)));
  }
}
