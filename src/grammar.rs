//! The sparse-matrix grammar.
//!
//! Binary rules are stored column-major, one column per packed `(left, right)`
//! child pair with the parents of that pair as sorted rows. Unary rules are
//! stored both by child (for the inside pass) and by parent (for the outside
//! pass), lexical rules by terminal.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::str::FromStr;

use tracing::info;

use crate::config::NonTerminalOrdering;
use crate::errors::{GrammarError, Result};
use crate::packing::{INVALID, PackingFunction};
use crate::parse_grammar::{GrammarText, Header, parse};
use crate::rules::{IndexedProduction, NonTerminal, Production, Rule, Terminal};
use crate::vocab::{SplitVocabulary, SymbolTable, UNKNOWN_WORD, is_factored_label};

/// Start symbol used when the header doesn't declare one
pub const DEFAULT_START_SYMBOL: &str = "ROOT";

/// One column (or row) of a [`CompressedMatrix`]
#[derive(Debug, Clone, Copy)]
pub struct Slice<'a> {
  /// sorted ascending
  pub indices: &'a [u16],
  pub probabilities: &'a [f64],
  pub log_probabilities: &'a [f64],
}

impl<'a> Slice<'a> {
  pub fn len(&self) -> usize {
    self.indices.len()
  }

  pub fn is_empty(&self) -> bool {
    self.indices.is_empty()
  }

  /// `(index, probability, log probability)`
  pub fn iter(&self) -> impl Iterator<Item = (u16, f64, f64)> + 'a {
    let (indices, probabilities, log_probabilities) =
      (self.indices, self.probabilities, self.log_probabilities);
    (0..indices.len()).map(move |k| (indices[k], probabilities[k], log_probabilities[k]))
  }

  /// Binary search for `index`
  pub fn get(&self, index: u16) -> Option<(f64, f64)> {
    self
      .indices
      .binary_search(&index)
      .ok()
      .map(|k| (self.probabilities[k], self.log_probabilities[k]))
  }
}

/// Compressed sparse storage keyed by a major index (the column for CSC, the row for CSR).
/// Minor indices within a major slot are sorted so lookups can binary search.
/// Log probabilities are stored beside the real ones for the log semiring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompressedMatrix {
  offsets: Vec<u32>,
  indices: Vec<u16>,
  probabilities: Vec<f64>,
  log_probabilities: Vec<f64>,
}

impl CompressedMatrix {
  /// Builds from `(major, minor, prob)` triples. Triples must be distinct.
  pub fn from_triples(num_major: usize, mut triples: Vec<(usize, u16, f64)>) -> Self {
    triples.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    let mut offsets = vec![0u32; num_major + 1];
    for &(major, _, _) in triples.iter() {
      assert!(major < num_major, "major index {} out of range {}", major, num_major);
      offsets[major + 1] += 1;
    }
    for m in 0..num_major {
      offsets[m + 1] += offsets[m];
    }

    Self {
      offsets,
      indices: triples.iter().map(|t| t.1).collect(),
      probabilities: triples.iter().map(|t| t.2).collect(),
      log_probabilities: triples.iter().map(|t| t.2.ln()).collect(),
    }
  }

  /// The entries under `major`; empty for out-of-range or negative majors
  #[inline]
  pub fn slice(&self, major: i32) -> Slice<'_> {
    if major < 0 || major as usize >= self.num_major() {
      return Slice {
        indices: &[],
        probabilities: &[],
        log_probabilities: &[],
      };
    }
    let major = major as usize;
    let (start, end) = (self.offsets[major] as usize, self.offsets[major + 1] as usize);
    Slice {
      indices: &self.indices[start..end],
      probabilities: &self.probabilities[start..end],
      log_probabilities: &self.log_probabilities[start..end],
    }
  }

  pub fn get(&self, major: i32, minor: u16) -> Option<(f64, f64)> {
    self.slice(major).get(minor)
  }

  pub fn num_major(&self) -> usize {
    self.offsets.len().saturating_sub(1)
  }

  /// Number of stored entries
  pub fn nnz(&self) -> usize {
    self.indices.len()
  }
}

/// An immutable PCFG in sparse-matrix form, shared read-only by every parse
#[derive(Debug, Clone)]
pub struct SparseGrammar {
  pub header: Header,
  non_terminals: SymbolTable,
  terminals: SymbolTable,
  start_symbol: NonTerminal,
  split_vocabulary: Option<SplitVocabulary>,
  ordering: NonTerminalOrdering,

  is_pos: Vec<bool>,
  is_factored: Vec<bool>,
  left_child_range: Range<NonTerminal>,
  right_child_range: Range<NonTerminal>,
  pos_range: Range<NonTerminal>,

  packing: PackingFunction,
  /// columns: packed (left, right); rows: parents
  binary: CompressedMatrix,
  /// `binary` restricted to factored parents
  factored_binary: CompressedMatrix,
  /// packs (parent, left) for `right_child_binary`
  right_child_packing: PackingFunction,
  /// columns: packed (parent, left); rows: right children
  right_child_binary: CompressedMatrix,
  /// columns: child; rows: parents
  unary_by_child: CompressedMatrix,
  /// rows: parent; columns: children
  unary_by_parent: CompressedMatrix,
  /// by terminal; parents sorted
  lexical: CompressedMatrix,
  unknown_word: Option<Terminal>,

  num_binary: usize,
  num_unary: usize,
  num_lexical: usize,
}

/// Which side(s) of binary productions a label occurs on, for id ordering
#[derive(Default, Clone, Copy)]
struct Roles {
  left: bool,
  right: bool,
  pos: bool,
}

impl SparseGrammar {
  pub fn from_text(text: GrammarText, ordering: NonTerminalOrdering) -> Result<Self> {
    let start_name = text
      .header
      .start
      .clone()
      .unwrap_or_else(|| DEFAULT_START_SYMBOL.to_string());

    let non_terminals = Self::order_non_terminals(&text, &start_name, ordering);
    if non_terminals.len() > u16::MAX as usize {
      return Err(GrammarError::TooManyNonTerminals(non_terminals.len()));
    }
    let start_symbol = match non_terminals.get(&start_name) {
      Some(id) => id as NonTerminal,
      None => return Err(GrammarError::MissingStartSymbol(start_name)),
    };
    let heads_production = text
      .rules
      .iter()
      .chain(text.lexicon.iter())
      .any(|r| *r.parent() == start_name);
    if !heads_production {
      return Err(GrammarError::MissingStartSymbol(start_name));
    }

    let terminals: SymbolTable = text
      .lexicon
      .iter()
      .filter_map(|r| match r {
        Production::Lexical { terminal, .. } => Some(terminal.as_str()),
        _ => None,
      })
      .collect();

    let nt = |name: &str| non_terminals.get(name).map(|id| id as NonTerminal);
    let mut productions: Vec<IndexedProduction> = Vec::with_capacity(text.rules.len() + text.lexicon.len());
    for rule in text.rules.iter().chain(text.lexicon.iter()) {
      // every label was interned by order_non_terminals
      let indexed = match rule {
        Production::Binary {
          parent,
          left,
          right,
          prob,
        } => nt(parent).zip(nt(left)).zip(nt(right)).map(|((parent, left), right)| Production::Binary {
          parent,
          left,
          right,
          prob: *prob,
        }),
        Production::Unary {
          parent,
          child,
          prob,
        } => nt(parent).zip(nt(child)).map(|(parent, child)| Production::Unary {
          parent,
          child,
          prob: *prob,
        }),
        Production::Lexical {
          parent,
          terminal,
          prob,
        } => nt(parent)
          .zip(terminals.get(terminal))
          .map(|(parent, terminal)| Production::Lexical {
            parent,
            terminal,
            prob: *prob,
          }),
      };
      productions.extend(indexed);
    }

    let split_vocabulary = if text.header.is_split_format() {
      Some(SplitVocabulary::new(non_terminals.iter().map(|(_, n)| n)))
    } else {
      None
    };

    Ok(Self::build(
      text.header,
      non_terminals,
      terminals,
      start_symbol,
      split_vocabulary,
      ordering,
      productions,
    ))
  }

  fn build(
    header: Header,
    non_terminals: SymbolTable,
    terminals: SymbolTable,
    start_symbol: NonTerminal,
    split_vocabulary: Option<SplitVocabulary>,
    ordering: NonTerminalOrdering,
    productions: Vec<IndexedProduction>,
  ) -> Self {
    let num_nts = non_terminals.len();
    let is_factored: Vec<bool> = non_terminals.iter().map(|(_, n)| is_factored_label(n)).collect();
    let mut is_pos = vec![false; num_nts];
    let mut is_left = vec![false; num_nts];
    let mut is_right = vec![false; num_nts];

    let mut binary_pairs = Vec::new();
    let mut parent_left_pairs = Vec::new();
    for p in productions.iter() {
      match *p {
        Production::Binary {
          parent, left, right, ..
        } => {
          is_left[left as usize] = true;
          is_right[right as usize] = true;
          binary_pairs.push((left, right));
          parent_left_pairs.push((parent, left));
        }
        Production::Lexical { parent, .. } => is_pos[parent as usize] = true,
        Production::Unary { .. } => {}
      }
    }

    let packing = PackingFunction::new(num_nts, binary_pairs);
    let right_child_packing = PackingFunction::new(num_nts, parent_left_pairs);

    let mut binary = Vec::new();
    let mut factored_binary = Vec::new();
    let mut right_child_binary = Vec::new();
    let mut unary_by_child = Vec::new();
    let mut unary_by_parent = Vec::new();
    let mut lexical = Vec::new();
    for p in productions.iter() {
      match *p {
        Production::Binary {
          parent,
          left,
          right,
          prob,
        } => {
          let column = packing.pack(left, right);
          assert_ne!(column, INVALID, "binary pair ({}, {}) failed to pack", left, right);
          binary.push((column as usize, parent, prob));
          if is_factored[parent as usize] {
            factored_binary.push((column as usize, parent, prob));
          }
          let rc_column = right_child_packing.pack(parent, left);
          assert_ne!(rc_column, INVALID);
          right_child_binary.push((rc_column as usize, right, prob));
        }
        Production::Unary {
          parent,
          child,
          prob,
        } => {
          unary_by_child.push((child as usize, parent, prob));
          unary_by_parent.push((parent as usize, child, prob));
        }
        Production::Lexical {
          parent,
          terminal,
          prob,
        } => lexical.push((terminal as usize, parent, prob)),
      }
    }

    let (num_binary, num_unary, num_lexical) = (binary.len(), unary_by_child.len(), lexical.len());
    let unknown_word = terminals.get(UNKNOWN_WORD);

    let grammar = Self {
      header,
      left_child_range: tight_range(&is_left),
      right_child_range: tight_range(&is_right),
      pos_range: tight_range(&is_pos),
      is_pos,
      is_factored,
      binary: CompressedMatrix::from_triples(packing.num_columns(), binary),
      factored_binary: CompressedMatrix::from_triples(packing.num_columns(), factored_binary),
      right_child_binary: CompressedMatrix::from_triples(right_child_packing.num_columns(), right_child_binary),
      unary_by_child: CompressedMatrix::from_triples(num_nts, unary_by_child),
      unary_by_parent: CompressedMatrix::from_triples(num_nts, unary_by_parent),
      lexical: CompressedMatrix::from_triples(terminals.len(), lexical),
      packing,
      right_child_packing,
      unknown_word,
      non_terminals,
      terminals,
      start_symbol,
      split_vocabulary,
      ordering,
      num_binary,
      num_unary,
      num_lexical,
    };

    info!(
      non_terminals = grammar.num_non_terminals(),
      terminals = grammar.num_terminals(),
      binary = grammar.num_binary,
      unary = grammar.num_unary,
      lexical = grammar.num_lexical,
      packed_columns = grammar.packing.num_columns(),
      split = grammar.split_vocabulary.is_some(),
      "built sparse grammar"
    );
    grammar
  }

  /// Assigns non-terminal ids according to `ordering`
  fn order_non_terminals(
    text: &GrammarText,
    start: &str,
    ordering: NonTerminalOrdering,
  ) -> SymbolTable {
    let mut roles: HashMap<&str, Roles> = HashMap::new();
    let mut labels: Vec<&str> = Vec::new();
    let mut known: HashSet<&str> = HashSet::new();
    for rule in text.rules.iter().chain(text.lexicon.iter()) {
      let names: Vec<&str> = match rule {
        Production::Binary {
          parent, left, right, ..
        } => {
          roles.entry(left.as_str()).or_default().left = true;
          roles.entry(right.as_str()).or_default().right = true;
          vec![parent, left, right]
        }
        Production::Unary { parent, child, .. } => vec![parent, child],
        Production::Lexical { parent, .. } => {
          roles.entry(parent.as_str()).or_default().pos = true;
          vec![parent]
        }
      }
      .into_iter()
      .map(|s: &String| s.as_str())
      .collect();
      for name in names {
        if known.insert(name) {
          labels.push(name);
        }
      }
    }

    let role = |name: &str| roles.get(name).copied().unwrap_or_default();
    let ordered: Vec<&str> = match ordering {
      NonTerminalOrdering::LeftRightBottomTop => {
        // start, left-only, both sides, right-only, everything else
        let class = |name: &str| {
          let r = role(name);
          if name == start {
            0
          } else {
            match (r.left, r.right) {
              (true, false) => 1,
              (true, true) => 2,
              (false, true) => 3,
              (false, false) => 4,
            }
          }
        };
        let mut ordered = labels.clone();
        ordered.sort_by_key(|name| class(name));
        ordered
      }
      NonTerminalOrdering::PosFirst => {
        let mut ordered = labels.clone();
        ordered.sort_by_key(|name| !role(name).pos);
        ordered
      }
      NonTerminalOrdering::Lexicographic => {
        let mut ordered = labels.clone();
        ordered.sort_unstable();
        ordered
      }
    };

    ordered.into_iter().collect()
  }

  pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
    Self::read_from_file_with_ordering(path, NonTerminalOrdering::default())
  }

  pub fn read_from_file_with_ordering<P: AsRef<Path>>(
    path: P,
    ordering: NonTerminalOrdering,
  ) -> Result<Self> {
    let text = std::fs::read_to_string(path)?;
    Self::from_text(parse(&text)?, ordering)
  }

  pub fn num_non_terminals(&self) -> usize {
    self.non_terminals.len()
  }

  pub fn num_terminals(&self) -> usize {
    self.terminals.len()
  }

  pub fn num_binary_rules(&self) -> usize {
    self.num_binary
  }

  pub fn num_unary_rules(&self) -> usize {
    self.num_unary
  }

  pub fn num_lexical_rules(&self) -> usize {
    self.num_lexical
  }

  pub fn start_symbol(&self) -> NonTerminal {
    self.start_symbol
  }

  pub fn ordering(&self) -> NonTerminalOrdering {
    self.ordering
  }

  pub fn non_terminals(&self) -> &SymbolTable {
    &self.non_terminals
  }

  pub fn terminals(&self) -> &SymbolTable {
    &self.terminals
  }

  pub fn nt_name(&self, nt: NonTerminal) -> &str {
    self.non_terminals.name(nt as u32)
  }

  pub fn nt_id(&self, name: &str) -> Option<NonTerminal> {
    self.non_terminals.get(name).map(|id| id as NonTerminal)
  }

  /// The terminal id of `word`, falling back to the `UNK` terminal when the lexicon has one
  pub fn terminal_id(&self, word: &str) -> Option<Terminal> {
    self.terminals.get(word).or(self.unknown_word)
  }

  pub fn split_vocabulary(&self) -> Option<&SplitVocabulary> {
    self.split_vocabulary.as_ref()
  }

  #[inline]
  pub fn is_pos(&self, nt: NonTerminal) -> bool {
    self.is_pos[nt as usize]
  }

  #[inline]
  pub fn is_factored(&self, nt: NonTerminal) -> bool {
    self.is_factored[nt as usize]
  }

  /// Tight `[min, max + 1)` bounds of non-terminals that occur as a left child
  pub fn left_child_range(&self) -> Range<NonTerminal> {
    self.left_child_range.clone()
  }

  pub fn right_child_range(&self) -> Range<NonTerminal> {
    self.right_child_range.clone()
  }

  pub fn pos_range(&self) -> Range<NonTerminal> {
    self.pos_range.clone()
  }

  pub fn packing(&self) -> &PackingFunction {
    &self.packing
  }

  pub fn right_child_packing(&self) -> &PackingFunction {
    &self.right_child_packing
  }

  /// Parents of the packed child pair `column`
  #[inline]
  pub fn binary_column(&self, column: i32) -> Slice<'_> {
    self.binary.slice(column)
  }

  /// Factored parents of the packed child pair `column`
  #[inline]
  pub fn factored_binary_column(&self, column: i32) -> Slice<'_> {
    self.factored_binary.slice(column)
  }

  /// Right children of the `(parent, left)` pair packed by [`right_child_packing`](Self::right_child_packing)
  #[inline]
  pub fn right_child_column(&self, column: i32) -> Slice<'_> {
    self.right_child_binary.slice(column)
  }

  /// Unary parents of `child`
  #[inline]
  pub fn unary_parents(&self, child: NonTerminal) -> Slice<'_> {
    self.unary_by_child.slice(child as i32)
  }

  /// Unary children of `parent`
  #[inline]
  pub fn unary_children(&self, parent: NonTerminal) -> Slice<'_> {
    self.unary_by_parent.slice(parent as i32)
  }

  /// Parts of speech that produce `terminal`
  #[inline]
  pub fn lexical_parents(&self, terminal: Terminal) -> Slice<'_> {
    self.lexical.slice(terminal as i32)
  }

  /// P(parent -> children), where `packed` comes from the [`packing`](Self::packing) function.
  /// 0 for rules the grammar doesn't have.
  pub fn binary_probability(&self, parent: NonTerminal, packed: i32) -> f64 {
    self.binary.get(packed, parent).map(|(p, _)| p).unwrap_or(0.0)
  }

  pub fn binary_log_probability(&self, parent: NonTerminal, packed: i32) -> f64 {
    self
      .binary
      .get(packed, parent)
      .map(|(_, lp)| lp)
      .unwrap_or(f64::NEG_INFINITY)
  }

  pub fn unary_probability(&self, parent: NonTerminal, child: NonTerminal) -> f64 {
    self
      .unary_by_child
      .get(child as i32, parent)
      .map(|(p, _)| p)
      .unwrap_or(0.0)
  }

  pub fn unary_log_probability(&self, parent: NonTerminal, child: NonTerminal) -> f64 {
    self
      .unary_by_child
      .get(child as i32, parent)
      .map(|(_, lp)| lp)
      .unwrap_or(f64::NEG_INFINITY)
  }

  pub fn lexical_probability(&self, parent: NonTerminal, terminal: Terminal) -> f64 {
    self
      .lexical
      .get(terminal as i32, parent)
      .map(|(p, _)| p)
      .unwrap_or(0.0)
  }

  pub fn lexical_log_probability(&self, parent: NonTerminal, terminal: Terminal) -> f64 {
    self
      .lexical
      .get(terminal as i32, parent)
      .map(|(_, lp)| lp)
      .unwrap_or(f64::NEG_INFINITY)
  }

  /// Every production, for writing the grammar back out
  pub fn rules(&self) -> Vec<Rule> {
    let mut rules = Vec::with_capacity(self.num_binary + self.num_unary + self.num_lexical);
    for column in 0..self.binary.num_major() as i32 {
      let Some((left, right)) = self.packing.unpack_left_child(column).zip(self.packing.unpack_right_child(column))
      else {
        continue;
      };
      for (parent, prob, _) in self.binary.slice(column).iter() {
        rules.push(Production::Binary {
          parent: self.nt_name(parent).to_string(),
          left: self.nt_name(left as NonTerminal).to_string(),
          right: self.nt_name(right).to_string(),
          prob,
        });
      }
    }
    for parent in 0..self.num_non_terminals() as NonTerminal {
      for (child, prob, _) in self.unary_children(parent).iter() {
        rules.push(Production::Unary {
          parent: self.nt_name(parent).to_string(),
          child: self.nt_name(child).to_string(),
          prob,
        });
      }
    }
    for terminal in 0..self.num_terminals() as Terminal {
      for (parent, prob, _) in self.lexical_parents(terminal).iter() {
        rules.push(Production::Lexical {
          parent: self.nt_name(parent).to_string(),
          terminal: self.terminals.name(terminal).to_string(),
          prob,
        });
      }
    }
    rules
  }
}

/// `[min, max + 1)` over the set flags, `0..0` when none are set
fn tight_range(flags: &[bool]) -> Range<NonTerminal> {
  let min = flags.iter().position(|&f| f);
  let max = flags.iter().rposition(|&f| f);
  match (min, max) {
    (Some(min), Some(max)) => min as NonTerminal..(max + 1) as NonTerminal,
    _ => 0..0,
  }
}

impl FromStr for SparseGrammar {
  type Err = GrammarError;

  /// Parses a grammar with the default non-terminal ordering
  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    Self::from_text(parse(s)?, NonTerminalOrdering::default())
  }
}

impl fmt::Display for SparseGrammar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if let Some(format) = &self.header.format {
      write!(f, "format={} ", format)?;
    }
    write!(f, "start={}", self.nt_name(self.start_symbol))?;
    for (key, value) in self.header.metadata.iter() {
      write!(f, " {}={}", key, value)?;
    }
    writeln!(f)?;

    let rules = self.rules();
    for rule in rules.iter().filter(|r| !r.is_lexical()) {
      writeln!(f, "{}", rule)?;
    }
    writeln!(f, "===== LEXICON =====")?;
    for rule in rules.iter().filter(|r| r.is_lexical()) {
      writeln!(f, "{}", rule)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  macro_rules! grammar_file {
    ($filename:expr) => {
      include_str!(concat!("../grammars/", $filename))
    };
  }

  fn fish() -> SparseGrammar {
    grammar_file!("fish.gr").parse().unwrap()
  }

  #[test]
  fn test_counts_and_lookups() {
    let g = fish();
    assert_eq!(g.num_binary_rules(), 6);
    assert_eq!(g.num_unary_rules(), 1);
    assert_eq!(g.num_lexical_rules(), 5);
    assert_eq!(g.nt_name(g.start_symbol()), "ROOT");
    assert_eq!(g.start_symbol(), 0);

    let (np, dt, nn, at_np) = (
      g.nt_id("NP").unwrap(),
      g.nt_id("DT").unwrap(),
      g.nt_id("NN").unwrap(),
      g.nt_id("@NP").unwrap(),
    );
    let column = g.packing().pack(dt, at_np);
    assert!((g.binary_probability(np, column) - 0.3).abs() < 1e-9);
    assert!((g.binary_probability(np, g.packing().pack(nn, nn)) - 0.5).abs() < 1e-9);
    assert_eq!(g.binary_probability(dt, column), 0.0);
    assert_eq!(g.binary_probability(np, INVALID), 0.0);
    assert_eq!(g.binary_log_probability(dt, column), f64::NEG_INFINITY);

    let (root, s) = (g.nt_id("ROOT").unwrap(), g.nt_id("S").unwrap());
    assert!((g.unary_probability(root, s) - 1.0).abs() < 1e-9);
    assert_eq!(g.unary_probability(s, root), 0.0);

    let fish = g.terminal_id("fish").unwrap();
    assert!((g.lexical_probability(nn, fish) - 0.5).abs() < 1e-9);
    assert_eq!(g.lexical_probability(dt, fish), 0.0);
    assert_eq!(g.terminal_id("whale"), None);
  }

  #[test]
  fn test_columns_are_sorted() {
    let g = fish();
    for column in 0..g.packing().num_columns() as i32 {
      let parents = g.binary_column(column).indices;
      assert!(parents.windows(2).all(|w| w[0] < w[1]));
    }
    for terminal in 0..g.num_terminals() as Terminal {
      let parents = g.lexical_parents(terminal).indices;
      assert!(parents.windows(2).all(|w| w[0] < w[1]));
    }
  }

  #[test]
  fn test_factored_and_right_child_matrices() {
    let g = fish();
    let (np, dt, nn, at_np) = (
      g.nt_id("NP").unwrap(),
      g.nt_id("DT").unwrap(),
      g.nt_id("NN").unwrap(),
      g.nt_id("@NP").unwrap(),
    );
    assert!(g.is_factored(at_np));
    assert!(!g.is_factored(np));

    let nn_nn = g.packing().pack(nn, nn);
    let factored: Vec<u16> = g.factored_binary_column(nn_nn).iter().map(|(p, _, _)| p).collect();
    assert_eq!(factored, vec![at_np]);
    assert_eq!(g.binary_column(nn_nn).len(), 2);

    let rc = g.right_child_packing().pack(np, dt);
    let mut rights: Vec<u16> = g.right_child_column(rc).iter().map(|(r, _, _)| r).collect();
    rights.sort();
    let mut expected = vec![at_np, np];
    expected.sort();
    assert_eq!(rights, expected);
  }

  #[test]
  fn test_left_right_bottom_top_ordering() {
    let g = fish();
    let left = g.left_child_range();
    let right = g.right_child_range();
    for name in ["NP", "DT", "NN", "VB"] {
      assert!(left.contains(&g.nt_id(name).unwrap()), "{} should be a left child", name);
    }
    for name in ["VP", "@NP", "NP", "NN", "RB"] {
      assert!(right.contains(&g.nt_id(name).unwrap()), "{} should be a right child", name);
    }
    // left-only children come before any right-only child
    let dt = g.nt_id("DT").unwrap();
    let rb = g.nt_id("RB").unwrap();
    assert!(dt < g.nt_id("NP").unwrap());
    assert!(g.nt_id("NP").unwrap() < rb);
    assert!(!right.contains(&dt));
    assert!(g.pos_range().contains(&g.nt_id("VB").unwrap()));
  }

  #[test]
  fn test_other_orderings() {
    let text = parse(grammar_file!("fish.gr")).unwrap();
    let g = SparseGrammar::from_text(text.clone(), NonTerminalOrdering::PosFirst).unwrap();
    let pos = g.pos_range();
    assert_eq!(pos.start, 0);
    assert_eq!(pos.len(), 4);
    for nt in pos {
      assert!(g.is_pos(nt));
    }

    let g = SparseGrammar::from_text(text, NonTerminalOrdering::Lexicographic).unwrap();
    let names: Vec<&str> = g.non_terminals().iter().map(|(_, n)| n).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
  }

  #[test]
  fn test_missing_start_symbol() {
    let src = "start=TOP\nS -> A B 0\n===== LEXICON =====\nA -> a 0\nB -> b 0\n";
    assert!(matches!(
      src.parse::<SparseGrammar>(),
      Err(GrammarError::MissingStartSymbol(ref s)) if s == "TOP"
    ));
  }

  #[test]
  fn test_display_round_trip() {
    let g = fish();
    let again: SparseGrammar = g.to_string().parse().unwrap();
    assert_eq!(again.num_binary_rules(), g.num_binary_rules());
    assert_eq!(again.num_unary_rules(), g.num_unary_rules());
    assert_eq!(again.num_lexical_rules(), g.num_lexical_rules());
    let (np, nn) = (again.nt_id("NP").unwrap(), again.nt_id("NN").unwrap());
    let column = again.packing().pack(nn, nn);
    assert!((again.binary_probability(np, column) - 0.5).abs() < 1e-9);
  }

  #[test]
  fn test_split_vocabulary() {
    let g: SparseGrammar = grammar_file!("report.gr").parse().unwrap();
    let vocab = g.split_vocabulary().unwrap();
    let np0 = g.nt_id("NP_0").unwrap();
    let np1 = g.nt_id("NP_1").unwrap();
    assert_eq!(vocab.base(np0), vocab.base(np1));
    assert_eq!(vocab.base_name(vocab.base(np0)), "NP");
    assert!(fish().split_vocabulary().is_none());
  }
}
