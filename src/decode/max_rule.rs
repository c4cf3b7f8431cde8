//! Max-rule decoding over base labels.
//!
//! Every anchored base rule `P -> L R` over `start..mid..end` is scored by the
//! posterior mass of all its split variants. With `product` set a tree's score
//! is the product of its rule scores (kept in the log domain), otherwise their
//! sum. Each cell allows a single unary on top of its binary or lexical
//! choice, which keeps unary chains from cycling. Longer unary chains in the
//! chart are collapsed to that single unary.

use std::collections::{BTreeMap, HashMap};

use super::{Decoded, unfactor};
use crate::cells::bottom_up;
use crate::chart::{Cell, Chart, cell_index};
use crate::grammar::SparseGrammar;
use crate::packing::{INVALID, Unpacked};
use crate::semiring::ProbabilitySemiring;
use crate::syntree::{ParseTree, SynTree};
use crate::vocab::SplitVocabulary;

type Base = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Derivation {
  Lexical,
  Unary(Base),
  Binary { mid: usize, left: Base, right: Base },
}

#[derive(Debug, Clone, Copy)]
struct Scored {
  score: f64,
  derivation: Derivation,
}

#[derive(Debug, Clone, Default)]
struct CellScores {
  /// the best derivation of each base
  best: HashMap<Base, Scored>,
  /// the best binary or lexical derivation of each base
  inner: HashMap<Base, Scored>,
}

pub(super) fn decode<S: ProbabilitySemiring>(
  grammar: &SparseGrammar,
  chart: &Chart<S>,
  tokens: &[&str],
  product: bool,
) -> Option<Decoded> {
  let vocab = grammar.split_vocabulary()?;
  let n = tokens.len();
  let root_ln = chart.root_inside_ln(grammar.start_symbol());
  if !root_ln.is_finite() {
    return None;
  }
  let combine = |mass: f64, children: f64| {
    if product {
      mass.ln() + children
    } else {
      mass + children
    }
  };

  let mut scores: Vec<CellScores> = vec![CellScores::default(); n * (n + 1) / 2];
  for (start, end) in bottom_up(n) {
    let cell = chart.cell(start, end);
    if cell.is_empty() {
      continue;
    }

    // summed posterior mass of each anchored base rule
    let mut mass: BTreeMap<(Base, Derivation), f64> = BTreeMap::new();
    if end - start == 1 {
      if let Some(terminal) = grammar.terminal_id(tokens[start]) {
        for i in 0..cell.len() {
          let log_prob = grammar.lexical_log_probability(cell.nts[i], terminal);
          let term = (log_prob + cell.outside_ln::<S>(i) - root_ln).exp();
          if term > 0.0 {
            *mass.entry((vocab.base(cell.nts[i]), Derivation::Lexical)).or_default() += term;
          }
        }
      }
    } else {
      let packing = grammar.packing();
      for mid in start + 1..end {
        let left = chart.cell(start, mid);
        let right = chart.cell(mid, end);
        for li in 0..left.len() {
          for ri in 0..right.len() {
            let column = packing.pack(left.nts[li], right.nts[ri]);
            if column == INVALID {
              continue;
            }
            let children_ln = left.inside_ln::<S>(li) + right.inside_ln::<S>(ri);
            let derivation = Derivation::Binary {
              mid,
              left: vocab.base(left.nts[li]),
              right: vocab.base(right.nts[ri]),
            };
            for (parent, _, log_prob) in grammar.binary_column(column).iter() {
              let Some(pi) = cell.index_of(parent) else {
                continue;
              };
              let term = (log_prob + children_ln + cell.outside_ln::<S>(pi) - root_ln).exp();
              if term > 0.0 {
                *mass.entry((vocab.base(parent), derivation)).or_default() += term;
              }
            }
          }
        }
      }
    }

    let mut inner: HashMap<Base, Scored> = HashMap::new();
    for ((base, derivation), m) in mass {
      let children = match derivation {
        Derivation::Binary { mid, left, right } => {
          let l = scores[cell_index(start, mid, n)].best.get(&left);
          let r = scores[cell_index(mid, end, n)].best.get(&right);
          match (l, r) {
            (Some(l), Some(r)) => l.score + r.score,
            _ => continue,
          }
        }
        _ => 0.0,
      };
      let score = combine(m, children);
      if inner.get(&base).is_none_or(|s| score > s.score) {
        inner.insert(base, Scored { score, derivation });
      }
    }

    let best = unary_layer::<S>(grammar, vocab, &cell, root_ln, &inner, combine);
    scores[cell_index(start, end, n)] = CellScores { best, inner };
  }

  let root = vocab.base(grammar.start_symbol());
  let top = scores[cell_index(0, n, n)].best.get(&root)?;
  let tree = build(vocab, &scores, tokens, 0, n, root, true)?;
  Some(Decoded {
    tree: unfactor(tree),
    score: top.score,
  })
}

/// Adds unary derivations `P -> C` over the binary and lexical choices of a cell.
/// A unary replaces what `P` had only if it scores strictly higher. When `C`
/// itself only has a unary derivation, the chain is collapsed onto the first
/// entry below it that doesn't, so the output never stacks two unaries.
fn unary_layer<S: ProbabilitySemiring>(
  grammar: &SparseGrammar,
  vocab: &SplitVocabulary,
  cell: &Cell<'_>,
  root_ln: f64,
  inner: &HashMap<Base, Scored>,
  combine: impl Fn(f64, f64) -> f64,
) -> HashMap<Base, Scored> {
  let mut mass: BTreeMap<(Base, Base), f64> = BTreeMap::new();
  for pi in 0..cell.len() {
    let parent = cell.nts[pi];
    let outside_ln = cell.outside_ln::<S>(pi);
    if outside_ln == f64::NEG_INFINITY {
      continue;
    }
    let p = vocab.base(parent);
    for (child, _, log_prob) in grammar.unary_children(parent).iter() {
      let Some(ci) = cell.index_of(child) else {
        continue;
      };
      let Some(c) = chain_end(grammar, vocab, cell, ci, inner) else {
        continue;
      };
      if p == c {
        continue;
      }
      let term = (log_prob + cell.inside_ln::<S>(ci) + outside_ln - root_ln).exp();
      if term > 0.0 {
        *mass.entry((p, c)).or_default() += term;
      }
    }
  }

  let mut best = inner.clone();
  for ((p, c), m) in mass {
    let Some(child) = inner.get(&c) else {
      continue;
    };
    let score = combine(m, child.score);
    if best.get(&p).is_none_or(|s| score > s.score) {
      best.insert(p, Scored {
        score,
        derivation: Derivation::Unary(c),
      });
    }
  }
  best
}

/// Base of the first entry at or below entry `i` along its unary backpointers
/// that has a binary or lexical choice
fn chain_end(
  grammar: &SparseGrammar,
  vocab: &SplitVocabulary,
  cell: &Cell<'_>,
  mut i: usize,
  inner: &HashMap<Base, Scored>,
) -> Option<Base> {
  let packing = grammar.packing();
  for _ in 0..cell.len() {
    let base = vocab.base(cell.nts[i]);
    if inner.contains_key(&base) {
      return Some(base);
    }
    match packing.unpack(cell.children[i]) {
      Unpacked::Unary(child) => i = cell.index_of(child)?,
      _ => return None,
    }
  }
  None
}

fn build(
  vocab: &SplitVocabulary,
  scores: &[CellScores],
  tokens: &[&str],
  start: usize,
  end: usize,
  base: Base,
  allow_unary: bool,
) -> Option<ParseTree> {
  let n = tokens.len();
  let cell = &scores[cell_index(start, end, n)];
  let scored = if allow_unary {
    cell.best.get(&base)?
  } else {
    cell.inner.get(&base)?
  };
  let children = match scored.derivation {
    Derivation::Lexical => vec![SynTree::leaf(tokens[start].to_string(), start)],
    Derivation::Unary(child) => vec![build(vocab, scores, tokens, start, end, child, false)?],
    Derivation::Binary { mid, left, right } => vec![
      build(vocab, scores, tokens, start, mid, left, true)?,
      build(vocab, scores, tokens, mid, end, right, true)?,
    ],
  };
  Some(SynTree::branch(
    vocab.base_name(base).to_string(),
    (start, end),
    children,
  ))
}
