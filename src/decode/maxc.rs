//! Max-constituent decoding (Goodman). Picks the tree with the most expected
//! correct labeled constituents, less `lambda` for each constituent over more
//! than one word. The split-sum variant scores base labels by the posterior
//! mass of all their latent splits.

use std::collections::BTreeSet;

use super::{Decoded, output_label, posterior, unfactor};
use crate::cells::bottom_up;
use crate::chart::{Cell, Chart, cell_index};
use crate::grammar::SparseGrammar;
use crate::packing::Unpacked;
use crate::rules::NonTerminal;
use crate::semiring::ProbabilitySemiring;
use crate::syntree::{ParseTree, SynTree};
use crate::utils::roughly_equal;

/// A labeled constituent one cell could contribute
#[derive(Debug, Clone, Copy)]
struct Candidate {
  /// the entry that labels the constituent
  nt: NonTerminal,
  /// one extra constituent under `nt` when its best derivation is unary
  unary_child: Option<NonTerminal>,
  score: f64,
}

impl Candidate {
  /// Ties go to candidates with a unary child, so `ROOT -> S` survives a tie with `S`
  fn beats(&self, other: &Candidate) -> bool {
    if roughly_equal(self.score, other.score) {
      self.unary_child.is_some() && other.unary_child.is_none()
    } else {
      self.score > other.score
    }
  }
}

#[derive(Debug, Clone, Copy)]
struct Choice {
  label: Candidate,
  /// midpoint of the best split, unused for single words
  mid: usize,
  /// objective of the best subtree rooted at this cell
  total: f64,
}

pub(super) fn decode<S: ProbabilitySemiring>(
  grammar: &SparseGrammar,
  chart: &Chart<S>,
  tokens: &[&str],
  lambda: f64,
  sum_splits: bool,
) -> Option<Decoded> {
  let n = tokens.len();
  let root_ln = chart.root_inside_ln(grammar.start_symbol());
  if !root_ln.is_finite() || (sum_splits && grammar.split_vocabulary().is_none()) {
    return None;
  }

  let mut choices: Vec<Option<Choice>> = vec![None; n * (n + 1) / 2];
  for (start, end) in bottom_up(n) {
    let cell = chart.cell(start, end);
    let is_root = start == 0 && end == n;
    let candidate = if sum_splits {
      best_base::<S>(grammar, &cell, root_ln, lambda, is_root)
    } else {
      best_entry::<S>(grammar, &cell, root_ln, lambda, is_root)
    };
    let Some(label) = candidate else {
      continue;
    };

    let (mid, split_total) = if end - start == 1 {
      (end, 0.0)
    } else {
      let best_split = (start + 1..end)
        .filter_map(|m| {
          let left = choices[cell_index(start, m, n)]?;
          let right = choices[cell_index(m, end, n)]?;
          Some((m, left.total + right.total))
        })
        .fold(None, |best: Option<(usize, f64)>, (m, t)| match best {
          Some((_, bt)) if bt >= t => best,
          _ => Some((m, t)),
        });
      match best_split {
        Some(split) => split,
        None => continue,
      }
    };
    choices[cell_index(start, end, n)] = Some(Choice {
      label,
      mid,
      total: label.score + split_total,
    });
  }

  let top = choices[cell_index(0, n, n)]?;
  let tree = build(grammar, &choices, tokens, 0, n)?;
  Some(Decoded {
    tree: unfactor(tree),
    score: top.total,
  })
}

/// What a single entry adds when chosen, or `None` if it can't label this cell
fn score_entry<S: ProbabilitySemiring>(
  grammar: &SparseGrammar,
  cell: &Cell<'_>,
  i: usize,
  root_ln: f64,
  lambda: f64,
) -> Option<Candidate> {
  let nt = cell.nts[i];
  let unary_child = match grammar.packing().unpack(cell.children[i]) {
    Unpacked::Unary(child) => Some(child),
    _ => None,
  };
  // single words take a part of speech, possibly under one unary parent
  if cell.span() == 1 && !grammar.is_pos(nt) && !unary_child.is_some_and(|c| grammar.is_pos(c)) {
    return None;
  }

  let score = if grammar.is_factored(nt) {
    0.0
  } else if cell.span() > 1 {
    posterior::<S>(cell, i, root_ln) - lambda
  } else {
    posterior::<S>(cell, i, root_ln)
  };
  Some(Candidate {
    nt,
    unary_child,
    score,
  })
}

fn best_entry<S: ProbabilitySemiring>(
  grammar: &SparseGrammar,
  cell: &Cell<'_>,
  root_ln: f64,
  lambda: f64,
  is_root: bool,
) -> Option<Candidate> {
  if is_root {
    let i = cell.index_of(grammar.start_symbol())?;
    return score_entry::<S>(grammar, cell, i, root_ln, lambda);
  }
  (0..cell.len())
    .filter_map(|i| score_entry::<S>(grammar, cell, i, root_ln, lambda))
    .fold(None, |best, c| match best {
      Some(b) if !c.beats(&b) => Some(b),
      _ => Some(c),
    })
}

/// Sums posteriors over the splits of each base label. The split with the
/// largest posterior stands in for the base.
fn best_base<S: ProbabilitySemiring>(
  grammar: &SparseGrammar,
  cell: &Cell<'_>,
  root_ln: f64,
  lambda: f64,
  is_root: bool,
) -> Option<Candidate> {
  let vocab = grammar.split_vocabulary()?;
  let root_base = vocab.base(grammar.start_symbol());

  let present: BTreeSet<u16> = cell
    .nts
    .iter()
    .map(|&nt| vocab.base(nt))
    .filter(|&base| !is_root || base == root_base)
    .collect();

  // base -> (summed posterior, representative)
  let mut bases: Vec<(u16, (f64, Candidate))> = Vec::with_capacity(present.len());
  for base in present {
    let mut mass = 0.0;
    let mut best: Option<(Candidate, f64)> = None;
    for &split in vocab.splits_of(base) {
      let Some(i) = cell.index_of(split) else {
        continue;
      };
      let Some(candidate) = score_entry::<S>(grammar, cell, i, root_ln, 0.0) else {
        continue;
      };
      let g = posterior::<S>(cell, i, root_ln);
      mass += g;
      let representative = Candidate { score: g, ..candidate };
      if best.is_none_or(|(b, bg)| representative.beats(&Candidate { score: bg, ..b })) {
        best = Some((candidate, g));
      }
    }
    if let Some((representative, _)) = best {
      bases.push((base, (mass, representative)));
    }
  }

  bases
    .into_iter()
    .map(|(base, (mass, representative))| {
      let score = if vocab.is_factored_base(base) {
        0.0
      } else if cell.span() > 1 {
        mass.min(1.0) - lambda
      } else {
        mass.min(1.0)
      };
      Candidate {
        score,
        ..representative
      }
    })
    .fold(None, |best, c| match best {
      Some(b) if !c.beats(&b) => Some(b),
      _ => Some(c),
    })
}

fn build(
  grammar: &SparseGrammar,
  choices: &[Option<Choice>],
  tokens: &[&str],
  start: usize,
  end: usize,
) -> Option<ParseTree> {
  let n = tokens.len();
  let choice = choices[cell_index(start, end, n)]?;
  let children = if end - start == 1 {
    vec![SynTree::leaf(tokens[start].to_string(), start)]
  } else {
    vec![
      build(grammar, choices, tokens, start, choice.mid)?,
      build(grammar, choices, tokens, choice.mid, end)?,
    ]
  };
  let children = match choice.label.unary_child {
    Some(child) => vec![SynTree::branch(
      output_label(grammar, child).to_string(),
      (start, end),
      children,
    )],
    None => children,
  };
  Some(SynTree::branch(
    output_label(grammar, choice.label.nt).to_string(),
    (start, end),
    children,
  ))
}

#[cfg(test)]
mod tests {
  use crate::config::{DecodeMethod, ParserConfig};
  use crate::grammar::SparseGrammar;
  use crate::inside_outside::InsideOutsideParser;

  fn fish() -> SparseGrammar {
    include_str!("../../grammars/fish.gr").parse().unwrap()
  }

  fn goodman(lambda: f64) -> ParserConfig {
    ParserConfig {
      maxc_lambda: lambda,
      ..ParserConfig::with_decode_method(DecodeMethod::Goodman)
    }
  }

  #[test]
  fn test_lambda_trades_recall_for_precision() {
    let g = fish();
    let sentence = "The fish market stands last";

    let recall = InsideOutsideParser::new(&g, goodman(0.0)).unwrap().parse_sentence(sentence);
    assert_eq!(
      recall.to_string(),
      "(ROOT (S (NP (DT The) (NP (NN fish) (NN market))) (VP (VB stands) (RB last))))"
    );

    let precision = InsideOutsideParser::new(&g, goodman(1.0)).unwrap().parse_sentence(sentence);
    assert_eq!(
      precision.to_string(),
      "(ROOT (S (NP (DT The) (NN fish) (NN market)) (VP (VB stands) (RB last))))"
    );
  }

  #[test]
  fn test_objective_counts_expected_constituents() {
    let g = fish();
    let outcome = InsideOutsideParser::new(&g, goodman(0.0))
      .unwrap()
      .parse_sentence("The fish market stands last");
    // ROOT, NP(0,3), VP and the five words each have posterior 1, NP(1,3) has .25;
    // S under ROOT is the unary extra level and isn't scored
    let score = outcome.parse().unwrap().score;
    assert!((score - 8.25).abs() < 1e-9, "{}", score);
  }

  #[test]
  fn test_split_sum_pools_splits_of_a_base() {
    // P_0 and P_1 each lose to Q_0 over "a", but P wins once they're summed
    let g: SparseGrammar = r#"
      format=Berkeley start=ROOT_0
      ROOT_0 -> Q_0 B_0 -0.9162907319
      ROOT_0 -> P_0 B_0 -1.2039728043
      ROOT_0 -> P_1 B_0 -1.2039728043
      ===== LEXICON =====
      Q_0 -> a 0.0
      P_0 -> a 0.0
      P_1 -> a 0.0
      B_0 -> b 0.0
    "#
    .parse()
    .unwrap();

    let split_sum = InsideOutsideParser::new(&g, ParserConfig::with_decode_method(DecodeMethod::SplitSum))
      .unwrap()
      .parse_sentence("a b");
    assert_eq!(split_sum.to_string(), "(ROOT (P a) (B b))");

    let goodman = InsideOutsideParser::new(&g, goodman(0.0)).unwrap().parse_sentence("a b");
    assert_eq!(goodman.to_string(), "(ROOT (Q a) (B b))");
  }
}
