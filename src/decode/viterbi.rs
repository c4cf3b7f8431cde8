//! Best-derivation decoding: follow the backpointers down from the start symbol.

use super::{Decoded, output_label, unfactor};
use crate::chart::Chart;
use crate::grammar::SparseGrammar;
use crate::packing::Unpacked;
use crate::rules::NonTerminal;
use crate::semiring::ProbabilitySemiring;
use crate::syntree::{ParseTree, SynTree};

pub fn decode<S: ProbabilitySemiring>(grammar: &SparseGrammar, chart: &Chart<S>, tokens: &[&str]) -> Option<Decoded> {
  let n = tokens.len();
  let top = chart.cell(0, n);
  let i = top.index_of(grammar.start_symbol())?;
  let tree = tree(grammar, chart, tokens, 0, n, top.nts[i])?;
  Some(Decoded {
    tree,
    score: top.viterbi[i],
  })
}

/// The best derivation of `nt` over `start..end`, with output labels and
/// binarization nodes removed. `None` if `nt` isn't in that cell.
pub fn tree<S: ProbabilitySemiring>(
  grammar: &SparseGrammar,
  chart: &Chart<S>,
  tokens: &[&str],
  start: usize,
  end: usize,
  nt: NonTerminal,
) -> Option<ParseTree> {
  build(grammar, chart, tokens, start, end, nt, 0).map(unfactor)
}

fn build<S: ProbabilitySemiring>(
  grammar: &SparseGrammar,
  chart: &Chart<S>,
  tokens: &[&str],
  start: usize,
  end: usize,
  nt: NonTerminal,
  unary_depth: usize,
) -> Option<ParseTree> {
  // unary chains are acyclic for proper grammars; don't trust that for improper ones
  if unary_depth > grammar.num_non_terminals() {
    return None;
  }
  let cell = chart.cell(start, end);
  let i = cell.index_of(nt)?;
  let children = match grammar.packing().unpack(cell.children[i]) {
    Unpacked::Lexical(_) => vec![SynTree::leaf(tokens[start].to_string(), start)],
    Unpacked::Unary(child) => vec![build(grammar, chart, tokens, start, end, child, unary_depth + 1)?],
    Unpacked::Binary(left, right) => {
      let mid = cell.midpoints[i] as usize;
      vec![
        build(grammar, chart, tokens, start, mid, left, 0)?,
        build(grammar, chart, tokens, mid, end, right, 0)?,
      ]
    }
    Unpacked::Invalid => return None,
  };
  Some(SynTree::branch(
    output_label(grammar, nt).to_string(),
    (start, end),
    children,
  ))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ParserConfig;
  use crate::inside_outside::InsideOutsideParser;

  #[test]
  fn test_subtree_of_any_cell() {
    let g: SparseGrammar = include_str!("../../grammars/fish.gr").parse().unwrap();
    let parser = InsideOutsideParser::new(&g, ParserConfig::default()).unwrap();
    let mut ctx = parser.new_context();
    let words = ["The", "fish", "market", "stands", "last"];
    let outcome = parser.parse(&mut ctx, &words);
    assert_eq!(
      outcome.to_string(),
      "(ROOT (S (NP (DT The) (NN fish) (NN market)) (VP (VB stands) (RB last))))"
    );

    let np = g.nt_id("NP").unwrap();
    let sub = tree(&g, ctx.chart(), &words, 1, 3, np).unwrap();
    assert_eq!(sub.to_string(), "(NP (NN fish) (NN market))");
    assert_eq!(sub.span(), (1, 3));
    assert!(tree(&g, ctx.chart(), &words, 0, 2, np).is_none());
  }
}
