//! Decoders turn a finished chart into a single output tree.

mod max_rule;
mod maxc;
pub mod viterbi;

use crate::chart::{Cell, Chart};
use crate::config::{DecodeMethod, ParserConfig};
use crate::grammar::SparseGrammar;
use crate::rules::NonTerminal;
use crate::semiring::ProbabilitySemiring;
use crate::syntree::ParseTree;
use crate::vocab::is_factored_label;

/// A decoded tree and the decoder's objective for it
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
  pub tree: ParseTree,
  pub score: f64,
}

/// Decodes the chart of `tokens` with the configured method. `None` when the
/// start symbol doesn't span the sentence, or the decoder can't build a tree
/// from what the beam kept.
pub fn decode<S: ProbabilitySemiring>(
  grammar: &SparseGrammar,
  chart: &Chart<S>,
  tokens: &[&str],
  config: &ParserConfig,
) -> Option<Decoded> {
  if tokens.is_empty() || chart.size() != tokens.len() {
    return None;
  }
  match config.decode_method {
    DecodeMethod::ViterbiMax => viterbi::decode(grammar, chart, tokens),
    DecodeMethod::Goodman => maxc::decode(grammar, chart, tokens, config.maxc_lambda, false),
    DecodeMethod::SplitSum => maxc::decode(grammar, chart, tokens, config.maxc_lambda, true),
    DecodeMethod::MaxRuleProd => max_rule::decode(grammar, chart, tokens, config.max_rule_product),
  }
}

/// The label `nt` prints as. Split grammars print base labels: `NP_3` -> `NP`.
pub fn output_label(grammar: &SparseGrammar, nt: NonTerminal) -> &str {
  match grammar.split_vocabulary() {
    Some(vocab) => vocab.base_name(vocab.base(nt)),
    None => grammar.nt_name(nt),
  }
}

/// Removes binarization nodes
fn unfactor(tree: ParseTree) -> ParseTree {
  tree.unfactor(&|label: &String| is_factored_label(label))
}

/// Posterior probability of entry `i`, clamped to at most 1
fn posterior<S: ProbabilitySemiring>(cell: &Cell<'_>, i: usize, root_ln: f64) -> f64 {
  let g = (cell.inside_ln::<S>(i) + cell.outside_ln::<S>(i) - root_ln).exp();
  if g.is_nan() {
    0.0
  } else {
    g.min(1.0)
  }
}
