#[macro_use]
extern crate lazy_static;

#[macro_use]
pub mod utils;

pub mod beam;
pub mod cells;
pub mod chart;
pub mod config;
pub mod decode;
pub mod errors;
pub mod fom;
pub mod grammar;
pub mod inside_outside;
pub mod packing;
pub mod parse_grammar;
pub mod reparse;
pub mod rules;
pub mod scaling;
pub mod semiring;
pub mod syntree;
pub mod vocab;

pub use crate::config::{DecodeMethod, ParserConfig, ReparseStrategy};
pub use crate::errors::{ConfigError, GrammarError};
pub use crate::grammar::SparseGrammar;
pub use crate::inside_outside::{InsideOutsideParser, Parse, ParseContext, ParseOutcome};
pub use crate::syntree::{ParseTree, SynTree};
pub use crate::utils::Err;

impl SparseGrammar {
  /// Parses `input` with `config` in a fresh context
  pub fn parse_with(&self, input: &[&str], config: ParserConfig) -> Result<ParseOutcome, ConfigError> {
    let parser = InsideOutsideParser::new(self, config)?;
    Ok(parser.parse(&mut parser.new_context(), input))
  }

  /// Viterbi parse of `input` with the default configuration
  pub fn parse(&self, input: &[&str]) -> ParseOutcome {
    // the default configuration is valid for every grammar
    self
      .parse_with(input, ParserConfig::default())
      .unwrap_or(ParseOutcome::Failed)
  }
}

#[test]
fn test_parse_fish() {
  let g: SparseGrammar = include_str!("../grammars/fish.gr").parse().unwrap();

  let outcome = g.parse(&["The", "fish", "market", "stands", "last"]);
  assert!(outcome.is_parsed());
  assert_eq!(
    outcome.to_string(),
    "(ROOT (S (NP (DT The) (NN fish) (NN market)) (VP (VB stands) (RB last))))"
  );

  assert!(matches!(
    g.parse_with(&["The"], ParserConfig::with_decode_method(DecodeMethod::SplitSum)),
    Err(ConfigError::RequiresSplitVocabulary { .. })
  ));
}
