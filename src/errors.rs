//! Error types for grammar loading and parser configuration.
//!
//! Parsing a sentence never produces one of these: a sentence without a
//! derivation is an ordinary [`ParseOutcome`](crate::inside_outside::ParseOutcome).

use std::num::ParseFloatError;

use crate::config::DecodeMethod;

/// Result type defaulting to [`GrammarError`]
pub type Result<T, E = GrammarError> = std::result::Result<T, E>;

/// Fatal errors while reading or constructing a grammar. There is no partial grammar.
#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
  /// A rule or lexicon line that doesn't have the shape `Parent -> Child(ren) logprob`
  #[error("line {line}: malformed production `{text}`")]
  MalformedLine { line: usize, text: String },

  /// The probability column is not a number
  #[error("line {line}: bad log probability `{value}`")]
  BadProbability {
    line: usize,
    value: String,
    #[source]
    source: ParseFloatError,
  },

  /// A header entry that isn't `key=value`
  #[error("line {line}: bad header entry `{entry}`")]
  BadHeader { line: usize, entry: String },

  /// A lexicon entry with more than one child
  #[error("line {line}: lexical productions take exactly one terminal: `{text}`")]
  LexicalArity { line: usize, text: String },

  /// The header declared the start symbol twice with different values
  #[error("conflicting start symbol declarations `{0}` and `{1}`")]
  ConflictingStartSymbol(String, String),

  /// The start symbol never heads a production
  #[error("start symbol `{0}` does not head any production")]
  MissingStartSymbol(String),

  /// The `===== LEXICON =====` delimiter was never seen
  #[error("missing lexicon delimiter")]
  MissingLexicon,

  /// No productions at all
  #[error("empty grammar")]
  Empty,

  /// More non-terminals than fit in a 16-bit index
  #[error("grammar has {0} non-terminals, more than the supported {max}", max = u16::MAX)]
  TooManyNonTerminals(usize),

  /// Failure reading a grammar file
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

/// Rejected parser configurations and option names.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  /// A beam width of zero can never hold an analysis
  #[error("{0} must be at least 1")]
  ZeroWidth(&'static str),

  /// The lexical row must keep room for non-unary entries
  #[error("lexical_row_unaries ({unaries}) must be smaller than lexical_row_beam_width ({width})")]
  LexicalUnaryBudget { unaries: usize, width: usize },

  /// `max_local_delta` must be a positive number
  #[error("max_local_delta must be positive, got {0}")]
  BadDelta(f64),

  /// A decoder that sums over latent splits was paired with an unsplit grammar
  #[error("decode method `{method}` needs a grammar with a split vocabulary (format=Berkeley)")]
  RequiresSplitVocabulary { method: DecodeMethod },

  /// An enumerated option was selected by a name that doesn't exist
  #[error("unknown {kind} `{name}`")]
  UnknownOption { kind: &'static str, name: String },
}
