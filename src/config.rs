use std::fmt;
use std::str::FromStr;

use crate::errors::ConfigError;

/// How the final tree is read off a completed chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DecodeMethod {
  /// Follow the best-derivation backpointers
  #[default]
  ViterbiMax,
  /// Goodman's maximum labelled-constituent tree
  Goodman,
  /// Goodman's decoder over posteriors summed across latent splits
  SplitSum,
  /// Maximum rule product over unsplit rules
  MaxRuleProd,
}

impl DecodeMethod {
  pub const ALL: [DecodeMethod; 4] = [
    Self::ViterbiMax,
    Self::Goodman,
    Self::SplitSum,
    Self::MaxRuleProd,
  ];

  /// Whether the decoder reads outside probabilities
  pub fn needs_outside(&self) -> bool {
    !matches!(self, Self::ViterbiMax)
  }

  /// Whether the decoder sums over latent splits of a base label
  pub fn needs_split_vocabulary(&self) -> bool {
    matches!(self, Self::SplitSum | Self::MaxRuleProd)
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::ViterbiMax => "viterbi",
      Self::Goodman => "goodman",
      Self::SplitSum => "split-sum",
      Self::MaxRuleProd => "max-rule",
    }
  }
}

impl fmt::Display for DecodeMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name())
  }
}

impl FromStr for DecodeMethod {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "viterbi" | "viterbimax" | "viterbi-max" => Ok(Self::ViterbiMax),
      "goodman" | "maxc" => Ok(Self::Goodman),
      "split-sum" | "splitsum" => Ok(Self::SplitSum),
      "max-rule" | "maxruleprod" | "max-rule-prod" => Ok(Self::MaxRuleProd),
      _ => Err(ConfigError::UnknownOption {
        kind: "decode method",
        name: s.to_string(),
      }),
    }
  }
}

/// Which beam stages to try, in order, when a stage finds no complete parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReparseStrategy {
  /// Only the configured beam
  None,
  /// Keep doubling the beam
  Double,
  /// Fall back to a fixed beam without cell constraints
  FixedBeam,
  /// Fall back to exhaustive search
  Exhaustive,
  /// Double, then a fixed beam, then exhaustive
  #[default]
  Escalate,
}

impl fmt::Display for ReparseStrategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::None => "none",
      Self::Double => "double",
      Self::FixedBeam => "fixed-beam",
      Self::Exhaustive => "exhaustive",
      Self::Escalate => "escalate",
    };
    write!(f, "{}", name)
  }
}

impl FromStr for ReparseStrategy {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "none" => Ok(Self::None),
      "double" => Ok(Self::Double),
      "fixed-beam" | "fixedbeam" => Ok(Self::FixedBeam),
      "exhaustive" => Ok(Self::Exhaustive),
      "escalate" => Ok(Self::Escalate),
      _ => Err(ConfigError::UnknownOption {
        kind: "reparse strategy",
        name: s.to_string(),
      }),
    }
  }
}

/// How non-terminal ids are assigned when a grammar is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NonTerminalOrdering {
  /// Start symbol, left-only children, children on both sides, right-only children, the rest
  #[default]
  LeftRightBottomTop,
  /// Parts of speech first
  PosFirst,
  /// By label
  Lexicographic,
}

impl FromStr for NonTerminalOrdering {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "left-right-bottom-top" | "lrbt" => Ok(Self::LeftRightBottomTop),
      "pos-first" | "posfirst" => Ok(Self::PosFirst),
      "lexicographic" | "lex" => Ok(Self::Lexicographic),
      _ => Err(ConfigError::UnknownOption {
        kind: "non-terminal ordering",
        name: s.to_string(),
      }),
    }
  }
}

/// Parser settings. Widths are counts of non-terminals per cell.
#[derive(Debug, Clone, PartialEq)]
pub struct ParserConfig {
  /// Entries kept per cell of span > 1
  pub beam_width: usize,
  /// Entries kept per span-1 cell
  pub lexical_row_beam_width: usize,
  /// Part of `lexical_row_beam_width` reserved for unary parents of parts of speech
  pub lexical_row_unaries: usize,
  /// Entries more than this many nats below the best inside score of their cell are dropped
  pub max_local_delta: f64,
  /// Unary chain length covered by exhaustive unary closure
  pub exhaustive_unary_iterations: usize,
  pub decode_method: DecodeMethod,
  /// Goodman/split-sum penalty per constituent of span > 1; 0 favors recall, 1 precision
  pub maxc_lambda: f64,
  /// Multiply in the children's scores (max-rule-product) rather than adding them (max-rule-sum)
  pub max_rule_product: bool,
  pub reparse: ReparseStrategy,
  /// Width used by the fixed-beam reparse stage
  pub fixed_beam_width: usize,
}

impl Default for ParserConfig {
  fn default() -> Self {
    Self {
      beam_width: 30,
      lexical_row_beam_width: 60,
      lexical_row_unaries: 20,
      max_local_delta: 15.0,
      exhaustive_unary_iterations: 2,
      decode_method: DecodeMethod::default(),
      maxc_lambda: 0.0,
      max_rule_product: true,
      reparse: ReparseStrategy::default(),
      fixed_beam_width: 100,
    }
  }
}

impl ParserConfig {
  /// The default configuration with a different decoder
  pub fn with_decode_method(decode_method: DecodeMethod) -> Self {
    Self {
      decode_method,
      ..Default::default()
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.beam_width == 0 {
      return Err(ConfigError::ZeroWidth("beam_width"));
    }
    if self.lexical_row_beam_width == 0 {
      return Err(ConfigError::ZeroWidth("lexical_row_beam_width"));
    }
    if self.fixed_beam_width == 0 {
      return Err(ConfigError::ZeroWidth("fixed_beam_width"));
    }
    if self.lexical_row_unaries >= self.lexical_row_beam_width {
      return Err(ConfigError::LexicalUnaryBudget {
        unaries: self.lexical_row_unaries,
        width: self.lexical_row_beam_width,
      });
    }
    if !(self.max_local_delta > 0.0) {
      return Err(ConfigError::BadDelta(self.max_local_delta));
    }
    Ok(())
  }
}
