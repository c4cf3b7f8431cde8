//! Line-based reading of grammar files.
//!
//! ```text
//! format=Berkeley start=ROOT_0 hMarkov=0 vMarkov=1
//! ROOT_0 -> S_0 0.0
//! S_0 -> NP_0 VP_0 -0.105
//! ===== LEXICON =====
//! NN_0 -> report -0.51
//! ```
//!
//! Probabilities are natural logs and are converted to the real domain here.

use crate::errors::GrammarError;
use crate::rules::{Production, Rule, merge_duplicates};

/// Metadata from the grammar's first line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
  /// `format=`; `Berkeley` marks latent-split non-terminals
  pub format: Option<String>,
  /// `start=`
  pub start: Option<String>,
  /// every other `key=value` entry, in order
  pub metadata: Vec<(String, String)>,
}

impl Header {
  pub fn is_split_format(&self) -> bool {
    self
      .format
      .as_deref()
      .map(|f| f.eq_ignore_ascii_case("berkeley"))
      .unwrap_or(false)
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self
      .metadata
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
  }
}

/// The contents of a grammar file, before indexing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrammarText {
  pub header: Header,
  /// binary and unary productions
  pub rules: Vec<Rule>,
  /// lexical productions
  pub lexicon: Vec<Rule>,
}

type ParseResult<T> = Result<T, GrammarError>;

fn is_delimiter(line: &str) -> bool {
  regex_static!(DELIMITER, r"^=+\s*LEXICON\s*=+$");
  DELIMITER.is_match(line)
}

/// Blank lines and `//` comments. `#` is a real treebank tag, so it doesn't start a comment.
fn is_skippable(line: &str) -> bool {
  line.is_empty() || (line.starts_with("//") && !line.contains(" -> "))
}

/// Parses one `key=value key=value ...` header line into `header`
fn parse_header(line_no: usize, line: &str, header: &mut Header) -> ParseResult<()> {
  regex_static!(ENTRY, r"^([^=\s]+)=(\S*)$");

  for entry in line.split_whitespace() {
    let caps = ENTRY.captures(entry).ok_or_else(|| GrammarError::BadHeader {
      line: line_no,
      entry: entry.to_string(),
    })?;
    let (key, value) = (&caps[1], &caps[2]);
    match key {
      "format" => header.format = Some(value.to_string()),
      "start" => match &header.start {
        Some(prev) if prev != value => {
          return Err(GrammarError::ConflictingStartSymbol(
            prev.clone(),
            value.to_string(),
          ));
        }
        _ => header.start = Some(value.to_string()),
      },
      _ => header.metadata.push((key.to_string(), value.to_string())),
    }
  }
  Ok(())
}

/// `Parent -> Child logprob` or `Parent -> Left Right logprob`
fn parse_production(line_no: usize, line: &str, lexical: bool) -> ParseResult<Rule> {
  regex_static!(PRODUCTION, r"^(\S+)\s+->\s+(\S+)(?:\s+(\S+))?\s+(\S+)$");

  let caps = PRODUCTION
    .captures(line)
    .ok_or_else(|| GrammarError::MalformedLine {
      line: line_no,
      text: line.to_string(),
    })?;

  let raw_prob = &caps[4];
  let log_prob: f64 = raw_prob.parse().map_err(|source| GrammarError::BadProbability {
    line: line_no,
    value: raw_prob.to_string(),
    source,
  })?;
  if log_prob.is_nan() || log_prob > 1e-6 {
    return Err(GrammarError::MalformedLine {
      line: line_no,
      text: line.to_string(),
    });
  }
  // tolerate rounding above 0 in hand-written files
  let prob = log_prob.min(0.0).exp();

  let parent = caps[1].to_string();
  let first = caps[2].to_string();
  match (caps.get(3), lexical) {
    (Some(_), true) => Err(GrammarError::LexicalArity {
      line: line_no,
      text: line.to_string(),
    }),
    (None, true) => Ok(Production::Lexical {
      parent,
      terminal: first,
      prob,
    }),
    (Some(second), false) => Ok(Production::Binary {
      parent,
      left: first,
      right: second.as_str().to_string(),
      prob,
    }),
    (None, false) => Ok(Production::Unary {
      parent,
      child: first,
      prob,
    }),
  }
}

/// Parses a whole grammar file. Errors if any line is malformed.
pub fn parse(s: &str) -> ParseResult<GrammarText> {
  let mut text = GrammarText::default();
  let mut in_lexicon = false;
  let mut seen_content = false;

  for (idx, raw) in s.lines().enumerate() {
    let line_no = idx + 1;
    let line = raw.trim();
    if is_skippable(line) {
      continue;
    }

    if !seen_content {
      seen_content = true;
      // the header is optional, but if present it is the first line
      if !line.contains("->") && line.contains('=') && !is_delimiter(line) {
        parse_header(line_no, line, &mut text.header)?;
        continue;
      }
    }

    if is_delimiter(line) {
      in_lexicon = true;
      continue;
    }

    let production = parse_production(line_no, line, in_lexicon)?;
    if in_lexicon {
      text.lexicon.push(production);
    } else {
      text.rules.push(production);
    }
  }

  if text.rules.is_empty() && text.lexicon.is_empty() {
    return Err(GrammarError::Empty);
  }
  if !in_lexicon {
    return Err(GrammarError::MissingLexicon);
  }

  text.rules = merge_duplicates(text.rules);
  text.lexicon = merge_duplicates(text.lexicon);
  Ok(text)
}
