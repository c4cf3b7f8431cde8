use std::fmt;

/// Dense non-terminal id
pub type NonTerminal = u16;

/// Dense terminal (word) id
pub type Terminal = u32;

/// A weighted production. Probabilities are real-domain.
///
/// `N` is the non-terminal type and `T` the terminal type: the grammar reader
/// produces `Production<String, String>`, the sparse grammar indexes them into
/// `Production<NonTerminal, Terminal>`.
#[derive(Debug, Clone, PartialEq)]
pub enum Production<N, T> {
  Binary { parent: N, left: N, right: N, prob: f64 },
  Unary { parent: N, child: N, prob: f64 },
  Lexical { parent: N, terminal: T, prob: f64 },
}

/// A production as written in a grammar file
pub type Rule = Production<String, String>;

/// A production over grammar ids
pub type IndexedProduction = Production<NonTerminal, Terminal>;

impl<N, T> Production<N, T> {
  pub fn parent(&self) -> &N {
    match self {
      Self::Binary { parent, .. } | Self::Unary { parent, .. } | Self::Lexical { parent, .. } => {
        parent
      }
    }
  }

  pub fn prob(&self) -> f64 {
    match self {
      Self::Binary { prob, .. } | Self::Unary { prob, .. } | Self::Lexical { prob, .. } => *prob,
    }
  }

  pub fn set_prob(&mut self, p: f64) {
    match self {
      Self::Binary { prob, .. } | Self::Unary { prob, .. } | Self::Lexical { prob, .. } => {
        *prob = p
      }
    }
  }

  pub fn is_binary(&self) -> bool {
    matches!(self, Self::Binary { .. })
  }

  pub fn is_unary(&self) -> bool {
    matches!(self, Self::Unary { .. })
  }

  pub fn is_lexical(&self) -> bool {
    matches!(self, Self::Lexical { .. })
  }
}

impl<N: Clone, T: Clone> Production<N, T> {
  /// Everything but the probability, for merging duplicate productions
  pub fn key(&self) -> (N, Option<N>, Option<N>, Option<T>) {
    match self {
      Self::Binary {
        parent, left, right, ..
      } => (parent.clone(), Some(left.clone()), Some(right.clone()), None),
      Self::Unary { parent, child, .. } => (parent.clone(), Some(child.clone()), None, None),
      Self::Lexical {
        parent, terminal, ..
      } => (parent.clone(), None, None, Some(terminal.clone())),
    }
  }
}

impl<N: fmt::Display, T: fmt::Display> fmt::Display for Production<N, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Binary {
        parent,
        left,
        right,
        prob,
      } => write!(f, "{} -> {} {} {}", parent, left, right, prob.ln()),
      Self::Unary {
        parent,
        child,
        prob,
      } => write!(f, "{} -> {} {}", parent, child, prob.ln()),
      Self::Lexical {
        parent,
        terminal,
        prob,
      } => write!(f, "{} -> {} {}", parent, terminal, prob.ln()),
    }
  }
}

/// Sums the probabilities of productions that only differ in probability,
/// keeping the first occurrence's position
pub fn merge_duplicates<N, T>(productions: Vec<Production<N, T>>) -> Vec<Production<N, T>>
where
  N: Clone + Eq + std::hash::Hash,
  T: Clone + Eq + std::hash::Hash,
{
  let mut seen = std::collections::HashMap::new();
  let mut merged: Vec<Production<N, T>> = Vec::with_capacity(productions.len());
  for p in productions {
    match seen.get(&p.key()) {
      Some(&idx) => {
        let prev: &mut Production<N, T> = &mut merged[idx];
        let sum = prev.prob() + p.prob();
        prev.set_prob(sum);
      }
      None => {
        seen.insert(p.key(), merged.len());
        merged.push(p);
      }
    }
  }
  merged
}

#[test]
fn test_merge_duplicates() {
  let rules: Vec<Rule> = vec![
    Production::Unary {
      parent: "NP".into(),
      child: "NN".into(),
      prob: 0.25,
    },
    Production::Lexical {
      parent: "NN".into(),
      terminal: "fish".into(),
      prob: 0.5,
    },
    Production::Unary {
      parent: "NP".into(),
      child: "NN".into(),
      prob: 0.5,
    },
  ];
  let merged = merge_duplicates(rules);
  assert_eq!(merged.len(), 2);
  assert!((merged[0].prob() - 0.75).abs() < 1e-12);
  assert!(merged[1].is_lexical());
}
