use std::fmt;

#[derive(Debug, PartialEq, Clone)]
pub struct Constituent<T> {
  pub value: T,
  pub span: (usize, usize),
}

impl<T> fmt::Display for Constituent<T>
where
  T: fmt::Display,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}..{}: {}", self.span.0, self.span.1, self.value)
  }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Word<U> {
  pub value: U,
  pub span: (usize, usize),
}

impl<U> fmt::Display for Word<U>
where
  U: fmt::Display,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}..{}: {}", self.span.0, self.span.1, self.value)
  }
}

#[derive(Debug, PartialEq, Clone)]
pub enum SynTree<T, U> {
  Branch(Constituent<T>, Vec<SynTree<T, U>>),
  Leaf(Word<U>),
}

/// A parser output tree: labels over words
pub type ParseTree = SynTree<String, String>;

impl<T, U> SynTree<T, U> {
  pub fn branch(value: T, span: (usize, usize), children: Vec<SynTree<T, U>>) -> Self {
    Self::Branch(Constituent { value, span }, children)
  }

  pub fn leaf(value: U, position: usize) -> Self {
    Self::Leaf(Word {
      value,
      span: (position, position + 1),
    })
  }

  pub fn is_leaf(&self) -> bool {
    matches!(self, Self::Leaf(_))
  }

  pub fn is_branch(&self) -> bool {
    matches!(self, Self::Branch(_, _))
  }

  pub fn get_leaf(&self) -> Option<&Word<U>> {
    match self {
      Self::Leaf(w) => Some(w),
      _ => None,
    }
  }

  pub fn get_branch(&self) -> Option<(&Constituent<T>, &Vec<SynTree<T, U>>)> {
    match self {
      Self::Branch(c, cs) => Some((c, cs)),
      _ => None,
    }
  }

  pub fn into_branch(self) -> Option<(Constituent<T>, Vec<SynTree<T, U>>)> {
    match self {
      Self::Branch(c, cs) => Some((c, cs)),
      _ => None,
    }
  }

  pub fn span(&self) -> (usize, usize) {
    match self {
      Self::Branch(c, _) => c.span,
      Self::Leaf(w) => w.span,
    }
  }

  pub fn map<V, W>(
    &self,
    map_branch: &impl Fn(&Constituent<T>) -> V,
    map_leaf: &impl Fn(&Word<U>) -> W,
  ) -> SynTree<V, W> {
    match self {
      Self::Branch(t, children) => {
        let children = children
          .iter()
          .map(|c| c.map(map_branch, map_leaf))
          .collect::<Vec<_>>();
        SynTree::Branch(
          Constituent {
            span: t.span,
            value: map_branch(t),
          },
          children,
        )
      }
      Self::Leaf(u) => SynTree::Leaf(Word {
        span: u.span,
        value: map_leaf(u),
      }),
    }
  }

  /// Splices out every branch (other than the root) matching `is_factored`,
  /// moving its children up into its parent
  pub fn unfactor(self, is_factored: &impl Fn(&T) -> bool) -> Self {
    match self {
      Self::Leaf(w) => Self::Leaf(w),
      Self::Branch(c, children) => {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
          match child.unfactor(is_factored) {
            Self::Branch(cc, grandchildren) if is_factored(&cc.value) => flat.extend(grandchildren),
            other => flat.push(other),
          }
        }
        Self::Branch(c, flat)
      }
    }
  }

  /// Leaf values, left to right
  pub fn leaves(&self) -> Vec<&U> {
    let mut out = Vec::new();
    self.collect_leaves(&mut out);
    out
  }

  fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a U>) {
    match self {
      Self::Leaf(w) => out.push(&w.value),
      Self::Branch(_, children) => {
        for c in children {
          c.collect_leaves(out);
        }
      }
    }
  }

  /// Whether some branch has a single branch child that itself has a single branch child
  pub fn has_consecutive_unaries(&self) -> bool {
    fn unary_child<T, U>(t: &SynTree<T, U>) -> Option<&SynTree<T, U>> {
      match t {
        SynTree::Branch(_, cs) if cs.len() == 1 && cs[0].is_branch() => Some(&cs[0]),
        _ => None,
      }
    }
    match self {
      Self::Leaf(_) => false,
      Self::Branch(_, children) => {
        unary_child(self).and_then(unary_child).is_some()
          || children.iter().any(|c| c.has_consecutive_unaries())
      }
    }
  }
}

impl<T, U> SynTree<T, U>
where
  T: fmt::Display,
  U: fmt::Display,
{
  /// Indented rendering with spans, one constituent per line
  pub fn pretty(&self) -> String {
    let mut out = String::new();
    self.write_pretty(&mut out, 0);
    out
  }

  fn write_pretty(&self, out: &mut String, depth: usize) {
    let indent = "  ".repeat(depth);
    match self {
      Self::Leaf(w) => out.push_str(&format!("{}{}\n", indent, w)),
      Self::Branch(c, children) => {
        out.push_str(&format!("{}{}\n", indent, c));
        for child in children {
          child.write_pretty(out, depth + 1);
        }
      }
    }
  }
}

/// Penn treebank brackets: `(S (NP (DT The) (NN fish)) ...)`
impl<T, U> fmt::Display for SynTree<T, U>
where
  T: fmt::Display,
  U: fmt::Display,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Leaf(w) => write!(f, "{}", w.value),
      Self::Branch(c, children) => {
        write!(f, "({}", c.value)?;
        for child in children {
          write!(f, " {}", child)?;
        }
        write!(f, ")")
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tree() -> ParseTree {
    SynTree::branch(
      "NP".to_string(),
      (0, 3),
      vec![
        SynTree::branch("DT".into(), (0, 1), vec![SynTree::leaf("The".into(), 0)]),
        SynTree::branch(
          "@NP".into(),
          (1, 3),
          vec![
            SynTree::branch("NN".into(), (1, 2), vec![SynTree::leaf("fish".into(), 1)]),
            SynTree::branch("NN".into(), (2, 3), vec![SynTree::leaf("market".into(), 2)]),
          ],
        ),
      ],
    )
  }

  #[test]
  fn test_brackets() {
    assert_eq!(
      tree().to_string(),
      "(NP (DT The) (@NP (NN fish) (NN market)))"
    );
  }

  #[test]
  fn test_unfactor() {
    let flat = tree().unfactor(&|label: &String| label.starts_with('@'));
    assert_eq!(flat.to_string(), "(NP (DT The) (NN fish) (NN market))");
    assert_eq!(flat.leaves(), vec!["The", "fish", "market"]);
    assert_eq!(flat.span(), (0, 3));
  }

  #[test]
  fn test_map_and_pretty() {
    let lower = tree().map(&|c: &Constituent<String>| c.value.to_lowercase(), &|w: &Word<String>| w.value.len());
    assert_eq!(lower.to_string(), "(np (dt 3) (@np (nn 4) (nn 6)))");
    assert!(tree().pretty().starts_with("0..3: NP\n  0..1: DT\n    0..1: The\n"));
  }

  #[test]
  fn test_consecutive_unaries() {
    assert!(!tree().has_consecutive_unaries());
    let chain: ParseTree = SynTree::branch(
      "ROOT".into(),
      (0, 1),
      vec![SynTree::branch(
        "S".into(),
        (0, 1),
        vec![SynTree::branch("NP".into(), (0, 1), vec![SynTree::branch(
          "NN".into(),
          (0, 1),
          vec![SynTree::leaf("fish".into(), 0)],
        )])],
      )],
    );
    assert!(chain.has_consecutive_unaries());
  }
}
