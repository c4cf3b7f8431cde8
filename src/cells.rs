//! Cell selectors restrict which spans the parser populates and how.

use std::collections::{HashMap, HashSet};

/// Every `(start, end)` span of an `n`-word sentence, shortest spans first, left to right
pub fn bottom_up(n: usize) -> impl Iterator<Item = (usize, usize)> {
  (1..=n).flat_map(move |span| (0..=n - span).map(move |start| (start, start + span)))
}

/// Every span, longest first. Valid outside-pass order.
pub fn top_down(n: usize) -> impl Iterator<Item = (usize, usize)> {
  (1..=n)
    .rev()
    .flat_map(move |span| (0..=n - span).map(move |start| (start, start + span)))
}

pub trait CellSelector: Send + Sync {
  /// Whether any cell is restricted. When false the parser skips the per-cell queries.
  fn has_cell_constraints(&self) -> bool;

  /// Closed cells stay empty
  fn is_cell_open(&self, start: usize, end: usize) -> bool;

  /// Only factored parents may be built in this cell
  fn is_cell_only_factored(&self, start: usize, end: usize) -> bool;

  fn is_unary_open(&self, start: usize, end: usize) -> bool;

  /// A beam width for this cell overriding the configured one
  fn beam_width(&self, start: usize, end: usize) -> Option<usize>;

  /// Cells in the order the inside pass visits them. Must visit sub-spans before their parents.
  fn inside_order(&self, n: usize) -> Vec<(usize, usize)> {
    bottom_up(n).collect()
  }

  fn outside_order(&self, n: usize) -> Vec<(usize, usize)> {
    top_down(n).collect()
  }
}

/// Leaves every cell open with no restrictions
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConstraints;

impl CellSelector for NoConstraints {
  fn has_cell_constraints(&self) -> bool {
    false
  }

  fn is_cell_open(&self, _start: usize, _end: usize) -> bool {
    true
  }

  fn is_cell_only_factored(&self, _start: usize, _end: usize) -> bool {
    false
  }

  fn is_unary_open(&self, _start: usize, _end: usize) -> bool {
    true
  }

  fn beam_width(&self, _start: usize, _end: usize) -> Option<usize> {
    None
  }
}

/// Explicit per-cell restrictions, for constrained parsing
#[derive(Debug, Clone, Default)]
pub struct ConstrainedCells {
  closed: HashSet<(usize, usize)>,
  only_factored: HashSet<(usize, usize)>,
  unary_closed: HashSet<(usize, usize)>,
  beam_widths: HashMap<(usize, usize), usize>,
}

impl ConstrainedCells {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn close(mut self, start: usize, end: usize) -> Self {
    self.closed.insert((start, end));
    self
  }

  pub fn only_factored(mut self, start: usize, end: usize) -> Self {
    self.only_factored.insert((start, end));
    self
  }

  pub fn close_unaries(mut self, start: usize, end: usize) -> Self {
    self.unary_closed.insert((start, end));
    self
  }

  pub fn with_beam_width(mut self, start: usize, end: usize, width: usize) -> Self {
    self.beam_widths.insert((start, end), width);
    self
  }

  /// Opens only the cells of the given bracketing, plus the span-1 cells
  pub fn from_brackets(n: usize, brackets: &[(usize, usize)]) -> Self {
    let open: HashSet<(usize, usize)> = brackets.iter().copied().collect();
    let mut constraints = Self::new();
    for (start, end) in bottom_up(n) {
      if end - start > 1 && !open.contains(&(start, end)) {
        constraints = constraints.close(start, end);
      }
    }
    constraints
  }
}

impl CellSelector for ConstrainedCells {
  fn has_cell_constraints(&self) -> bool {
    !(self.closed.is_empty()
      && self.only_factored.is_empty()
      && self.unary_closed.is_empty()
      && self.beam_widths.is_empty())
  }

  fn is_cell_open(&self, start: usize, end: usize) -> bool {
    !self.closed.contains(&(start, end))
  }

  fn is_cell_only_factored(&self, start: usize, end: usize) -> bool {
    self.only_factored.contains(&(start, end))
  }

  fn is_unary_open(&self, start: usize, end: usize) -> bool {
    !self.unary_closed.contains(&(start, end))
  }

  fn beam_width(&self, start: usize, end: usize) -> Option<usize> {
    self.beam_widths.get(&(start, end)).copied()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_orders() {
    let up: Vec<_> = bottom_up(3).collect();
    assert_eq!(up, vec![(0, 1), (1, 2), (2, 3), (0, 2), (1, 3), (0, 3)]);
    let down: Vec<_> = top_down(3).collect();
    assert_eq!(down, vec![(0, 3), (0, 2), (1, 3), (0, 1), (1, 2), (2, 3)]);
    assert_eq!(NoConstraints.inside_order(3), up);
  }

  #[test]
  fn test_constrained_cells() {
    let c = ConstrainedCells::new()
      .close(0, 2)
      .only_factored(1, 3)
      .close_unaries(2, 3)
      .with_beam_width(0, 3, 4);
    assert!(c.has_cell_constraints());
    assert!(!c.is_cell_open(0, 2));
    assert!(c.is_cell_open(1, 3));
    assert!(c.is_cell_only_factored(1, 3));
    assert!(!c.is_unary_open(2, 3));
    assert_eq!(c.beam_width(0, 3), Some(4));
    assert_eq!(c.beam_width(0, 1), None);
    assert!(!ConstrainedCells::new().has_cell_constraints());
  }

  #[test]
  fn test_from_brackets() {
    let c = ConstrainedCells::from_brackets(4, &[(0, 4), (1, 3)]);
    assert!(c.is_cell_open(0, 4));
    assert!(c.is_cell_open(1, 3));
    assert!(c.is_cell_open(2, 3));
    assert!(!c.is_cell_open(0, 2));
    assert!(!c.is_cell_open(1, 4));
  }
}
