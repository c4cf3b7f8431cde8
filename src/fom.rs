//! Figures of merit rank the candidates competing for a cell's beam.

use crate::rules::NonTerminal;

pub trait FigureOfMerit: Send + Sync {
  /// Larger is better. `log_inside` is the candidate's Viterbi log inside score.
  fn score(&self, start: usize, end: usize, nt: NonTerminal, log_inside: f64) -> f64;
}

/// Ranks by log inside score alone
#[derive(Debug, Clone, Copy, Default)]
pub struct InsideFom;

impl FigureOfMerit for InsideFom {
  #[inline]
  fn score(&self, _start: usize, _end: usize, _nt: NonTerminal, log_inside: f64) -> f64 {
    log_inside
  }
}

/// Log inside score per word of the span
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedInsideFom;

impl FigureOfMerit for NormalizedInsideFom {
  #[inline]
  fn score(&self, start: usize, end: usize, _nt: NonTerminal, log_inside: f64) -> f64 {
    log_inside / (end - start) as f64
  }
}

impl<F> FigureOfMerit for F
where
  F: Fn(usize, usize, NonTerminal, f64) -> f64 + Send + Sync,
{
  fn score(&self, start: usize, end: usize, nt: NonTerminal, log_inside: f64) -> f64 {
    self(start, end, nt, log_inside)
  }
}

#[test]
fn test_figures_of_merit() {
  assert_eq!(InsideFom.score(0, 4, 3, -8.0), -8.0);
  assert_eq!(NormalizedInsideFom.score(0, 4, 3, -8.0), -2.0);

  // a prior that prefers non-terminal 1
  let prior = |_: usize, _: usize, nt: NonTerminal, log_inside: f64| {
    if nt == 1 { log_inside + 1.0 } else { log_inside }
  };
  assert!(prior.score(0, 1, 1, -2.0) > prior.score(0, 1, 2, -2.0));
}
