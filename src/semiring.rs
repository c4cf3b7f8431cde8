//! Probability semirings the chart and the inside-outside engine are generic over.
//!
//! Chart values are plain `f64`s in both domains; the semiring decides how they
//! combine, how they are scaled and how they are read back as log probabilities.

use std::fmt::Debug;

use crate::scaling;
use crate::utils::log_sum_exp;

pub trait ProbabilitySemiring: Copy + Clone + Debug + Default + Send + Sync + 'static {
  /// Short name, used in log output
  const NAME: &'static str;

  /// The additive identity
  fn zero() -> f64;

  /// The multiplicative identity
  fn one() -> f64;

  /// Converts a rule weight, given both as a real probability and its natural log
  fn weight(prob: f64, log_prob: f64) -> f64;

  fn times(a: f64, b: f64) -> f64;

  fn plus(a: f64, b: f64) -> f64;

  fn is_zero(value: f64) -> bool {
    value == Self::zero()
  }

  /// Rescales a vector so it stays representable, returning the new scale step
  fn scale(values: &mut [f64], step: i32) -> i32;

  /// Moves a value `delta` scale steps (`value * SCALE^delta` in real terms)
  fn adjust(value: f64, delta: i32) -> f64;

  /// Natural log of the unscaled value
  fn ln(value: f64, step: i32) -> f64;
}

/// Real-domain probabilities with [`scaling`] steps. The default.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Real;

impl ProbabilitySemiring for Real {
  const NAME: &'static str = "real";

  #[inline]
  fn zero() -> f64 {
    0.0
  }

  #[inline]
  fn one() -> f64 {
    1.0
  }

  #[inline]
  fn weight(prob: f64, _log_prob: f64) -> f64 {
    prob
  }

  #[inline]
  fn times(a: f64, b: f64) -> f64 {
    a * b
  }

  #[inline]
  fn plus(a: f64, b: f64) -> f64 {
    a + b
  }

  fn scale(values: &mut [f64], step: i32) -> i32 {
    scaling::scale_array(values, step)
  }

  #[inline]
  fn adjust(value: f64, delta: i32) -> f64 {
    scaling::rescale(value, delta)
  }

  #[inline]
  fn ln(value: f64, step: i32) -> f64 {
    scaling::log_likelihood(value, step)
  }
}

/// Log-domain probabilities. Scaling is the identity, so every step stays 0.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Log;

impl ProbabilitySemiring for Log {
  const NAME: &'static str = "log";

  #[inline]
  fn zero() -> f64 {
    f64::NEG_INFINITY
  }

  #[inline]
  fn one() -> f64 {
    0.0
  }

  #[inline]
  fn weight(_prob: f64, log_prob: f64) -> f64 {
    log_prob
  }

  #[inline]
  fn times(a: f64, b: f64) -> f64 {
    a + b
  }

  #[inline]
  fn plus(a: f64, b: f64) -> f64 {
    log_sum_exp(a, b)
  }

  fn scale(_values: &mut [f64], step: i32) -> i32 {
    step
  }

  #[inline]
  fn adjust(value: f64, delta: i32) -> f64 {
    value + delta as f64 * scaling::SCALE_LN
  }

  #[inline]
  fn ln(value: f64, step: i32) -> f64 {
    value + step as f64 * scaling::SCALE_LN
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn inside_of_chain<S: ProbabilitySemiring>(probs: &[f64]) -> f64 {
    let product = probs
      .iter()
      .fold(S::one(), |acc, &p| S::times(acc, S::weight(p, p.ln())));
    S::ln(product, 0)
  }

  #[test]
  fn test_domains_agree() {
    let probs = [0.5, 0.25, 0.125];
    let real = inside_of_chain::<Real>(&probs);
    let log = inside_of_chain::<Log>(&probs);
    assert!((real - log).abs() < 1e-12);
    assert!((real - (1.0f64 / 64.0).ln()).abs() < 1e-12);
  }

  #[test]
  fn test_zero_is_absorbing() {
    assert!(Real::is_zero(Real::times(Real::zero(), 0.3)));
    assert!(Log::is_zero(Log::times(Log::zero(), -0.3)));
    assert_eq!(Log::plus(Log::zero(), -2.0), -2.0);
  }
}
