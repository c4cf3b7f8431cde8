use std::error::Error;

/// Boxed static error type
pub type Err = Box<dyn Error + 'static>;

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: regex::Regex = regex::Regex::new($pattern).unwrap();
    }
  };
}

/// Relative tolerance used when two floating point scores should count as a tie
pub const TIE_TOLERANCE: f64 = 1e-9;

/// Compares two scores with a relative tolerance. Infinities only tie with themselves.
///
/// ```
/// use sparsecky::utils::roughly_equal;
///
/// assert!(roughly_equal(1.0, 1.0 + 1e-12));
/// assert!(!roughly_equal(1.0, 1.001));
/// assert!(roughly_equal(f64::NEG_INFINITY, f64::NEG_INFINITY));
/// ```
pub fn roughly_equal(a: f64, b: f64) -> bool {
  if a == b {
    return true;
  }
  if !a.is_finite() || !b.is_finite() {
    return false;
  }
  (a - b).abs() <= TIE_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

/// `ln(exp(a) + exp(b))` without leaving the log domain. Negative infinity is the zero.
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
  let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
  if lo == f64::NEG_INFINITY {
    hi
  } else {
    hi + (lo - hi).exp().ln_1p()
  }
}

#[test]
fn test_log_sum_exp() {
  let sum = log_sum_exp(0.25f64.ln(), 0.5f64.ln());
  assert!((sum - 0.75f64.ln()).abs() < 1e-12);
  assert_eq!(log_sum_exp(f64::NEG_INFINITY, -3.0), -3.0);
  assert_eq!(log_sum_exp(f64::NEG_INFINITY, f64::NEG_INFINITY), f64::NEG_INFINITY);
}
