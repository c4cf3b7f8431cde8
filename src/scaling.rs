//! Fixed-step rescaling of real-domain probability vectors.
//!
//! A vector stored with scale step `k` represents the values `v * SCALE^k`.
//! Keeping every cell's maximum inside `[1/SCALE, SCALE]` lets long sentences
//! be parsed in the real domain without underflowing.

/// `ln(SCALE)`
pub const SCALE_LN: f64 = 100.0;

/// `e^100`
pub const SCALE: f64 = 2.688_117_141_816_135_6e43;

/// `1 / SCALE`
pub const INVERSE_SCALE: f64 = 1.0 / SCALE;

/// Rescales `values` in place until the largest magnitude is within `[1/SCALE, SCALE]`,
/// returning the updated scale step. An all-zero vector is left untouched; a
/// vector holding an infinity or NaN is left as it is at step 0.
pub fn scale_array(values: &mut [f64], step: i32) -> i32 {
  if values.iter().any(|v| !v.is_finite()) {
    return 0;
  }
  let max = values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
  if max == 0.0 {
    return step;
  }

  let delta = scale_delta(max);
  if delta != 0 {
    let factor = SCALE.powi(-delta);
    for v in values.iter_mut() {
      *v *= factor;
    }
  }
  step + delta
}

/// Number of steps a vector with finite, non-zero maximum `max` has to move
fn scale_delta(max: f64) -> i32 {
  let mut delta = 0;
  let mut m = max;
  while m > SCALE {
    m *= INVERSE_SCALE;
    delta += 1;
  }
  while m < INVERSE_SCALE {
    m *= SCALE;
    delta -= 1;
  }
  delta
}

/// Multiplies `value` by `SCALE^delta`; used to bring a product onto a cell's common step
#[inline]
pub fn rescale(value: f64, delta: i32) -> f64 {
  match delta {
    0 => value,
    -1 => value * INVERSE_SCALE,
    1 => value * SCALE,
    _ => value * SCALE.powi(delta),
  }
}

/// The real value represented by `value` at scale step `step`.
/// Steps too large for `SCALE^step` go through the log domain.
pub fn unscale(value: f64, step: i32) -> f64 {
  if value == 0.0 || step == 0 {
    return value;
  }
  if step.abs() < 7 {
    value * SCALE.powi(step)
  } else {
    value.signum() * (value.abs().ln() + step as f64 * SCALE_LN).exp()
  }
}

/// `ln(unscale(value, step))` without materializing the unscaled value
#[inline]
pub fn log_likelihood(value: f64, step: i32) -> f64 {
  value.ln() + step as f64 * SCALE_LN
}
