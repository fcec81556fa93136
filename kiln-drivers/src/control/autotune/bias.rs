//! Relay bias estimation
//!
//! An asymmetric oscillation means the relay is not centred on the output
//! that holds the setpoint. Modelling the process value as a trapezoidal
//! wave with amplitude `a`, period `t`, a fraction `m` of the half period
//! spent at the extremes and an offset `d × a`, the relay step ratio is
//!
//! ```text
//! r1 = (1 - d + d m) / (1 + d - d m)
//! ```
//!
//! and the ratio of the integrated process value over alternate half
//! cycles is
//!
//! ```text
//! r2 = (1 - d)(1 - d + m(1 + d)) / ((1 + d)(1 + d + m(1 - d)))
//! ```
//!
//! Eliminating `m` gives a quadratic in `d` (Yu, "Autotuning of PID
//! Controllers", 2nd ed., eq. 7.39).

use crate::control::OutputLimits;

/// Values below this are treated as zero (one-sided: negatives included)
pub const ZERO_THRESHOLD: f64 = 1e-10;

/// Relay step asymmetry that triggers a bias correction
pub const STEP_ASYMMETRY_TOLERANCE: f64 = 0.20;

#[inline]
pub(crate) fn is_zero(x: f64) -> bool {
    x < ZERO_THRESHOLD
}

/// Relative asymmetry of two half-cycle durations
///
/// Returns `None` when either duration is zero.
pub fn step_asymmetry(avg_step1: f64, avg_step2: f64) -> Option<f64> {
    if is_zero(avg_step1) || is_zero(avg_step2) {
        return None;
    }
    Some(if avg_step1 > avg_step2 {
        (avg_step1 - avg_step2) / avg_step1
    } else {
        (avg_step2 - avg_step1) / avg_step2
    })
}

/// Offset of the oscillation as a proportion of its amplitude
///
/// `avg_step1`/`avg_step2` are the summed durations of alternate relay
/// half cycles and `sum1`/`sum2` the summed integrated process values over
/// the same half cycles. Degenerate inputs short-circuit to ±1.
pub fn process_value_offset(avg_step1: f64, avg_step2: f64, sum1: f64, sum2: f64) -> f64 {
    if is_zero(avg_step1) {
        return 1.0;
    }
    if is_zero(avg_step2) {
        return -1.0;
    }
    let r1 = avg_step1 / avg_step2;

    if is_zero(sum1) {
        return 1.0;
    }
    if is_zero(sum2) {
        return -1.0;
    }
    let r2 = sum1 / sum2;

    let mut discriminant = (1.0 - r2) * (r1 * r1 - r2);
    if is_zero(discriminant) {
        discriminant = 0.0;
    }

    let root_sign = if r1 > 1.0 { 1.0 } else { -1.0 };
    ((1.0 + r1) * (1.0 - r2) + root_sign * libm::sqrt(discriminant))
        / (r1 * r2 + 3.0 * (r1 + r2) + 1.0)
}

/// Relay levels for a new bias, shrunk to fit the output limits
///
/// Returns `(step, bias)` keeping both relay levels inside `limits`, or
/// `None` when the biased relay would have no room left to switch.
pub fn clamped_relay(
    output_start: f64,
    step: f64,
    bias: f64,
    limits: OutputLimits,
) -> Option<(f64, f64)> {
    let high = (output_start + step + bias).min(limits.max);
    let low = (output_start - step + bias).max(limits.min);
    if high <= low {
        return None;
    }
    let step = 0.5 * (high - low);
    Some((step, high - output_start - step))
}
