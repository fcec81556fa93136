//! AMIGOf phase-lag helpers
//!
//! Hägglund & Åström, "Revisiting the Ziegler-Nichols tuning rules for PI
//! control, Part II: the frequency response method", Asian Journal of
//! Control 6(4), 2004. The relay hysteresis fixes the phase lag of the
//! point found on the Nyquist curve; the rule wants it near 130°.

use core::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2, PI};

/// Target phase lag (rad)
pub const TARGET_PHASE_LAG: f64 = PI * 130.0 / 180.0;

/// Accepted deviation from the target (rad)
pub const PHASE_LAG_TOLERANCE: f64 = PI * 15.0 / 180.0;

/// Rational arctangent approximation, good to about 0.005 rad on [-1, 1]
#[inline]
pub fn fast_arctan(x: f64) -> f64 {
    x / (1.0 + 0.28125 * x * x)
}

/// Phase lag of the relay oscillation (rad)
///
/// `noise_band` is half the relay hysteresis and `amplitude` the induced
/// oscillation amplitude. A hysteresis wider than the oscillation
/// saturates at 90°.
pub fn phase_lag(noise_band: f64, amplitude: f64) -> f64 {
    let ratio = 2.0 * noise_band / amplitude;
    if ratio > 1.0 {
        FRAC_PI_2
    } else {
        PI - fast_arctan(ratio / libm::sqrt(1.0 - ratio * ratio))
    }
}

/// Check if a phase lag is close enough to the target
pub fn phase_lag_acceptable(phase_lag: f64) -> bool {
    libm::fabs(phase_lag - TARGET_PHASE_LAG) <= PHASE_LAG_TOLERANCE
}

/// Noise band that aims the next half cycles at 135°
pub fn retargeted_noise_band(amplitude: f64) -> f64 {
    amplitude * 0.5 * FRAC_1_SQRT_2
}

/// AMIGOf PI gains
///
/// `process_gain` is the static gain measured by the initial step. Returns
/// `(Kp, Ti)`; the rule has no derivative term.
pub fn amigof_gains(ku: f64, pu_s: f64, process_gain: f64, phase_lag: f64) -> (f64, f64) {
    let kappa = (1.0 / ku) / process_gain;
    let kp = ((2.50 - 0.92 * phase_lag) / (1.0 + (10.75 - 4.01 * phase_lag) * kappa)) * ku;
    let ti_denominator = 1.0 + (-6.10 + 3.44 * phase_lag) * kappa;
    let ti = ((-3.05 + 1.72 * phase_lag) / (ti_denominator * ti_denominator)) * pu_s;
    (kp, ti)
}
