//! Relay-feedback auto-tuning
//!
//! Åström-Hägglund relay experiment: the output is switched between two
//! levels around its starting value whenever the process value leaves a
//! noise band around its starting value. The induced limit cycle gives the
//! ultimate gain `Ku = 4d / (πa)` and period `Pu`, which a tuning rule
//! turns into PID gains.
//!
//! Two refinements share the same state machine:
//! - relay bias correction re-centres an asymmetric oscillation;
//! - the AMIGOf PI rule measures the static process gain with an initial
//!   step and steers the relay hysteresis towards a 130° phase lag.

pub mod bias;
pub mod phase;
pub mod rules;
mod tuner;

pub use rules::{rule_for, TuningRule};
pub use tuner::{Tuner, TunerState};

/// Convergence tolerance on the peak amplitude spread
pub const PEAK_AMPLITUDE_TOLERANCE: f64 = 0.05;

/// Longest wait for a new peak or relay step before giving up (ms)
pub const MAX_WAIT_MS: u32 = 300_000;

/// Peak count at which the experiment is abandoned (10 cycles)
pub const MAX_PEAK_COUNT: u8 = 20;

/// Peaks kept for the convergence check
pub const PEAK_HISTORY: usize = 5;

/// Why an auto-tune run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TuneFailure {
    /// No new peak for [`MAX_WAIT_MS`]
    PeakTimeout,
    /// No relay step for [`MAX_WAIT_MS`] (relay bias only)
    StepTimeout,
    /// Oscillation did not settle within [`MAX_PEAK_COUNT`] peaks
    TooManyPeaks,
    /// Initial step produced no usable process gain (AMIGOf only)
    NoProcessGain,
}

/// Identified process and the gains derived from it
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TuneResult {
    /// Ultimate gain; negative when the plant acts opposite to the
    /// controller direction
    pub ku: f64,
    /// Ultimate period (s)
    pub pu_s: f64,
    /// Induced oscillation amplitude (process units)
    pub amplitude: f64,
    /// Proportional gain
    pub kp: f64,
    /// Integral time (s)
    pub ti_s: f64,
    /// Derivative time (s)
    pub td_s: f64,
}

/// How a finished run ended
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TuneOutcome {
    /// Gains identified
    Converged(TuneResult),
    /// Run abandoned; no gains written
    Failed(TuneFailure),
}

/// Errors when asking the tuner for its result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TuneError {
    /// No run has been started
    Idle,
    /// Run still in progress
    Running,
    /// Run ended without converging
    Failed(TuneFailure),
}
