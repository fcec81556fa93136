//! Closed-loop control
//!
//! - [`pid`]: PID controller with embedded auto-tuner
//! - [`autotune`]: relay-feedback auto-tuner and tuning rules
//! - [`driver`]: loop driver tying a controller to input and output devices

pub mod autotune;
pub mod driver;
pub mod history;
pub mod pid;

pub use driver::{ControlLoop, LoopStatus};
pub use pid::{Controller, Tick};

/// Output range in percent
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputLimits {
    /// Lowest output
    pub min: f64,
    /// Highest output
    pub max: f64,
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 100.0,
        }
    }
}

impl OutputLimits {
    /// Create limits, rejecting `min >= max` and NaN
    pub fn new(min: f64, max: f64) -> Option<Self> {
        if min < max {
            Some(Self { min, max })
        } else {
            None
        }
    }

    /// Clamp a value into the limits
    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        if value > self.max {
            self.max
        } else if value < self.min {
            self.min
        } else {
            value
        }
    }
}
