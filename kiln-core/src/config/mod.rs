//! Configuration types
//!
//! Board-agnostic controller settings, stored as postcard binary data.

pub mod settings;

pub use settings::*;

/// Rejected configuration change
///
/// The previous value is always left in place when one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A tuning gain was below zero
    NegativeGain,
    /// Sample interval of zero milliseconds
    ZeroSampleTime,
    /// Output limits with `min >= max`
    InvalidLimits,
    /// Value could not be represented or was NaN
    OutOfRange,
    /// Auto-tune is already running
    AlreadyTuning,
    /// Relay step left no room between the output and its limits
    NoRelayHeadroom,
}
