//! Trip monitor implementation
//!
//! Watches the process value against lower and upper trip limits. A trip
//! forces the output to 0 % until it is cleared, either automatically once
//! the value is back inside the limits or by an explicit reset.

use crate::decimal::FixedDecimal;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Trip limit configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TripSettings {
    /// Check the limits at all (sensor faults always trip)
    pub enabled: bool,
    /// Trip when the process value falls below this
    pub lower: FixedDecimal<1>,
    /// Trip when the process value rises above this
    pub upper: FixedDecimal<1>,
    /// Clear the trip without a reset once the condition goes away
    pub auto_reset: bool,
}

impl Default for TripSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            lower: FixedDecimal::from_int(0),
            upper: FixedDecimal::from_int(125),
            auto_reset: false,
        }
    }
}

/// Why the monitor tripped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TripFault {
    /// Sensor returned NaN
    SensorFault,
    /// Process value below the lower limit
    BelowLimit,
    /// Process value above the upper limit
    AboveLimit,
}

/// Trip condition status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TripStatus {
    /// All conditions normal
    Ok,
    /// Output must be forced off
    Tripped(TripFault),
}

/// Trip monitor for the process value
#[derive(Debug, Clone)]
pub struct TripMonitor {
    settings: TripSettings,
    /// Latched fault (held until reset unless auto-reset)
    latched: Option<TripFault>,
}

impl Default for TripMonitor {
    fn default() -> Self {
        Self::new(TripSettings::default())
    }
}

impl TripMonitor {
    /// Create a new trip monitor
    pub fn new(settings: TripSettings) -> Self {
        Self {
            settings,
            latched: None,
        }
    }

    /// Current settings
    pub fn settings(&self) -> &TripSettings {
        &self.settings
    }

    /// Replace the settings; a latched trip stays latched
    pub fn set_settings(&mut self, settings: TripSettings) {
        self.settings = settings;
    }

    /// Evaluate one reading (NaN for a sensor fault)
    pub fn update(&mut self, input: f64) -> TripStatus {
        let fault = self.evaluate(input);

        match (fault, self.latched) {
            (Some(fault), _) => self.latched = Some(fault),
            (None, Some(_)) if self.settings.auto_reset => self.latched = None,
            _ => {}
        }

        self.status()
    }

    /// Current status without a new reading
    pub fn status(&self) -> TripStatus {
        match self.latched {
            Some(fault) => TripStatus::Tripped(fault),
            None => TripStatus::Ok,
        }
    }

    /// Check if the output must be forced off
    pub fn is_tripped(&self) -> bool {
        self.latched.is_some()
    }

    /// Clear a latched trip if the last reading is back inside the limits
    ///
    /// Returns `true` if the monitor is clear afterwards.
    pub fn reset(&mut self, input: f64) -> bool {
        if self.evaluate(input).is_none() {
            self.latched = None;
        }
        self.latched.is_none()
    }

    fn evaluate(&self, input: f64) -> Option<TripFault> {
        if input.is_nan() {
            return Some(TripFault::SensorFault);
        }
        if !self.settings.enabled {
            return None;
        }
        if input < self.settings.lower.to_f64() {
            Some(TripFault::BelowLimit)
        } else if input > self.settings.upper.to_f64() {
            Some(TripFault::AboveLimit)
        } else {
            None
        }
    }
}
