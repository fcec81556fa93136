//! Controller settings snapshot
//!
//! Everything the persistence layer needs to restore a controller after a
//! power cycle: display gains, mode, direction, timing, limits and the
//! auto-tune parameters. All values are kept in fixed-point form so that a
//! save/load cycle reproduces them exactly.

use crate::decimal::FixedDecimal;
use crate::mode::{Direction, Mode};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Magic number to identify valid settings data
pub const SETTINGS_MAGIC: u32 = 0x4B494C4E; // "KILN"

/// Current settings layout version
pub const SETTINGS_VERSION: u8 = 1;

/// Default sample interval for the control loop (ms)
pub const DEFAULT_SAMPLE_TIME_MS: u32 = 1000;

/// Largest lookback window the tuner can hold, in samples
pub const MAX_LOOKBACK_SAMPLES: u16 = 100;

/// Relay-feedback tuning rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TuningMethod {
    ZieglerNicholsPi,
    #[default]
    ZieglerNicholsPid,
    TyreusLuybenPi,
    TyreusLuybenPid,
    CianconeMarlinPi,
    CianconeMarlinPid,
    PessenIntegralPid,
    SomeOvershootPid,
    NoOvershootPid,
    /// Phase-lag targeting PI rule; needs a baseline before the relay starts
    AmigofPi,
}

impl TuningMethod {
    /// All methods in menu order
    pub const ALL: [Self; 10] = [
        Self::ZieglerNicholsPi,
        Self::ZieglerNicholsPid,
        Self::TyreusLuybenPi,
        Self::TyreusLuybenPid,
        Self::CianconeMarlinPi,
        Self::CianconeMarlinPid,
        Self::PessenIntegralPid,
        Self::SomeOvershootPid,
        Self::NoOvershootPid,
        Self::AmigofPi,
    ];

    /// Position in [`TuningMethod::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Look up a method by its menu index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Short name for menus and logs
    pub const fn label(self) -> &'static str {
        match self {
            Self::ZieglerNicholsPi => "ZN PI",
            Self::ZieglerNicholsPid => "ZN PID",
            Self::TyreusLuybenPi => "TL PI",
            Self::TyreusLuybenPid => "TL PID",
            Self::CianconeMarlinPi => "CM PI",
            Self::CianconeMarlinPid => "CM PID",
            Self::PessenIntegralPid => "Pessen PID",
            Self::SomeOvershootPid => "Some OS PID",
            Self::NoOvershootPid => "No OS PID",
            Self::AmigofPi => "AMIGOf PI",
        }
    }

    /// Check if this method waits for a steady baseline before the relay
    pub const fn needs_baseline(self) -> bool {
        matches!(self, Self::AmigofPi)
    }
}

/// Auto-tune parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TunerSettings {
    /// Tuning rule applied to Ku/Pu
    pub method: TuningMethod,
    /// Relay step around the starting output (percent)
    pub step: FixedDecimal<1>,
    /// Half-width of the relay dead zone (process units)
    pub noise_band: FixedDecimal<3>,
    /// Window used for peak detection and steady-state checks (seconds)
    pub lookback_s: u16,
    /// Correct relay asymmetry by shifting both output levels
    pub relay_bias: bool,
}

impl Default for TunerSettings {
    fn default() -> Self {
        Self {
            method: TuningMethod::ZieglerNicholsPid,
            step: FixedDecimal::from_int(100),
            noise_band: FixedDecimal::from_raw(500), // 0.5
            lookback_s: 10,
            relay_bias: false,
        }
    }
}

impl TunerSettings {
    /// Number of samples in the lookback window at the given loop interval
    ///
    /// Clamped to `1..=MAX_LOOKBACK_SAMPLES`.
    pub fn lookback_samples(&self, sample_time_ms: u32) -> u16 {
        let sample_time_ms = sample_time_ms.max(1) as u64;
        let samples = self.lookback_s as u64 * 1000 / sample_time_ms;
        samples.clamp(1, MAX_LOOKBACK_SAMPLES as u64) as u16
    }
}

/// Persistent controller settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ControllerSettings {
    /// Must equal [`SETTINGS_MAGIC`]
    pub magic: u32,
    /// Layout version
    pub version: u8,
    /// Proportional gain
    pub kp: FixedDecimal<3>,
    /// Integral gain (per second)
    pub ki: FixedDecimal<3>,
    /// Derivative gain (seconds)
    pub kd: FixedDecimal<3>,
    /// Controller action
    pub direction: Direction,
    /// Manual or automatic
    pub mode: Mode,
    /// Loop interval (ms)
    pub sample_time_ms: u32,
    /// Setpoint (process units)
    pub setpoint: FixedDecimal<1>,
    /// Lower output limit (percent)
    pub output_min: FixedDecimal<1>,
    /// Upper output limit (percent)
    pub output_max: FixedDecimal<1>,
    /// Output applied in manual mode (percent)
    pub manual_output: FixedDecimal<1>,
    /// Auto-tune parameters
    pub tuner: TunerSettings,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            magic: SETTINGS_MAGIC,
            version: SETTINGS_VERSION,
            kp: FixedDecimal::from_int(2),
            ki: FixedDecimal::from_raw(500),
            kd: FixedDecimal::from_int(2),
            direction: Direction::Direct,
            mode: Mode::Manual,
            sample_time_ms: DEFAULT_SAMPLE_TIME_MS,
            setpoint: FixedDecimal::from_int(25),
            output_min: FixedDecimal::ZERO,
            output_max: FixedDecimal::from_int(100),
            manual_output: FixedDecimal::ZERO,
            tuner: TunerSettings::default(),
        }
    }
}

/// Settings persistence errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingsError {
    /// Serialization failed (buffer too small)
    Serialize,
    /// Deserialization failed
    Deserialize,
    /// Data did not start with the settings magic number
    BadMagic,
    /// Settings layout version mismatch
    VersionMismatch,
}

impl ControllerSettings {
    /// Check the magic number and version
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.magic != SETTINGS_MAGIC {
            return Err(SettingsError::BadMagic);
        }
        if self.version != SETTINGS_VERSION {
            return Err(SettingsError::VersionMismatch);
        }
        Ok(())
    }

    /// Serialize into `buf`, returning the used prefix
    #[cfg(feature = "serde")]
    pub fn encode<'a>(&self, buf: &'a mut [u8]) -> Result<&'a mut [u8], SettingsError> {
        postcard::to_slice(self, buf).map_err(|_| SettingsError::Serialize)
    }

    /// Deserialize and validate settings written by [`ControllerSettings::encode`]
    #[cfg(feature = "serde")]
    pub fn decode(bytes: &[u8]) -> Result<Self, SettingsError> {
        let settings: Self = postcard::from_bytes(bytes).map_err(|_| SettingsError::Deserialize)?;
        settings.validate()?;
        Ok(settings)
    }
}
