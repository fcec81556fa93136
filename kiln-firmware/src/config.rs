//! Built-in defaults
//!
//! The constants are generated by build.rs from controller.toml, which has
//! already been range-checked there.

use kiln_core::config::{ControllerSettings, TunerSettings, TuningMethod};
use kiln_core::decimal::FixedDecimal;
use kiln_core::mode::{Direction, Mode};
use kiln_core::safety::TripSettings;
use kiln_drivers::sensor::ThermistorSettings;

mod generated {
    include!(concat!(env!("OUT_DIR"), "/defaults.rs"));
}

use generated::*;

/// Controller settings from controller.toml
pub fn controller_settings() -> ControllerSettings {
    ControllerSettings {
        kp: FixedDecimal::from_raw(KP_RAW),
        ki: FixedDecimal::from_raw(KI_RAW),
        kd: FixedDecimal::from_raw(KD_RAW),
        direction: if DIRECTION_REVERSE {
            Direction::Reverse
        } else {
            Direction::Direct
        },
        mode: if MODE_AUTOMATIC {
            Mode::Automatic
        } else {
            Mode::Manual
        },
        sample_time_ms: SAMPLE_TIME_MS,
        setpoint: FixedDecimal::from_raw(SETPOINT_RAW),
        output_min: FixedDecimal::from_raw(OUTPUT_MIN_RAW),
        output_max: FixedDecimal::from_raw(OUTPUT_MAX_RAW),
        manual_output: FixedDecimal::from_raw(MANUAL_OUTPUT_RAW),
        tuner: TunerSettings {
            method: TuningMethod::from_index(TUNE_METHOD).unwrap_or_default(),
            step: FixedDecimal::from_raw(TUNE_STEP_RAW),
            noise_band: FixedDecimal::from_raw(TUNE_NOISE_BAND_RAW),
            lookback_s: TUNE_LOOKBACK_S,
            relay_bias: TUNE_RELAY_BIAS,
        },
        ..ControllerSettings::default()
    }
}

/// Trip limits from controller.toml
pub fn trip_settings() -> TripSettings {
    TripSettings {
        enabled: TRIP_ENABLED,
        lower: FixedDecimal::from_raw(TRIP_LOWER_RAW),
        upper: FixedDecimal::from_raw(TRIP_UPPER_RAW),
        auto_reset: TRIP_AUTO_RESET,
    }
}

/// Thermistor parameters from controller.toml
pub fn thermistor_settings() -> ThermistorSettings {
    ThermistorSettings {
        nominal_ohms: THERMISTOR_NOMINAL_OHMS,
        b_coefficient: THERMISTOR_B,
        nominal_celsius: THERMISTOR_NOMINAL_CELSIUS,
        reference_ohms: THERMISTOR_REFERENCE_OHMS,
        calibration: FixedDecimal::from_raw(THERMISTOR_CALIBRATION_RAW),
    }
}

/// SSR output window (seconds)
pub fn ssr_window() -> FixedDecimal<1> {
    FixedDecimal::from_raw(SSR_WINDOW_RAW)
}

/// Whether to start an auto-tune run at power-up
pub const fn tune_on_boot() -> bool {
    TUNE_ON_BOOT
}

/// Whether the SSR is driven active-low
pub const fn ssr_inverted() -> bool {
    SSR_INVERTED
}
