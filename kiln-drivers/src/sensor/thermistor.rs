//! NTC thermistor input
//!
//! Circuit: VCC -- reference resistor -- ADC_PIN -- NTC -- GND, read with a
//! 10-bit converter. The resistance goes through the B-parameter form of
//! the Steinhart-Hart equation:
//!
//! ```text
//! 1/T = 1/T0 + ln(R/R0)/B
//! ```

use kiln_core::decimal::FixedDecimal;
use kiln_core::traits::{InputDevice, SensorError};

/// Full scale of the 10-bit reading
const ADC_FULL_SCALE: f64 = 1024.0;

/// Readings this close to either rail are treated as wiring faults
const ADC_RAIL_MARGIN: u16 = 3;

/// Conversion latency reported to the loop (ms)
const CONVERSION_TIME_MS: u32 = 100;

const KELVIN_OFFSET: f64 = 273.15;

/// ADC reading trait for platform abstraction
pub trait AdcReader {
    /// Read ADC value (10-bit, 0-1023)
    #[allow(clippy::result_unit_err)]
    fn read(&mut self) -> Result<u16, ()>;
}

/// Thermistor parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThermistorSettings {
    /// Resistance at the nominal temperature (ohms)
    pub nominal_ohms: f64,
    /// B coefficient (K)
    pub b_coefficient: f64,
    /// Nominal temperature (°C)
    pub nominal_celsius: f64,
    /// Divider reference resistor (ohms)
    pub reference_ohms: f64,
    /// Offset added to every reading (°C)
    pub calibration: FixedDecimal<1>,
}

impl Default for ThermistorSettings {
    fn default() -> Self {
        Self {
            nominal_ohms: 10_000.0,
            b_coefficient: 3950.0,
            nominal_celsius: 25.0,
            reference_ohms: 10_000.0,
            calibration: FixedDecimal::ZERO,
        }
    }
}

impl ThermistorSettings {
    /// Convert a raw reading to the thermistor resistance
    pub fn resistance(&self, raw: u16) -> Result<f64, SensorError> {
        if raw < ADC_RAIL_MARGIN {
            return Err(SensorError::ShortCircuit);
        }
        if raw > ADC_FULL_SCALE as u16 - ADC_RAIL_MARGIN {
            return Err(SensorError::OpenCircuit);
        }
        Ok(self.reference_ohms / (ADC_FULL_SCALE / raw as f64 - 1.0))
    }

    /// Convert a resistance to °C, calibration included
    pub fn celsius(&self, resistance: f64) -> Result<f64, SensorError> {
        let inverse = libm::log(resistance / self.nominal_ohms) / self.b_coefficient
            + 1.0 / (self.nominal_celsius + KELVIN_OFFSET);
        let celsius = 1.0 / inverse - KELVIN_OFFSET;
        if !celsius.is_finite() || celsius < -KELVIN_OFFSET {
            return Err(SensorError::OutOfRange);
        }
        Ok(celsius + self.calibration.to_f64())
    }

    /// Convert a raw reading to °C
    pub fn convert(&self, raw: u16) -> Result<f64, SensorError> {
        self.celsius(self.resistance(raw)?)
    }
}

/// NTC thermistor on an ADC channel
pub struct Thermistor<ADC> {
    adc: ADC,
    settings: ThermistorSettings,
    last_error: Option<SensorError>,
}

impl<ADC> Thermistor<ADC> {
    /// Create a new thermistor input
    pub fn new(adc: ADC, settings: ThermistorSettings) -> Self {
        Self {
            adc,
            settings,
            last_error: None,
        }
    }

    /// Get current settings
    pub fn settings(&self) -> &ThermistorSettings {
        &self.settings
    }

    /// Replace the settings
    pub fn set_settings(&mut self, settings: ThermistorSettings) {
        self.settings = settings;
    }

    /// Set the calibration offset
    pub fn set_calibration(&mut self, calibration: FixedDecimal<1>) {
        self.settings.calibration = calibration;
    }

    /// Why the last reading was NaN, if it was
    pub fn last_error(&self) -> Option<SensorError> {
        self.last_error
    }
}

impl<ADC: AdcReader> Thermistor<ADC> {
    /// Read and convert one sample
    pub fn read_celsius(&mut self) -> Result<f64, SensorError> {
        let raw = self.adc.read().map_err(|_| SensorError::NotReady)?;
        self.settings.convert(raw)
    }
}

impl<ADC: AdcReader> InputDevice for Thermistor<ADC> {
    fn request_input(&mut self) -> u32 {
        CONVERSION_TIME_MS
    }

    fn read_input(&mut self) -> f64 {
        match self.read_celsius() {
            Ok(celsius) => {
                self.last_error = None;
                celsius
            }
            Err(e) => {
                self.last_error = Some(e);
                f64::NAN
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Dummy ADC returning a fixed value
    struct DummyAdc(Result<u16, ()>);

    impl AdcReader for DummyAdc {
        fn read(&mut self) -> Result<u16, ()> {
            self.0
        }
    }

    fn close(a: f64, b: f64, tolerance: f64) -> bool {
        libm::fabs(a - b) < tolerance
    }

    #[test]
    fn test_midscale_is_nominal() {
        let settings = ThermistorSettings::default();
        let r = settings.resistance(512).unwrap();
        assert!(close(r, 10_000.0, 1e-6));
        assert!(close(settings.convert(512).unwrap(), 25.0, 1e-9));
    }

    #[test]
    fn test_lower_reading_is_hotter() {
        let settings = ThermistorSettings::default();
        let hot = settings.convert(300).unwrap();
        let cold = settings.convert(700).unwrap();
        assert!(hot > 25.0);
        assert!(cold < 25.0);
    }

    #[test]
    fn test_calibration_offset() {
        let settings = ThermistorSettings {
            calibration: FixedDecimal::from_raw(15),
            ..ThermistorSettings::default()
        };
        assert!(close(settings.convert(512).unwrap(), 26.5, 1e-9));
    }

    #[test]
    fn test_wiring_faults() {
        let settings = ThermistorSettings::default();
        assert_eq!(settings.convert(0), Err(SensorError::ShortCircuit));
        assert_eq!(settings.convert(1023), Err(SensorError::OpenCircuit));
    }

    #[test]
    fn test_input_device_reports_nan() {
        let mut sensor = Thermistor::new(DummyAdc(Ok(1023)), ThermistorSettings::default());
        assert_eq!(sensor.request_input(), 100);
        assert!(sensor.read_input().is_nan());
        assert_eq!(sensor.last_error(), Some(SensorError::OpenCircuit));

        let mut sensor = Thermistor::new(DummyAdc(Err(())), ThermistorSettings::default());
        assert!(sensor.read_input().is_nan());
        assert_eq!(sensor.last_error(), Some(SensorError::NotReady));

        let mut sensor = Thermistor::new(DummyAdc(Ok(512)), ThermistorSettings::default());
        assert!(close(sensor.read_input(), 25.0, 1e-9));
        assert_eq!(sensor.last_error(), None);
    }
}
