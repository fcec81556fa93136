//! MAX31855 K-type thermocouple converter
//!
//! Every conversion is read as one 32-bit SPI frame, MSB first:
//!
//! ```text
//! 31..18  thermocouple, 14-bit signed, 0.25 °C
//! 16      fault
//! 15..4   cold junction, 12-bit signed, 0.0625 °C
//! 2       short to VCC
//! 1       short to GND
//! 0       open circuit
//! ```

use embedded_hal::spi::SpiDevice;
use kiln_core::decimal::FixedDecimal;
use kiln_core::traits::{InputDevice, SensorError};

/// Conversion latency reported to the loop (ms)
const CONVERSION_TIME_MS: u32 = 100;

const FAULT: u32 = 1 << 16;
const SHORT_TO_VCC: u32 = 1 << 2;
const SHORT_TO_GROUND: u32 = 1 << 1;
const OPEN_CIRCUIT: u32 = 1 << 0;

const THERMOCOUPLE_LSB: f64 = 0.25;
const COLD_JUNCTION_LSB: f64 = 0.0625;

/// One raw conversion frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame(u32);

impl Frame {
    /// Frame from the four bytes as clocked out of the chip
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    /// Raw frame bits
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Wiring fault flagged by the chip, if any
    pub fn fault(self) -> Option<SensorError> {
        if self.0 & FAULT == 0 {
            return None;
        }
        Some(if self.0 & OPEN_CIRCUIT != 0 {
            SensorError::OpenCircuit
        } else if self.0 & (SHORT_TO_GROUND | SHORT_TO_VCC) != 0 {
            SensorError::ShortCircuit
        } else {
            SensorError::OutOfRange
        })
    }

    /// Hot junction temperature (°C), uncalibrated
    pub fn thermocouple_celsius(self) -> f64 {
        ((self.0 as i32) >> 18) as f64 * THERMOCOUPLE_LSB
    }

    /// Cold junction temperature (°C)
    pub fn cold_junction_celsius(self) -> f64 {
        (((self.0 << 16) as i32) >> 20) as f64 * COLD_JUNCTION_LSB
    }
}

/// MAX31855 on an SPI bus
pub struct Max31855<SPI> {
    spi: SPI,
    /// Offset added to every reading (°C)
    calibration: FixedDecimal<1>,
    last_error: Option<SensorError>,
}

impl<SPI> Max31855<SPI> {
    /// Create a new thermocouple input
    pub fn new(spi: SPI) -> Self {
        Self {
            spi,
            calibration: FixedDecimal::ZERO,
            last_error: None,
        }
    }

    /// Get the calibration offset
    pub fn calibration(&self) -> FixedDecimal<1> {
        self.calibration
    }

    /// Set the calibration offset
    pub fn set_calibration(&mut self, calibration: FixedDecimal<1>) {
        self.calibration = calibration;
    }

    /// Why the last reading was NaN, if it was
    pub fn last_error(&self) -> Option<SensorError> {
        self.last_error
    }
}

impl<SPI: SpiDevice> Max31855<SPI> {
    /// Clock out one conversion frame
    pub fn read_frame(&mut self) -> Result<Frame, SensorError> {
        let mut bytes = [0u8; 4];
        self.spi
            .read(&mut bytes)
            .map_err(|_| SensorError::NotReady)?;
        Ok(Frame::from_bytes(bytes))
    }

    /// Read the thermocouple in °C, calibration included
    pub fn read_celsius(&mut self) -> Result<f64, SensorError> {
        let frame = self.read_frame()?;
        if let Some(fault) = frame.fault() {
            return Err(fault);
        }
        Ok(frame.thermocouple_celsius() + self.calibration.to_f64())
    }

    /// Read the chip's own (cold junction) temperature in °C
    pub fn read_internal_celsius(&mut self) -> Result<f64, SensorError> {
        Ok(self.read_frame()?.cold_junction_celsius())
    }
}

impl<SPI: SpiDevice> InputDevice for Max31855<SPI> {
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
    use embedded_hal::spi::{ErrorKind, ErrorType, Operation};

    /// Mock converter answering every read with the same frame
    struct MockSpi {
        frame: Result<[u8; 4], ErrorKind>,
        reads: u32,
    }

    impl MockSpi {
        fn new(frame: Result<[u8; 4], ErrorKind>) -> Self {
            Self { frame, reads: 0 }
        }
    }

    impl ErrorType for MockSpi {
        type Error = ErrorKind;
    }

    impl SpiDevice for MockSpi {
        fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), ErrorKind> {
            let frame = self.frame?;
            for op in operations.iter_mut() {
                if let Operation::Read(buf) = op {
                    let n = buf.len().min(frame.len());
                    buf[..n].copy_from_slice(&frame[..n]);
                    self.reads += 1;
                }
            }
            Ok(())
        }
    }

    /// Build a frame from quarter degrees, sixteenth degrees and flag bits
    fn frame(quarters: i32, sixteenths: i32, flags: u32) -> [u8; 4] {
        let bits = ((quarters as u32) << 18) | (((sixteenths as u32) & 0xFFF) << 4) | flags;
        bits.to_be_bytes()
    }

    #[test]
    fn test_decodes_both_junctions() {
        let f = Frame::from_bytes(frame(401, 400, 0));
        assert_eq!(f.raw(), 0x0644_1900);
        assert_eq!(f.fault(), None);
        assert_eq!(f.thermocouple_celsius(), 100.25);
        assert_eq!(f.cold_junction_celsius(), 25.0);
    }

    #[test]
    fn test_decodes_below_zero() {
        let f = Frame::from_bytes(frame(-40, -16, 0));
        assert_eq!(f.thermocouple_celsius(), -10.0);
        assert_eq!(f.cold_junction_celsius(), -1.0);
    }

    #[test]
    fn test_fault_bits() {
        let open = Frame::from_bytes(frame(0, 400, FAULT | OPEN_CIRCUIT));
        assert_eq!(open.fault(), Some(SensorError::OpenCircuit));
        let ground = Frame::from_bytes(frame(0, 400, FAULT | SHORT_TO_GROUND));
        assert_eq!(ground.fault(), Some(SensorError::ShortCircuit));
        let vcc = Frame::from_bytes(frame(0, 400, FAULT | SHORT_TO_VCC));
        assert_eq!(vcc.fault(), Some(SensorError::ShortCircuit));
        // Detail bits without the summary flag are ignored
        assert_eq!(Frame::from_bytes(frame(0, 0, OPEN_CIRCUIT)).fault(), None);
        // A missing chip reads all ones
        assert_eq!(
            Frame::from_bytes([0xFF; 4]).fault(),
            Some(SensorError::OpenCircuit)
        );
    }

    #[test]
    fn test_calibration_offset() {
        let mut sensor = Max31855::new(MockSpi::new(Ok(frame(401, 400, 0))));
        sensor.set_calibration(FixedDecimal::from_raw(-15));
        assert_eq!(sensor.calibration().raw(), -15);
        assert_eq!(sensor.read_celsius(), Ok(98.75));
        // Cold junction is not calibrated
        assert_eq!(sensor.read_internal_celsius(), Ok(25.0));
    }

    #[test]
    fn test_input_device_reports_nan() {
        let mut sensor = Max31855::new(MockSpi::new(Ok(frame(0, 400, FAULT | OPEN_CIRCUIT))));
        assert_eq!(sensor.request_input(), 100);
        assert!(sensor.read_input().is_nan());
        assert_eq!(sensor.last_error(), Some(SensorError::OpenCircuit));

        let mut sensor = Max31855::new(MockSpi::new(Err(ErrorKind::Other)));
        assert!(sensor.read_input().is_nan());
        assert_eq!(sensor.last_error(), Some(SensorError::NotReady));

        let mut sensor = Max31855::new(MockSpi::new(Ok(frame(401, 400, 0))));
        assert_eq!(sensor.read_input(), 100.25);
        assert_eq!(sensor.last_error(), None);
        assert_eq!(sensor.spi.reads, 1);
    }
}
