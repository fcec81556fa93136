//! Process input and output device traits

/// Errors that can occur while converting a sensor reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// Sensor disconnected (open circuit)
    OpenCircuit,
    /// Sensor shorted to ground
    ShortCircuit,
    /// Reading out of expected range
    OutOfRange,
    /// No conversion has completed yet
    NotReady,
}

/// Trait for process value inputs
///
/// Reads are split in two so that slow sensors (one-wire, thermocouple
/// amplifiers) can start a conversion and be polled later without blocking
/// the control loop.
pub trait InputDevice {
    /// Start a conversion
    ///
    /// Returns the number of milliseconds until `read_input` has a fresh
    /// value.
    fn request_input(&mut self) -> u32;

    /// Read the latest process value
    ///
    /// Returns `f64::NAN` when the sensor is faulted.
    fn read_input(&mut self) -> f64;
}

/// Trait for process outputs
///
/// Implementations drive the actuator: an SSR window, a PWM channel or a
/// simulated plant.
pub trait OutputDevice {
    /// Apply an output level in percent (0.0 to 100.0)
    ///
    /// Time-proportioned outputs need the clock to place the level within
    /// their switching window, so the caller passes the current time.
    fn set_output_percent(&mut self, percent: f64, now_ms: u32);
}
