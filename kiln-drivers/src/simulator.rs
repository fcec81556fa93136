//! Simulated process
//!
//! First-order-plus-dead-time plant for bench testing without hardware:
//!
//! ```text
//! pv[n+1] = (K/τ)(u[n-θ] - u0) + (pv[n] - pv0)(1 - 1/τ) + pv0
//! ```
//!
//! advanced once per reading. The same plant is both the input and the
//! output device, so the loop driver takes it twice through
//! [`SharedSimulator`] handles onto one [`RefCell`].

use core::cell::RefCell;

use kiln_core::config::ConfigError;
use kiln_core::traits::{InputDevice, OutputDevice};

/// Output the plant rests at (percent)
pub const OUTPUT_START: f64 = 50.0;

/// Process value at rest
pub const PROCESS_VALUE_START: f64 = 100.0;

/// Longest dead time in samples
pub const MAX_DELAY: usize = 32;

/// Reading latency (ms)
const READ_DELAY_MS: u32 = 250;

/// First-order-plus-dead-time plant
#[derive(Debug, Clone)]
pub struct Simulator {
    gain: f64,
    lag: f64,
    delay: usize,
    /// Output history, index 0 oldest
    theta: [f64; MAX_DELAY],
    process_value: f64,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    /// Create a plant at rest with gain 2, lag 100 and delay 10 samples
    pub fn new() -> Self {
        Self {
            gain: 2.0,
            lag: 100.0,
            delay: 10,
            theta: [OUTPUT_START; MAX_DELAY],
            process_value: PROCESS_VALUE_START,
        }
    }

    /// Return the plant to rest
    pub fn reset(&mut self) {
        self.theta = [OUTPUT_START; MAX_DELAY];
        self.process_value = PROCESS_VALUE_START;
    }

    /// Get process gain
    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// Set process gain (process units per percent)
    pub fn set_gain(&mut self, gain: f64) -> Result<(), ConfigError> {
        if !gain.is_finite() {
            return Err(ConfigError::OutOfRange);
        }
        self.gain = gain;
        Ok(())
    }

    /// Get lag in samples
    pub fn lag(&self) -> f64 {
        self.lag
    }

    /// Set lag in samples (at least 1)
    pub fn set_lag(&mut self, lag: f64) -> Result<(), ConfigError> {
        if !lag.is_finite() || lag < 1.0 {
            return Err(ConfigError::OutOfRange);
        }
        self.lag = lag;
        Ok(())
    }

    /// Get dead time in samples
    pub fn delay(&self) -> usize {
        self.delay
    }

    /// Set dead time in samples (1..=MAX_DELAY)
    pub fn set_delay(&mut self, delay: usize) -> Result<(), ConfigError> {
        if !(1..=MAX_DELAY).contains(&delay) {
            return Err(ConfigError::OutOfRange);
        }
        self.delay = delay;
        Ok(())
    }

    /// Get current process value without advancing the model
    pub fn process_value(&self) -> f64 {
        self.process_value
    }

    /// Advance the model one sample
    pub fn update(&mut self) -> f64 {
        for i in 0..self.delay - 1 {
            self.theta[i] = self.theta[i + 1];
        }
        self.process_value = (self.gain / self.lag) * (self.theta[0] - OUTPUT_START)
            + (self.process_value - PROCESS_VALUE_START) * (1.0 - 1.0 / self.lag)
            + PROCESS_VALUE_START;
        self.process_value
    }

    /// Queue an output level at the far end of the dead time
    pub fn apply_output(&mut self, percent: f64) {
        self.theta[self.delay - 1] = percent;
    }
}

impl InputDevice for Simulator {
    fn request_input(&mut self) -> u32 {
        READ_DELAY_MS
    }

    fn read_input(&mut self) -> f64 {
        self.update()
    }
}

impl OutputDevice for Simulator {
    fn set_output_percent(&mut self, percent: f64, _now_ms: u32) {
        self.apply_output(percent);
    }
}

/// Borrowing handle so one plant can serve as both loop devices
#[derive(Debug, Clone, Copy)]
pub struct SharedSimulator<'a>(&'a RefCell<Simulator>);

impl<'a> SharedSimulator<'a> {
    pub fn new(sim: &'a RefCell<Simulator>) -> Self {
        Self(sim)
    }
}

impl InputDevice for SharedSimulator<'_> {
    fn request_input(&mut self) -> u32 {
        self.0.borrow_mut().request_input()
    }

    fn read_input(&mut self) -> f64 {
        self.0.borrow_mut().read_input()
    }
}

impl OutputDevice for SharedSimulator<'_> {
    fn set_output_percent(&mut self, percent: f64, now_ms: u32) {
        self.0.borrow_mut().set_output_percent(percent, now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rests_at_start() {
        let mut sim = Simulator::new();
        for _ in 0..50 {
            assert_eq!(sim.update(), PROCESS_VALUE_START);
        }
    }

    #[test]
    fn test_dead_time() {
        let mut sim = Simulator::new();
        sim.apply_output(100.0);
        // Eight updates pass before the step reaches the model
        for _ in 0..8 {
            assert_eq!(sim.update(), PROCESS_VALUE_START);
        }
        assert!(sim.update() > PROCESS_VALUE_START);
    }

    #[test]
    fn test_settles_at_gain() {
        let mut sim = Simulator::new();
        for _ in 0..2_000 {
            sim.apply_output(75.0);
            sim.update();
        }
        // 2 × (75 - 50) above rest
        assert!(libm::fabs(sim.process_value() - 150.0) < 0.01);
    }

    #[test]
    fn test_settings_validation() {
        let mut sim = Simulator::new();
        assert_eq!(sim.set_delay(0), Err(ConfigError::OutOfRange));
        assert_eq!(sim.set_delay(MAX_DELAY + 1), Err(ConfigError::OutOfRange));
        assert_eq!(sim.set_lag(0.5), Err(ConfigError::OutOfRange));
        assert_eq!(sim.set_gain(f64::NAN), Err(ConfigError::OutOfRange));
        assert_eq!(sim.delay(), 10);
        sim.set_delay(1).unwrap();
        sim.apply_output(100.0);
        assert!(sim.update() > PROCESS_VALUE_START);
    }

    #[test]
    fn test_shared_device() {
        let sim = RefCell::new(Simulator::new());
        let mut input = SharedSimulator::new(&sim);
        let mut output = input;
        output.set_output_percent(60.0, 0);
        assert_eq!(input.request_input(), 250);
        input.read_input();
        assert_eq!(sim.borrow().theta[8], 60.0);
        assert_eq!(sim.borrow().process_value(), PROCESS_VALUE_START);
    }
}
