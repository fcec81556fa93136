//! Solid state relay output
//!
//! Time-proportioning: the relay is on for `percent` of a fixed window and
//! off for the rest. The window position comes from the loop clock, so the
//! output only needs to be refreshed more often than the window is long.

use embedded_hal::digital::OutputPin;
use kiln_core::config::ConfigError;
use kiln_core::decimal::FixedDecimal;
use kiln_core::traits::OutputDevice;

/// Default output window (ms)
pub const DEFAULT_WINDOW_MS: u32 = 5_000;

/// Shortest accepted output window (ms)
pub const MIN_WINDOW_MS: u32 = 1_000;

/// SSR on a GPIO pin
///
/// The pin can be configured as active-high (default) or active-low.
pub struct SsrOutput<P> {
    pin: P,
    /// If true, relay ON = pin LOW
    inverted: bool,
    window_ms: u32,
    /// Current logical state (true = relay on)
    on: bool,
}

impl<P: OutputPin> SsrOutput<P> {
    /// Create a new SSR output, initially off
    ///
    /// # Arguments
    /// - `pin`: The GPIO pin driving the relay
    /// - `inverted`: If true, the relay is ON when the pin is LOW
    pub fn new(pin: P, inverted: bool) -> Self {
        let mut ssr = Self {
            pin,
            inverted,
            window_ms: DEFAULT_WINDOW_MS,
            on: true,
        };
        ssr.set_on(false);
        ssr
    }

    /// Create a new SSR output with active-high drive
    pub fn new_active_high(pin: P) -> Self {
        Self::new(pin, false)
    }

    /// Get the output window in milliseconds
    pub fn window_ms(&self) -> u32 {
        self.window_ms
    }

    /// Set the output window in seconds
    ///
    /// Windows shorter than one second are rejected.
    pub fn set_window(&mut self, seconds: FixedDecimal<1>) -> Result<(), ConfigError> {
        if seconds.raw() < (MIN_WINDOW_MS / 100) as i32 {
            return Err(ConfigError::OutOfRange);
        }
        self.window_ms = seconds.raw() as u32 * 100;
        Ok(())
    }

    /// Check if the relay is currently on
    pub fn is_on(&self) -> bool {
        self.on
    }

    fn set_on(&mut self, on: bool) {
        if on == self.on {
            return;
        }
        self.on = on;
        // Pin errors leave the logical state in place; the next window
        // position retries the write.
        let result = if on != self.inverted {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if result.is_err() {
            self.on = !on;
        }
    }
}

impl<P: OutputPin> OutputDevice for SsrOutput<P> {
    fn set_output_percent(&mut self, percent: f64, now_ms: u32) {
        let percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
        let position = now_ms % self.window_ms;
        let on_ms = (percent * 0.01 * self.window_ms as f64) as u32;
        self.set_on(on_ms > position);
    }
}
