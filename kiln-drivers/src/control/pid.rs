//! PID controller
//!
//! Positional PID with the integral accumulator clamped to the output limits
//! and the derivative taken on the measurement, so setpoint changes cause no
//! derivative kick. Gains are kept twice: the user-facing "display" gains in
//! fixed point, and internal gains pre-scaled by the sample interval and
//! signed by the controller direction. The internal set is always rebuilt
//! from the display set, never rescaled in place.
//!
//! The controller embeds the relay auto-tuner. While tuning it runs one
//! tuner step per sample instead of the PID law and, when the run ends,
//! writes the identified gains and returns to the mode it was in.

use kiln_core::config::{ConfigError, ControllerSettings, TunerSettings};
use kiln_core::decimal::FixedDecimal;
use kiln_core::mode::{Direction, Mode};
use kiln_core::time::elapsed;

use super::autotune::{TuneOutcome, Tuner};
use super::OutputLimits;

/// Result of one [`Controller::compute`] call
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Tick {
    /// Nothing computed (manual mode, not yet due, or no valid input)
    Idle,
    /// Output recomputed
    Updated,
    /// Auto-tune run finished on this tick
    TuneComplete(TuneOutcome),
}

/// Round to three decimals for the display gains
fn dec3(value: f64) -> Result<FixedDecimal<3>, ConfigError> {
    FixedDecimal::from_f64(value).map_err(|_| ConfigError::OutOfRange)
}

fn dec1(value: f64) -> FixedDecimal<1> {
    FixedDecimal::from_f64(value).unwrap_or_default()
}

/// PID controller with embedded auto-tuner
#[derive(Debug, Clone)]
pub struct Controller {
    input: f64,
    output: f64,
    setpoint: f64,

    // Display gains, as entered
    disp_kp: FixedDecimal<3>,
    disp_ki: FixedDecimal<3>,
    disp_kd: FixedDecimal<3>,

    // Internal gains, scaled by the sample interval and signed
    kp: f64,
    ki: f64,
    kd: f64,

    direction: Direction,
    mode: Mode,
    i_term: f64,
    last_input: f64,
    limits: OutputLimits,
    sample_time_ms: u32,
    last_time: Option<u32>,
    manual_output: FixedDecimal<1>,

    tuner: Tuner,
    tuner_settings: TunerSettings,
    tuning: bool,
    saved_mode: Mode,
    saved_manual_output: FixedDecimal<1>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    /// Create a controller with default settings
    pub fn new() -> Self {
        let defaults = ControllerSettings::default();
        let mut controller = Self {
            input: 0.0,
            output: defaults.manual_output.to_f64(),
            setpoint: defaults.setpoint.to_f64(),
            disp_kp: FixedDecimal::ZERO,
            disp_ki: FixedDecimal::ZERO,
            disp_kd: FixedDecimal::ZERO,
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            direction: defaults.direction,
            mode: defaults.mode,
            i_term: 0.0,
            last_input: 0.0,
            limits: OutputLimits::default(),
            sample_time_ms: defaults.sample_time_ms,
            last_time: None,
            manual_output: defaults.manual_output,
            tuner: Tuner::new(),
            tuner_settings: defaults.tuner,
            tuning: false,
            saved_mode: defaults.mode,
            saved_manual_output: defaults.manual_output,
        };
        // Defaults are non-negative
        let _ = controller.set_tunings(defaults.kp, defaults.ki, defaults.kd);
        controller
    }

    /// Create a controller from persisted settings
    pub fn from_settings(settings: &ControllerSettings) -> Result<Self, ConfigError> {
        let mut controller = Self::new();
        controller.apply_settings(settings)?;
        Ok(controller)
    }

    /// Run one control step
    ///
    /// Call as often as convenient; work is only done once per sample
    /// interval. A NaN input is ignored.
    pub fn compute(&mut self, now_ms: u32, input: f64) -> Tick {
        if input.is_nan() {
            return Tick::Idle;
        }
        self.input = input;

        if !self.tuning && self.mode == Mode::Manual {
            return Tick::Idle;
        }
        if let Some(last) = self.last_time {
            if elapsed(now_ms, last) < self.sample_time_ms {
                return Tick::Idle;
            }
        }
        self.last_time = Some(now_ms);

        if self.tuning {
            let limits = self.limits;
            if self.tuner.step(now_ms, input, &mut self.output, limits) {
                let outcome = self.tuner.outcome();
                self.complete_auto_tune();
                if let Some(outcome) = outcome {
                    return Tick::TuneComplete(outcome);
                }
            }
            return Tick::Updated;
        }

        let error = self.setpoint - input;
        self.i_term = self.limits.clamp(self.i_term + self.ki * error);
        let d_input = input - self.last_input;
        self.output = self
            .limits
            .clamp(self.kp * error + self.i_term - self.kd * d_input);
        self.last_input = input;
        Tick::Updated
    }

    /// Set the display gains
    ///
    /// Rejects negative gains, leaving the previous gains in place. The
    /// integral gain is per second and the derivative gain in seconds.
    pub fn set_tunings(
        &mut self,
        kp: FixedDecimal<3>,
        ki: FixedDecimal<3>,
        kd: FixedDecimal<3>,
    ) -> Result<(), ConfigError> {
        if kp.is_negative() || ki.is_negative() || kd.is_negative() {
            return Err(ConfigError::NegativeGain);
        }
        self.disp_kp = kp;
        self.disp_ki = ki;
        self.disp_kd = kd;
        self.derive_gains();
        Ok(())
    }

    /// Set the sample interval in milliseconds
    pub fn set_sample_time(&mut self, sample_time_ms: u32) -> Result<(), ConfigError> {
        if sample_time_ms == 0 {
            return Err(ConfigError::ZeroSampleTime);
        }
        self.sample_time_ms = sample_time_ms;
        self.derive_gains();
        Ok(())
    }

    /// Set the controller action
    pub fn set_controller_direction(&mut self, direction: Direction) {
        if direction != self.direction {
            self.direction = direction;
            self.derive_gains();
        }
    }

    /// Switch between manual and automatic
    ///
    /// Entering automatic seeds the integral with the current output so the
    /// output does not jump. Entering manual holds the current output. While
    /// auto-tuning, the mode to return to afterwards is updated instead.
    pub fn set_mode(&mut self, mode: Mode) {
        if self.tuning {
            self.saved_mode = mode;
            return;
        }
        if mode == self.mode {
            return;
        }
        match mode {
            Mode::Automatic => self.initialize(),
            Mode::Manual => self.manual_output = dec1(self.output),
        }
        self.mode = mode;
        info!("controller: mode {:?}", mode);
    }

    /// Set the output limits
    ///
    /// Rejects `min >= max`. In automatic mode the output and integral are
    /// clamped immediately.
    pub fn set_output_limits(&mut self, min: f64, max: f64) -> Result<(), ConfigError> {
        let limits = OutputLimits::new(min, max).ok_or(ConfigError::InvalidLimits)?;
        self.limits = limits;
        if self.mode == Mode::Automatic {
            self.output = limits.clamp(self.output);
            self.i_term = limits.clamp(self.i_term);
        }
        Ok(())
    }

    /// Set the output used in manual mode
    pub fn set_manual_output(&mut self, percent: FixedDecimal<1>) {
        self.manual_output = percent;
        if self.mode == Mode::Manual && !self.tuning {
            self.output = self.limits.clamp(percent.to_f64());
        }
    }

    /// Set the setpoint
    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
    }

    /// Store the auto-tune parameters used by [`Controller::start_auto_tune`]
    pub fn set_tuner_settings(&mut self, settings: TunerSettings) {
        self.tuner_settings = settings;
    }

    /// Start a relay auto-tune run with the stored parameters
    ///
    /// The relay step is bounded by the room between the current output and
    /// the output limits. The controller switches to manual for the run and
    /// returns to the current mode afterwards.
    pub fn start_auto_tune(&mut self) -> Result<(), ConfigError> {
        if self.tuning {
            return Err(ConfigError::AlreadyTuning);
        }
        let settings = self.tuner_settings;
        let step = settings
            .step
            .to_f64()
            .min(self.output - self.limits.min)
            .min(self.limits.max - self.output);
        if step.is_nan() || step <= 0.0 {
            return Err(ConfigError::NoRelayHeadroom);
        }

        self.saved_mode = self.mode;
        self.saved_manual_output = self.manual_output;
        self.tuner.configure(
            &settings,
            step,
            settings.lookback_samples(self.sample_time_ms),
            self.direction,
        );
        self.mode = Mode::Manual;
        self.tuning = true;
        self.last_time = None;
        info!("controller: auto-tune started, step {}", step);
        Ok(())
    }

    /// Start a run with explicit parameters, storing them first
    pub fn start_auto_tune_with(&mut self, settings: TunerSettings) -> Result<(), ConfigError> {
        if self.tuning {
            return Err(ConfigError::AlreadyTuning);
        }
        self.tuner_settings = settings;
        self.start_auto_tune()
    }

    /// Abandon an auto-tune run, restoring the previous output and mode
    pub fn stop_auto_tune(&mut self) {
        if !self.tuning {
            return;
        }
        self.tuner.stop();
        self.tuning = false;
        self.manual_output = self.saved_manual_output;
        self.output = self.limits.clamp(self.saved_manual_output.to_f64());
        let mode = self.saved_mode;
        self.set_mode(mode);
    }

    /// Harvest the tuner result, then stop
    fn complete_auto_tune(&mut self) {
        if let Ok(result) = self.tuner.result() {
            // A negative gain means the plant acts against the direction
            let flip = result.kp < 0.0;
            let kp = libm::fabs(result.kp);
            let ki = if result.ti_s > 0.0 { kp / result.ti_s } else { 0.0 };
            let kd = kp * result.td_s;

            match (dec3(kp), dec3(ki), dec3(kd)) {
                (Ok(kp), Ok(ki), Ok(kd)) if !ki.is_negative() && !kd.is_negative() => {
                    if flip {
                        self.direction = self.direction.inverted();
                    }
                    self.disp_kp = kp;
                    self.disp_ki = ki;
                    self.disp_kd = kd;
                    self.derive_gains();
                    info!(
                        "controller: tuned Kp {} Ki {} Kd {}",
                        kp.to_f64(),
                        ki.to_f64(),
                        kd.to_f64()
                    );
                }
                _ => warn!("controller: tuned gains out of range, keeping previous"),
            }
        }
        self.stop_auto_tune();
    }

    /// Seed the integral for a bumpless switch to automatic
    fn initialize(&mut self) {
        self.i_term = self.limits.clamp(self.output);
        self.last_input = self.input;
    }

    fn derive_gains(&mut self) {
        let sample_time_s = self.sample_time_ms as f64 / 1000.0;
        let sign = self.direction.sign();
        self.kp = sign * self.disp_kp.to_f64();
        self.ki = sign * self.disp_ki.to_f64() * sample_time_s;
        self.kd = sign * self.disp_kd.to_f64() / sample_time_s;
    }

    /// Get proportional display gain
    pub fn kp(&self) -> FixedDecimal<3> {
        self.disp_kp
    }

    /// Get integral display gain (per second)
    pub fn ki(&self) -> FixedDecimal<3> {
        self.disp_ki
    }

    /// Get derivative display gain (seconds)
    pub fn kd(&self) -> FixedDecimal<3> {
        self.disp_kd
    }

    /// Get internal gains `(kp, ki, kd)` scaled per sample and signed
    pub fn scaled_gains(&self) -> (f64, f64, f64) {
        (self.kp, self.ki, self.kd)
    }

    /// Get controller action
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Get mode (manual while auto-tuning)
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Check if an auto-tune run is in progress
    pub fn is_tuning(&self) -> bool {
        self.tuning
    }

    /// Get last accepted input
    pub fn input(&self) -> f64 {
        self.input
    }

    /// Get current output (percent)
    pub fn output(&self) -> f64 {
        self.output
    }

    /// Get setpoint
    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// Get output limits
    pub fn output_limits(&self) -> OutputLimits {
        self.limits
    }

    /// Get sample interval (ms)
    pub fn sample_time_ms(&self) -> u32 {
        self.sample_time_ms
    }

    /// Get manual output
    pub fn manual_output(&self) -> FixedDecimal<1> {
        self.manual_output
    }

    /// Get stored auto-tune parameters
    pub fn tuner_settings(&self) -> TunerSettings {
        self.tuner_settings
    }

    /// Get access to the auto-tuner
    pub fn tuner(&self) -> &Tuner {
        &self.tuner
    }

    /// Snapshot the persistent settings
    ///
    /// While tuning, the mode and manual output are the ones the run will
    /// return to.
    pub fn settings(&self) -> ControllerSettings {
        let (mode, manual_output) = if self.tuning {
            (self.saved_mode, self.saved_manual_output)
        } else {
            (self.mode, self.manual_output)
        };
        ControllerSettings {
            kp: self.disp_kp,
            ki: self.disp_ki,
            kd: self.disp_kd,
            direction: self.direction,
            mode,
            sample_time_ms: self.sample_time_ms,
            setpoint: dec1(self.setpoint),
            output_min: dec1(self.limits.min),
            output_max: dec1(self.limits.max),
            manual_output,
            tuner: self.tuner_settings,
            ..ControllerSettings::default()
        }
    }

    /// Apply persisted settings
    ///
    /// Everything is checked before anything is changed, so a rejected
    /// snapshot leaves the controller untouched.
    pub fn apply_settings(&mut self, settings: &ControllerSettings) -> Result<(), ConfigError> {
        if self.tuning {
            return Err(ConfigError::AlreadyTuning);
        }
        if settings.kp.is_negative() || settings.ki.is_negative() || settings.kd.is_negative() {
            return Err(ConfigError::NegativeGain);
        }
        if settings.sample_time_ms == 0 {
            return Err(ConfigError::ZeroSampleTime);
        }
        let limits = OutputLimits::new(settings.output_min.to_f64(), settings.output_max.to_f64())
            .ok_or(ConfigError::InvalidLimits)?;

        self.limits = limits;
        self.sample_time_ms = settings.sample_time_ms;
        self.direction = settings.direction;
        self.set_tunings(settings.kp, settings.ki, settings.kd)?;
        self.setpoint = settings.setpoint.to_f64();
        self.tuner_settings = settings.tuner;
        if settings.mode == Mode::Manual {
            self.set_mode(Mode::Manual);
        }
        self.set_manual_output(settings.manual_output);
        self.set_mode(settings.mode);
        Ok(())
    }
}
