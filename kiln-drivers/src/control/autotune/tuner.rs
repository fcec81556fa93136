//! Relay auto-tune state machine

use core::f64::consts::PI;

use kiln_core::config::{TunerSettings, TuningMethod};
use kiln_core::decimal::FixedDecimal;
use kiln_core::mode::Direction;
use kiln_core::time::elapsed;

use super::bias::{
    clamped_relay, is_zero, process_value_offset, step_asymmetry, STEP_ASYMMETRY_TOLERANCE,
};
use super::phase::{amigof_gains, phase_lag, phase_lag_acceptable, retargeted_noise_band};
use super::rules::rule_for;
use super::{
    TuneError, TuneFailure, TuneOutcome, TuneResult, MAX_PEAK_COUNT, MAX_WAIT_MS,
    PEAK_AMPLITUDE_TOLERANCE, PEAK_HISTORY,
};
use crate::control::history::{EventHistory, SampleWindow};
use crate::control::OutputLimits;

/// Relay steps kept for bias estimation
const STEP_HISTORY: usize = 5;

/// Auto-tune state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TunerState {
    /// Not running; the next step initialises a run
    #[default]
    Off,
    /// Waiting for the process value to settle before the step (AMIGOf)
    SteadyAtBaseline,
    /// Waiting for the process value to settle after the step (AMIGOf)
    SteadyAfterStepUp,
    /// Relay driving the process value up
    RelayStepUp,
    /// Relay driving the process value down
    RelayStepDown,
    /// Finished with a result
    Converged,
    /// Finished without a result
    Failed(TuneFailure),
}

impl TunerState {
    /// Check if a run is in progress
    pub fn is_running(self) -> bool {
        !matches!(self, Self::Off | Self::Converged | Self::Failed(_))
    }

    fn is_steady(self) -> bool {
        matches!(self, Self::SteadyAtBaseline | Self::SteadyAfterStepUp)
    }
}

/// Last extreme seen by the peak detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeakKind {
    None,
    Maximum,
    Minimum,
}

/// Relay-feedback auto-tuner
///
/// Drive it with [`Tuner::step`] once per controller sample while tuning.
/// The tuner owns the output for the duration of the run and hands back the
/// starting output when it finishes.
#[derive(Debug, Clone)]
pub struct Tuner {
    state: TunerState,

    // Configuration, copied into the working values on start
    method: TuningMethod,
    relay_bias: bool,
    step: f64,
    noise_band: f64,
    action: f64,

    // Relay
    setpoint: f64,
    output_start: f64,
    working_step: f64,
    working_noise_band: f64,
    next_noise_band: f64,
    inverted: bool,
    sense_locked: bool,

    // Peak detection
    window: SampleWindow,
    input_offset: FixedDecimal<3>,
    offset_change: FixedDecimal<3>,
    peak_kind: PeakKind,
    peak_count: u8,
    peaks: EventHistory<PEAK_HISTORY>,

    // Relay bias
    bias: f64,
    step_count: u8,
    steps: EventHistory<STEP_HISTORY>,

    // AMIGOf
    baseline: f64,
    process_gain: f64,

    result: Option<TuneResult>,
}

impl Default for Tuner {
    fn default() -> Self {
        Self::new()
    }
}

impl Tuner {
    /// Create an idle tuner with default settings
    pub fn new() -> Self {
        let defaults = TunerSettings::default();
        Self {
            state: TunerState::Off,
            method: defaults.method,
            relay_bias: defaults.relay_bias,
            step: defaults.step.to_f64(),
            noise_band: defaults.noise_band.to_f64(),
            action: Direction::Direct.sign(),
            setpoint: 0.0,
            output_start: 0.0,
            working_step: 0.0,
            working_noise_band: 0.0,
            next_noise_band: 0.0,
            inverted: false,
            sense_locked: false,
            window: SampleWindow::default(),
            input_offset: FixedDecimal::ZERO,
            offset_change: FixedDecimal::ZERO,
            peak_kind: PeakKind::None,
            peak_count: 0,
            peaks: EventHistory::default(),
            bias: 0.0,
            step_count: 0,
            steps: EventHistory::default(),
            baseline: 0.0,
            process_gain: 0.0,
            result: None,
        }
    }

    /// Arm the tuner for a new run
    ///
    /// `step` is the already-bounded relay half-amplitude and
    /// `lookback_samples` the peak detection window. The run itself starts
    /// on the next [`Tuner::step`].
    pub fn configure(
        &mut self,
        settings: &TunerSettings,
        step: f64,
        lookback_samples: u16,
        direction: Direction,
    ) {
        self.method = settings.method;
        self.relay_bias = settings.relay_bias;
        self.step = step;
        self.noise_band = settings.noise_band.to_f64();
        self.action = direction.sign();
        self.window = SampleWindow::new(lookback_samples as usize);
        self.result = None;
        self.state = TunerState::Off;
    }

    /// Abandon the run, leaving any result in place
    pub fn stop(&mut self) {
        if self.state.is_running() {
            info!("autotune: stopped after {} peaks", self.peak_count);
            self.state = TunerState::Off;
        }
    }

    /// Get current state
    pub fn state(&self) -> TunerState {
        self.state
    }

    /// Get configured method
    pub fn method(&self) -> TuningMethod {
        self.method
    }

    /// Get peak count of the current run
    pub fn peak_count(&self) -> u8 {
        self.peak_count
    }

    /// Get current relay half-amplitude
    pub fn working_step(&self) -> f64 {
        self.working_step
    }

    /// Get current relay bias
    pub fn relay_bias(&self) -> f64 {
        self.bias
    }

    /// Get current noise band
    pub fn working_noise_band(&self) -> f64 {
        self.working_noise_band
    }

    /// Get peak history of the current run, index 0 the pending extreme
    pub fn peaks(&self) -> &EventHistory<PEAK_HISTORY> {
        &self.peaks
    }

    /// Check if the plant turned out to act against the controller direction
    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// Get result of the last run
    pub fn result(&self) -> Result<TuneResult, TuneError> {
        match self.state {
            TunerState::Failed(failure) => Err(TuneError::Failed(failure)),
            s if s.is_running() => Err(TuneError::Running),
            _ => self.result.ok_or(TuneError::Idle),
        }
    }

    /// Get outcome of a finished run
    pub fn outcome(&self) -> Option<TuneOutcome> {
        match self.state {
            TunerState::Converged => self.result.map(TuneOutcome::Converged),
            TunerState::Failed(failure) => Some(TuneOutcome::Failed(failure)),
            _ => None,
        }
    }

    /// Run one sample of the relay experiment
    ///
    /// `output` is the controller output: read as the starting output when a
    /// run begins, written with the relay level while it runs and restored
    /// to the starting output when the run ends. Returns `true` once the run
    /// has finished, converged or failed. Inputs that do not fit the peak
    /// detector's fixed-point range are skipped.
    pub fn step(&mut self, now_ms: u32, input: f64, output: &mut f64, limits: OutputLimits) -> bool {
        if matches!(self.state, TunerState::Converged | TunerState::Failed(_)) {
            return true;
        }
        let Ok(sample) = FixedDecimal::<3>::from_f64(input) else {
            return false;
        };
        if self.state == TunerState::Off {
            self.begin(now_ms, input, sample, *output);
        }

        if self.relay_bias {
            self.steps.accumulate(input);
        }

        if self.update_relay(input) {
            self.on_relay_switch(now_ms, limits);
        }

        if let Some(level) = self.relay_output() {
            *output = limits.clamp(level);
        }

        let value = sample - self.input_offset;
        if self.window.fill(value) {
            return false;
        }
        let (max, min) = self.window.slide(value, self.offset_change);
        let is_max = value >= max;
        let is_min = value <= min;
        self.input_offset = self.input_offset + self.offset_change;
        self.offset_change = (max + min).half() - self.offset_change;

        if self.state.is_steady() {
            if (max - min).to_f64() <= 2.0 * self.working_noise_band {
                return self.on_steady(now_ms, output);
            }
            return false;
        }

        // Still heading down at the end of a full window with the relay up:
        // the plant acts against the controller direction
        if !self.sense_locked
            && self.state == TunerState::RelayStepUp
            && is_min
            && !is_max
            && input < self.setpoint - self.working_noise_band
        {
            self.inverted = !self.inverted;
            self.sense_locked = true;
            warn!("autotune: process acts in reverse, relay inverted");
            if let Some(level) = self.relay_output() {
                *output = limits.clamp(level);
            }
        }

        // A perfectly flat window is not an extreme
        let extreme = (is_max || is_min) && !(is_max && is_min);
        let mut peak_event = false;
        if extreme {
            let kind = if is_max {
                PeakKind::Maximum
            } else {
                PeakKind::Minimum
            };
            peak_event = self.peak_kind != PeakKind::None && self.peak_kind != kind;
            self.peak_kind = kind;
            if peak_event {
                self.peak_count = self.peak_count.saturating_add(1);
                self.peaks.shift();
                debug!("autotune: peak {} at {}", self.peak_count, self.peaks.value(1));
            }
            self.peaks.set_latest(now_ms, input);
        }

        let mut amplitude = 0.0;
        let mut converged = false;
        if peak_event && self.peak_count > 4 && (!self.relay_bias || self.step_count > 4) {
            let (a, abs_max, abs_min) = self.peak_amplitude();
            amplitude = a;

            if self.method.needs_baseline() {
                let lag = phase_lag(self.working_noise_band, amplitude);
                if !phase_lag_acceptable(lag) {
                    // Takes effect at the next relay switch
                    self.next_noise_band = retargeted_noise_band(amplitude);
                    debug!("autotune: noise band retargeted to {}", self.next_noise_band);
                    return false;
                }
            }

            converged = !is_zero(amplitude)
                && (0.5 * (abs_max - abs_min) - amplitude) / amplitude < PEAK_AMPLITUDE_TOLERANCE;
        }

        let failure = if self.relay_bias && elapsed(now_ms, self.steps.time(0)) > MAX_WAIT_MS {
            Some(TuneFailure::StepTimeout)
        } else if elapsed(now_ms, self.peaks.time(0)) > MAX_WAIT_MS {
            Some(TuneFailure::PeakTimeout)
        } else if self.peak_count >= MAX_PEAK_COUNT {
            Some(TuneFailure::TooManyPeaks)
        } else {
            None
        };

        if let Some(failure) = failure {
            self.fail(failure, output);
            return true;
        }
        if converged {
            self.converge(amplitude, output);
            return true;
        }
        false
    }

    fn begin(&mut self, now_ms: u32, input: f64, sample: FixedDecimal<3>, output: f64) {
        self.setpoint = input;
        self.output_start = output;
        self.working_step = self.step;
        self.working_noise_band = self.noise_band;
        self.next_noise_band = self.noise_band;
        self.inverted = false;
        self.sense_locked = false;

        self.window.restart();
        self.input_offset = sample;
        self.offset_change = FixedDecimal::ZERO;
        self.peak_kind = PeakKind::None;
        self.peak_count = 0;
        self.peaks.reset(now_ms);

        self.bias = 0.0;
        self.step_count = 0;
        self.steps.reset(now_ms);

        self.baseline = 0.0;
        self.process_gain = 0.0;
        self.result = None;

        self.state = if self.method.needs_baseline() {
            TunerState::SteadyAtBaseline
        } else {
            TunerState::RelayStepUp
        };
        info!(
            "autotune: {} around {} step {} band {}",
            self.method.label(),
            input,
            self.working_step,
            self.working_noise_band
        );
    }

    /// Relay direction seen from the process value
    fn relay_sign(&self) -> f64 {
        if self.inverted {
            -self.action
        } else {
            self.action
        }
    }

    /// Switch the relay on a noise band crossing
    ///
    /// Returns `true` when the relay switched.
    fn update_relay(&mut self, input: f64) -> bool {
        let upper = self.setpoint + self.working_noise_band;
        let lower = self.setpoint - self.working_noise_band;
        match self.state {
            TunerState::RelayStepUp => {
                if input > upper {
                    self.sense_locked = true;
                    self.state = TunerState::RelayStepDown;
                    return true;
                }
            }
            TunerState::RelayStepDown => {
                if input < lower {
                    self.state = TunerState::RelayStepUp;
                    return true;
                }
            }
            _ => {}
        }
        false
    }

    fn on_relay_switch(&mut self, now_ms: u32, limits: OutputLimits) {
        self.working_noise_band = self.next_noise_band;
        if !self.relay_bias {
            return;
        }

        if self.step_count > 4 {
            let t = |age| self.steps.time(age);
            let avg_step1 = (t(0).wrapping_sub(t(1)) as f64) + (t(2).wrapping_sub(t(3)) as f64);
            let avg_step2 = (t(1).wrapping_sub(t(2)) as f64) + (t(3).wrapping_sub(t(4)) as f64);

            if let Some(asymmetry) = step_asymmetry(avg_step1, avg_step2) {
                if asymmetry > STEP_ASYMMETRY_TOLERANCE {
                    let sum1 = self.steps.value(1) + self.steps.value(3);
                    let sum2 = self.steps.value(2) + self.steps.value(4);
                    let mut delta = -process_value_offset(avg_step1, avg_step2, sum1, sum2)
                        * self.working_step
                        * self.relay_sign();
                    if self.state == TunerState::RelayStepDown {
                        delta = -delta;
                    }

                    if libm::fabs(delta) > self.working_step * STEP_ASYMMETRY_TOLERANCE {
                        match clamped_relay(
                            self.output_start,
                            self.working_step,
                            self.bias + delta,
                            limits,
                        ) {
                            Some((step, bias)) => {
                                self.working_step = step;
                                self.bias = bias;
                                self.step_count = 0;
                                debug!("autotune: relay bias {} step {}", bias, step);
                            }
                            None => warn!("autotune: relay bias {} out of range", self.bias + delta),
                        }
                    }
                }
            }
        }

        self.steps.shift();
        self.step_count = self.step_count.saturating_add(1);
        self.steps.set_latest(now_ms, 0.0);
    }

    /// Output level for the current state, `None` to hold the output
    fn relay_output(&self) -> Option<f64> {
        let step = self.relay_sign() * self.working_step;
        match self.state {
            TunerState::SteadyAfterStepUp | TunerState::RelayStepUp => {
                Some(self.output_start + step + self.bias)
            }
            TunerState::RelayStepDown => Some(self.output_start - step + self.bias),
            _ => None,
        }
    }

    /// Process value settled inside the noise band (AMIGOf)
    fn on_steady(&mut self, now_ms: u32, output: &mut f64) -> bool {
        let settled = self.input_offset + self.offset_change;
        let level = settled.to_f64();
        if self.relay_bias {
            self.steps.set_latest(now_ms, self.steps.value(0));
        }

        match self.state {
            TunerState::SteadyAtBaseline => {
                self.baseline = level;
                self.state = TunerState::SteadyAfterStepUp;
                self.peaks.set_latest(self.peaks.time(0), level);
                self.window.restart();
                self.input_offset = settled;
                self.offset_change = FixedDecimal::ZERO;
                debug!("autotune: baseline {}", level);
                false
            }
            TunerState::SteadyAfterStepUp => {
                let gain = (level - self.baseline) / self.working_step * self.relay_sign();
                if is_zero(gain) {
                    self.fail(TuneFailure::NoProcessGain, output);
                    return true;
                }
                self.process_gain = gain;
                self.sense_locked = true;
                self.state = TunerState::RelayStepDown;
                if self.relay_bias {
                    self.steps.set_latest(now_ms, 0.0);
                }
                debug!("autotune: process gain {}", gain);
                false
            }
            _ => false,
        }
    }

    /// Amplitude of the last peaks with their absolute extremes
    ///
    /// Returns `(amplitude, max, min)`.
    fn peak_amplitude(&self) -> (f64, f64, f64) {
        let mut abs_max = self.peaks.value(1);
        let mut abs_min = self.peaks.value(1);
        let mut amplitude = 0.0;
        for age in 2..PEAK_HISTORY {
            let value = self.peaks.value(age);
            amplitude += libm::fabs(value - self.peaks.value(age - 1));
            abs_max = abs_max.max(value);
            abs_min = abs_min.min(value);
        }
        (amplitude / 6.0, abs_max, abs_min)
    }

    fn converge(&mut self, amplitude: f64, output: &mut f64) {
        let sign = if self.inverted { -1.0 } else { 1.0 };
        let ku = sign * 4.0 * self.working_step / (amplitude * PI);

        let t = |age| self.peaks.time(age);
        let pu_s = ((t(1).wrapping_sub(t(3)) as f64) + (t(2).wrapping_sub(t(4)) as f64)) / 2000.0;

        let (kp, ti_s, td_s) = match rule_for(self.method) {
            Some(rule) => rule.apply(ku, pu_s),
            None => {
                let lag = phase_lag(self.working_noise_band, amplitude);
                let (kp, ti) = amigof_gains(ku, pu_s, self.process_gain, lag);
                (kp, ti, 0.0)
            }
        };

        self.result = Some(TuneResult {
            ku,
            pu_s,
            amplitude,
            kp,
            ti_s,
            td_s,
        });
        self.state = TunerState::Converged;
        *output = self.output_start;
        info!("autotune: converged Ku {} Pu {} s", ku, pu_s);
    }

    fn fail(&mut self, failure: TuneFailure, output: &mut f64) {
        self.state = TunerState::Failed(failure);
        *output = self.output_start;
        warn!("autotune: failed {:?}", failure);
    }
}
