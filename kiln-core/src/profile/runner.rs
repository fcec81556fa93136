//! Profile execution
//!
//! Tracks the current step and its start time, and derives the setpoint
//! from them on every tick. While the controller is in manual mode the
//! runner is suspended: the step clock stops and resumes where it left off.

use super::{Profile, ProfileError, ProfileStep, StepKind};
use crate::mode::Mode;
use crate::time::elapsed;

/// Runner execution phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProfilePhase {
    /// No profile loaded
    Idle,
    /// Executing steps
    Running,
    /// Step clock stopped because the controller is in manual mode
    Suspended,
    /// All steps done
    Complete,
}

/// Transitions reported by [`ProfileRunner::tick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProfileEvent {
    /// Step with this index started
    StepStarted(u8),
    /// Last step finished
    Finished,
}

/// Setpoint profile runner
#[derive(Debug, Clone)]
pub struct ProfileRunner {
    phase: ProfilePhase,
    profile: Profile,
    step_index: u8,
    step_start_ms: u32,
    /// Setpoint when the current step started (ramp origin)
    step_origin: f64,
    setpoint: f64,
    /// Side of the endpoint the input started on, for crossing steps
    below_endpoint: Option<bool>,
    suspended_at_ms: Option<u32>,
}

impl Default for ProfileRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileRunner {
    /// Create an idle runner
    pub fn new() -> Self {
        Self {
            phase: ProfilePhase::Idle,
            profile: Profile::default(),
            step_index: 0,
            step_start_ms: 0,
            step_origin: 0.0,
            setpoint: 0.0,
            below_endpoint: None,
            suspended_at_ms: None,
        }
    }

    /// Get current execution phase
    pub fn phase(&self) -> ProfilePhase {
        self.phase
    }

    /// Check if a profile is loaded and not yet finished
    pub fn is_active(&self) -> bool {
        matches!(self.phase, ProfilePhase::Running | ProfilePhase::Suspended)
    }

    /// Setpoint requested by the current step
    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// Index of the current step
    pub fn step_index(&self) -> u8 {
        self.step_index
    }

    /// Loaded profile
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Start running a profile from the current setpoint
    pub fn start(
        &mut self,
        profile: Profile,
        now_ms: u32,
        setpoint: f64,
    ) -> Result<(), ProfileError> {
        if profile.is_empty() {
            return Err(ProfileError::Empty);
        }
        self.profile = profile;
        self.setpoint = setpoint;
        self.suspended_at_ms = None;
        self.phase = ProfilePhase::Running;
        self.begin_step(0, now_ms);
        Ok(())
    }

    /// Stop the profile, leaving the setpoint where it is
    pub fn cancel(&mut self) {
        self.phase = ProfilePhase::Idle;
        self.suspended_at_ms = None;
    }

    /// Advance the profile
    ///
    /// `input` is the latest process value (NaN when faulted) and `mode`
    /// the controller mode. Returns an event when a step starts or the
    /// profile finishes.
    pub fn tick(&mut self, now_ms: u32, input: f64, mode: Mode) -> Option<ProfileEvent> {
        match self.phase {
            ProfilePhase::Idle | ProfilePhase::Complete => return None,
            ProfilePhase::Running if mode == Mode::Manual => {
                self.phase = ProfilePhase::Suspended;
                self.suspended_at_ms = Some(now_ms);
                return None;
            }
            ProfilePhase::Suspended => {
                if mode == Mode::Manual {
                    return None;
                }
                if let Some(since) = self.suspended_at_ms.take() {
                    self.step_start_ms = self.step_start_ms.wrapping_add(elapsed(now_ms, since));
                }
                self.phase = ProfilePhase::Running;
            }
            ProfilePhase::Running => {}
        }

        let step = self.current_step()?;
        let step_elapsed = elapsed(now_ms, self.step_start_ms);
        let endpoint = step.endpoint.to_f64();

        let done = match step.kind {
            StepKind::Ramp => {
                if step_elapsed >= step.duration_ms {
                    self.setpoint = endpoint;
                    true
                } else {
                    let fraction = step_elapsed as f64 / step.duration_ms as f64;
                    self.setpoint = self.step_origin + (endpoint - self.step_origin) * fraction;
                    false
                }
            }
            StepKind::Soak | StepKind::Jump => {
                self.setpoint = endpoint;
                step_elapsed >= step.duration_ms
            }
            StepKind::WaitToCross => {
                if input.is_nan() {
                    false
                } else {
                    match self.below_endpoint {
                        None => {
                            self.below_endpoint = Some(input < endpoint);
                            false
                        }
                        Some(true) => input >= endpoint,
                        Some(false) => input <= endpoint,
                    }
                }
            }
            StepKind::HoldUntilCancel => {
                self.setpoint = endpoint;
                false
            }
        };

        if done {
            self.advance(now_ms)
        } else {
            None
        }
    }

    fn current_step(&self) -> Option<ProfileStep> {
        self.profile.steps.get(self.step_index as usize).copied()
    }

    fn advance(&mut self, now_ms: u32) -> Option<ProfileEvent> {
        let next = self.step_index + 1;
        if next as usize >= self.profile.len() {
            self.phase = ProfilePhase::Complete;
            return Some(ProfileEvent::Finished);
        }
        self.begin_step(next, now_ms);
        Some(ProfileEvent::StepStarted(next))
    }

    fn begin_step(&mut self, index: u8, now_ms: u32) {
        self.step_index = index;
        self.step_start_ms = now_ms;
        self.step_origin = self.setpoint;
        self.below_endpoint = None;
        if let Some(step) = self.current_step() {
            if matches!(step.kind, StepKind::Jump | StepKind::HoldUntilCancel) {
                self.setpoint = step.endpoint.to_f64();
            }
        }
    }
}
