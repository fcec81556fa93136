//! Setpoint profiles
//!
//! A profile is a short list of steps that move the setpoint over time
//! (ramp, soak, jump) or wait on the process (crossing, hold). The runner
//! only writes the setpoint; it never touches the controller output.

pub mod runner;

use heapless::{String, Vec};

use crate::decimal::FixedDecimal;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use runner::{ProfileEvent, ProfilePhase, ProfileRunner};

/// Maximum steps per profile
pub const MAX_PROFILE_STEPS: usize = 16;

/// Maximum profile name length
pub const MAX_PROFILE_NAME_LEN: usize = 15;

/// Profile construction errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProfileError {
    /// Name longer than [`MAX_PROFILE_NAME_LEN`]
    NameTooLong,
    /// Already holds [`MAX_PROFILE_STEPS`] steps
    Full,
    /// Profile has no steps to run
    Empty,
}

/// Kind of profile step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StepKind {
    /// Move the setpoint linearly to the endpoint over the duration
    Ramp,
    /// Hold the setpoint at the endpoint for the duration
    Soak,
    /// Set the endpoint immediately, then wait the duration
    Jump,
    /// Leave the setpoint alone until the input crosses the endpoint
    WaitToCross,
    /// Set the endpoint and stay there until the profile is cancelled
    HoldUntilCancel,
}

/// One step of a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProfileStep {
    /// Step kind
    pub kind: StepKind,
    /// Step duration (ms); unused by crossing and hold steps
    pub duration_ms: u32,
    /// Target setpoint (process units)
    pub endpoint: FixedDecimal<1>,
}

impl ProfileStep {
    /// Create a step
    pub const fn new(kind: StepKind, duration_ms: u32, endpoint: FixedDecimal<1>) -> Self {
        Self {
            kind,
            duration_ms,
            endpoint,
        }
    }
}

/// Named setpoint profile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Profile {
    /// Display name
    pub name: String<MAX_PROFILE_NAME_LEN>,
    /// Steps in run order
    pub steps: Vec<ProfileStep, MAX_PROFILE_STEPS>,
}

impl Profile {
    /// Create an empty profile
    pub fn new(name: &str) -> Result<Self, ProfileError> {
        let mut label = String::new();
        label
            .push_str(name)
            .map_err(|_| ProfileError::NameTooLong)?;
        Ok(Self {
            name: label,
            steps: Vec::new(),
        })
    }

    /// Append a step
    pub fn add_step(&mut self, step: ProfileStep) -> Result<(), ProfileError> {
        self.steps.push(step).map_err(|_| ProfileError::Full)
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the profile has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
