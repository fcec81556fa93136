//! Control loop driver
//!
//! Polls an [`InputDevice`], feeds the controller, runs the setpoint
//! profile and the trip monitor, and writes the output device. Nothing here
//! blocks: the driver remembers when the pending reading is due and picks
//! it up on a later poll.

use kiln_core::mode::Mode;
use kiln_core::profile::{Profile, ProfileError, ProfileEvent, ProfileRunner};
use kiln_core::safety::{TripMonitor, TripSettings, TripStatus};
use kiln_core::time::{deadline, reached};
use kiln_core::traits::{InputDevice, OutputDevice};

use super::pid::{Controller, Tick};

/// Result of one [`ControlLoop::poll`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoopStatus {
    /// Controller result
    pub tick: Tick,
    /// Trip monitor state after this poll
    pub trip: TripStatus,
    /// Latest reading was NaN
    pub sensor_fault: bool,
    /// Profile step change, if any
    pub profile_event: Option<ProfileEvent>,
    /// Output written to the device (percent)
    pub output: f64,
}

/// Single-loop driver
pub struct ControlLoop<I, O> {
    input: I,
    output: O,
    controller: Controller,
    trip: TripMonitor,
    profile: ProfileRunner,
    /// When the requested reading is ready
    read_due: Option<u32>,
    last_good: Option<f64>,
    sensor_fault: bool,
}

impl<I: InputDevice, O: OutputDevice> ControlLoop<I, O> {
    /// Create a new loop driver
    pub fn new(input: I, output: O, controller: Controller, trip: TripSettings) -> Self {
        Self {
            input,
            output,
            controller,
            trip: TripMonitor::new(trip),
            profile: ProfileRunner::new(),
            read_due: None,
            last_good: None,
            sensor_fault: false,
        }
    }

    /// Run one pass of the loop
    pub fn poll(&mut self, now_ms: u32) -> LoopStatus {
        let mut reading = None;
        if let Some(due) = self.read_due {
            if reached(now_ms, due) {
                let value = self.input.read_input();
                self.read_due = None;
                reading = Some(value);
                if value.is_nan() {
                    if !self.sensor_fault {
                        warn!("loop: sensor fault");
                    }
                    self.sensor_fault = true;
                } else {
                    self.sensor_fault = false;
                    self.last_good = Some(value);
                }
            }
        }
        if self.read_due.is_none() {
            self.read_due = Some(deadline(now_ms, self.input.request_input()));
        }

        let profile_event = if self.profile.is_active() {
            let input = match self.last_good {
                Some(value) if !self.sensor_fault => value,
                _ => f64::NAN,
            };
            let event = self.profile.tick(now_ms, input, self.controller.mode());
            self.controller.set_setpoint(self.profile.setpoint());
            event
        } else {
            None
        };

        let tick = match self.last_good {
            Some(value) => self.controller.compute(now_ms, value),
            None => Tick::Idle,
        };

        let trip = match reading {
            Some(value) => self.trip.update(value),
            None => self.trip.status(),
        };
        let output = if let TripStatus::Tripped(fault) = trip {
            if self.controller.is_tuning() {
                warn!("loop: trip {:?} during auto-tune", fault);
                self.controller.stop_auto_tune();
            }
            0.0
        } else {
            self.controller.output()
        };
        self.output.set_output_percent(output, now_ms);

        LoopStatus {
            tick,
            trip,
            sensor_fault: self.sensor_fault,
            profile_event,
            output,
        }
    }

    /// Start a setpoint profile from the current setpoint
    pub fn start_profile(&mut self, profile: Profile, now_ms: u32) -> Result<(), ProfileError> {
        self.profile
            .start(profile, now_ms, self.controller.setpoint())?;
        info!("loop: profile started");
        Ok(())
    }

    /// Stop the running profile, keeping the current setpoint
    pub fn cancel_profile(&mut self) {
        self.profile.cancel();
    }

    /// Clear a latched trip if the last reading allows it
    pub fn reset_trip(&mut self) -> bool {
        let input = match self.last_good {
            Some(value) if !self.sensor_fault => value,
            _ => f64::NAN,
        };
        self.trip.reset(input)
    }

    /// Get last valid reading
    pub fn last_input(&self) -> Option<f64> {
        self.last_good
    }

    /// Get the controller
    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Get mutable access to the controller
    pub fn controller_mut(&mut self) -> &mut Controller {
        &mut self.controller
    }

    /// Get the trip monitor
    pub fn trip(&self) -> &TripMonitor {
        &self.trip
    }

    /// Get mutable access to the trip monitor
    pub fn trip_mut(&mut self) -> &mut TripMonitor {
        &mut self.trip
    }

    /// Get the profile runner
    pub fn profile(&self) -> &ProfileRunner {
        &self.profile
    }

    /// Get access to the input device
    pub fn input_device(&self) -> &I {
        &self.input
    }

    /// Get access to the output device
    pub fn output_device(&self) -> &O {
        &self.output
    }

    /// Check if the loop is under automatic control
    pub fn is_automatic(&self) -> bool {
        self.controller.mode() == Mode::Automatic
    }
}
