//! Inter-task communication channels
//!
//! Defines the static signal the control task publishes its state on.
//! Uses embassy-sync primitives for safe async communication.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use kiln_core::safety::TripStatus;

/// Snapshot published by the control task after each loop pass
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoopReport {
    /// Last valid reading (°C), None before the first one
    pub input: Option<f64>,
    /// Current setpoint (°C)
    pub setpoint: f64,
    /// Output written to the SSR (percent)
    pub output: f64,
    /// Under automatic control
    pub automatic: bool,
    /// Auto-tune run in progress
    pub tuning: bool,
    /// Trip monitor state
    pub trip: TripStatus,
}

/// Latest loop state (updated by the control task)
pub static LOOP_REPORT: Signal<CriticalSectionRawMutex, LoopReport> = Signal::new();
