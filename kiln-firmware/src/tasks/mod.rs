//! Embassy async tasks
//!
//! Each task runs independently and communicates via channels/signals.

pub mod control;

pub use control::{control_task, ControlHardware};
