//! Hardware abstraction traits
//!
//! These traits define the interface between the control engine
//! and hardware-specific implementations.

pub mod io;

pub use io::{InputDevice, OutputDevice, SensorError};
