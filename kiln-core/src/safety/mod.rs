//! Safety monitoring
//!
//! Detects trip conditions that must force the output off.

pub mod trip;

pub use trip::{TripFault, TripMonitor, TripSettings, TripStatus};
