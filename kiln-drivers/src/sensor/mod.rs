//! Process input devices

pub mod max31855;
pub mod thermistor;

pub use max31855::Max31855;
pub use thermistor::{AdcReader, Thermistor, ThermistorSettings};
