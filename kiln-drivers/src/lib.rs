//! Control engine and device drivers
//!
//! This crate provides the control law and concrete implementations of the
//! device traits defined in kiln-core:
//!
//! - PID controller with relay-feedback auto-tuning
//! - Loop driver combining controller, profile runner and trip monitor
//! - NTC thermistor input
//! - Time-proportioned SSR output
//! - Simulated first-order-plus-dead-time plant

#![no_std]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod control;
pub mod output;
pub mod sensor;
pub mod simulator;
