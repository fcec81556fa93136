//! Board-agnostic core types for the Kiln temperature controller
//!
//! This crate contains everything that does not depend on a control law
//! or on specific hardware:
//!
//! - Fixed-point decimal values for settings and gains
//! - Wrap-tolerant millisecond arithmetic
//! - Controller mode and direction
//! - Input/output device traits
//! - Settings snapshot and auto-tune parameters
//! - Setpoint profile runner
//! - Trip monitoring

#![no_std]
#![deny(unsafe_code)]

pub mod config;
pub mod decimal;
pub mod mode;
pub mod profile;
pub mod safety;
pub mod time;
pub mod traits;
