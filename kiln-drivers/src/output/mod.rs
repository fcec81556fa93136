//! Process output devices

pub mod ssr;

pub use ssr::SsrOutput;
