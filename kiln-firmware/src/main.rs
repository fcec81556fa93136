//! Kiln - Temperature Controller Firmware
//!
//! Main firmware binary for RP2040-based single-loop controllers: an NTC
//! thermistor in, a solid state relay out, PID control in between with
//! relay-feedback auto-tuning.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::adc::{Adc, Channel};
use embassy_rp::gpio::{Level, Output, Pull};
use embassy_time::Timer;
use {defmt_rtt as _, panic_probe as _};

mod channels;
mod config;
mod tasks;

use crate::channels::LOOP_REPORT;

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Kiln firmware starting...");

    // Initialize RP2040 peripherals
    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    // Thermistor divider
    // Pin assignment is board-specific (SKR Pico TH0: GPIO27)
    let adc = Adc::new_blocking(p.ADC, embassy_rp::adc::Config::default());
    let channel = Channel::new_pin(p.PIN_27, Pull::None);

    // SSR drive, off until the loop runs
    // Pin assignment is board-specific (SKR Pico HE0: GPIO23)
    let level = if config::ssr_inverted() {
        Level::High
    } else {
        Level::Low
    };
    let ssr_pin = Output::new(p.PIN_23, level);

    info!("ADC and SSR initialized");

    // Spawn tasks
    spawner
        .spawn(tasks::control_task(tasks::ControlHardware {
            adc,
            channel,
            ssr_pin,
        }))
        .unwrap();

    info!("All tasks spawned, firmware running");

    // Periodic status line from the latest loop report
    loop {
        Timer::after_secs(5).await;
        if let Some(report) = LOOP_REPORT.try_take() {
            info!(
                "T={:?} SP={} OUT={}% auto={} tuning={} trip={:?}",
                report.input,
                report.setpoint,
                report.output,
                report.automatic,
                report.tuning,
                report.trip
            );
        } else {
            trace!("Main loop heartbeat");
        }
    }
}
