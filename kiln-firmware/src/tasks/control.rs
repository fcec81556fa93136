//! Temperature control task
//!
//! Owns the control loop: thermistor on the ADC, SSR on a GPIO pin, PID
//! controller with its auto-tuner. Polls the loop on a fixed ticker,
//! optionally starting an auto-tune run at boot.

use defmt::*;
use embassy_rp::adc::{Adc, Blocking, Channel};
use embassy_rp::gpio::Output;
use embassy_time::{Duration, Instant, Ticker};

use kiln_core::safety::TripStatus;
use kiln_drivers::control::autotune::TuneOutcome;
use kiln_drivers::control::{ControlLoop, Controller, LoopStatus, Tick};
use kiln_drivers::output::SsrOutput;
use kiln_drivers::sensor::{AdcReader, Thermistor};

use crate::channels::{LoopReport, LOOP_REPORT};
use crate::config;

/// Loop poll period (ms)
///
/// Faster than any sensor latency or sample interval so neither is
/// stretched by the ticker.
const POLL_PERIOD_MS: u64 = 100;

/// Thermistor divider on an RP2040 ADC channel
///
/// The RP2040 converts to 12 bits; the thermistor math expects 10.
pub struct RpAdc {
    adc: Adc<'static, Blocking>,
    channel: Channel<'static>,
}

impl AdcReader for RpAdc {
    fn read(&mut self) -> Result<u16, ()> {
        self.adc
            .blocking_read(&mut self.channel)
            .map(|raw| raw >> 2)
            .map_err(|_| ())
    }
}

/// Peripherals handed to the control task
pub struct ControlHardware {
    /// ADC in blocking mode
    pub adc: Adc<'static, Blocking>,
    /// Thermistor channel
    pub channel: Channel<'static>,
    /// SSR drive pin, initially low
    pub ssr_pin: Output<'static>,
}

type Loop = ControlLoop<Thermistor<RpAdc>, SsrOutput<Output<'static>>>;

/// Temperature control task
#[embassy_executor::task]
pub async fn control_task(hw: ControlHardware) {
    info!("Control task started");

    let settings = config::controller_settings();
    let controller = match Controller::from_settings(&settings) {
        Ok(controller) => controller,
        Err(e) => {
            warn!("Rejected built-in settings: {:?}, using defaults", e);
            Controller::new()
        }
    };
    info!(
        "Gains Kp={} Ki={} Kd={}, sample {} ms",
        controller.kp().to_f64(),
        controller.ki().to_f64(),
        controller.kd().to_f64(),
        controller.sample_time_ms()
    );

    let sensor = Thermistor::new(
        RpAdc {
            adc: hw.adc,
            channel: hw.channel,
        },
        config::thermistor_settings(),
    );

    let mut ssr = SsrOutput::new(hw.ssr_pin, config::ssr_inverted());
    if let Err(e) = ssr.set_window(config::ssr_window()) {
        warn!("SSR window rejected: {:?}, keeping {} ms", e, ssr.window_ms());
    }

    let mut control: Loop = ControlLoop::new(sensor, ssr, controller, config::trip_settings());
    if config::tune_on_boot() {
        let pid = control.controller_mut();
        match pid.start_auto_tune() {
            Ok(()) => info!("Auto-tune started ({:?})", pid.tuner_settings().method),
            Err(e) => warn!("Cannot start auto-tune: {:?}", e),
        }
    }

    let mut ticker = Ticker::every(Duration::from_millis(POLL_PERIOD_MS));
    let mut last_trip = TripStatus::Ok;

    loop {
        ticker.next().await;
        let now = Instant::now().as_millis() as u32;
        let status = control.poll(now);
        log_status(&control, &status, last_trip);
        last_trip = status.trip;
        LOOP_REPORT.signal(LoopReport {
            input: control.last_input(),
            setpoint: control.controller().setpoint(),
            output: status.output,
            automatic: control.is_automatic(),
            tuning: control.controller().is_tuning(),
            trip: status.trip,
        });
    }
}

/// Log the events of one loop pass
fn log_status(control: &Loop, status: &LoopStatus, last_trip: TripStatus) {
    match status.tick {
        Tick::TuneComplete(TuneOutcome::Converged(result)) => {
            let pid = control.controller();
            info!(
                "Auto-tune converged: Ku={} Pu={}s -> Kp={} Ki={} Kd={}",
                result.ku,
                result.pu_s,
                pid.kp().to_f64(),
                pid.ki().to_f64(),
                pid.kd().to_f64()
            );
        }
        Tick::TuneComplete(TuneOutcome::Failed(failure)) => {
            warn!("Auto-tune failed: {:?}", failure);
        }
        _ => {}
    }

    if status.trip != last_trip {
        match status.trip {
            TripStatus::Tripped(fault) => warn!("Tripped: {:?}, output forced off", fault),
            TripStatus::Ok => info!("Trip cleared"),
        }
    }

    if status.sensor_fault {
        if let Some(e) = control.input_device().last_error() {
            trace!("Sensor error: {:?}", e);
        }
    }
}
