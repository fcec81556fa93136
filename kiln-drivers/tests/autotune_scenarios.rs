//! Auto-tune runs against synthetic plants

use std::collections::VecDeque;
use std::f64::consts::PI;

use kiln_core::config::{TunerSettings, TuningMethod};
use kiln_core::decimal::FixedDecimal;
use kiln_core::mode::{Direction, Mode};
use kiln_drivers::control::autotune::{TuneFailure, TuneOutcome, TuneResult};
use kiln_drivers::control::history::EventHistory;
use kiln_drivers::control::{Controller, Tick};
use proptest::prelude::*;

/// Plant advanced once per controller sample
trait Plant {
    fn pv(&self) -> f64;
    fn advance(&mut self, output: f64);
}

/// Integrator with dead time: `dpv/dt = k (u(t - L) - u0)`
///
/// Under relay feedback with half-amplitude `d` and noise band `ε` it
/// settles into a triangle wave with amplitude `ε + k d L` and period
/// `4L + 4ε / (k d)`.
struct IntegratorPlant {
    pv: f64,
    gain: f64,
    dt_s: f64,
    pipeline: VecDeque<f64>,
}

const OUTPUT_REST: f64 = 50.0;

impl IntegratorPlant {
    fn new(gain: f64, delay_samples: usize, dt_s: f64) -> Self {
        Self {
            pv: 100.0,
            gain,
            dt_s,
            pipeline: std::iter::repeat(OUTPUT_REST).take(delay_samples).collect(),
        }
    }

}

impl Plant for IntegratorPlant {
    fn pv(&self) -> f64 {
        self.pv
    }

    fn advance(&mut self, output: f64) {
        let delayed = self.pipeline.pop_front().unwrap_or(OUTPUT_REST);
        self.pipeline.push_back(output);
        self.pv += self.gain * (delayed - OUTPUT_REST) * self.dt_s;
    }
}

/// First-order lag with dead time, relaxing towards
/// `rest + k (u(t - L) - u0)` with time constant `τ`
struct LagPlant {
    pv: f64,
    rest: f64,
    gain: f64,
    lag_s: f64,
    dt_s: f64,
    pipeline: VecDeque<f64>,
}

impl LagPlant {
    fn new(gain: f64, lag_s: f64, dead_time_s: f64, dt_s: f64, pv: f64, rest: f64) -> Self {
        let delay = ((dead_time_s / dt_s).round() as usize).max(1);
        Self {
            pv,
            rest,
            gain,
            lag_s,
            dt_s,
            pipeline: std::iter::repeat(OUTPUT_REST).take(delay).collect(),
        }
    }
}

impl Plant for LagPlant {
    fn pv(&self) -> f64 {
        self.pv
    }

    fn advance(&mut self, output: f64) {
        let delayed = self.pipeline.pop_front().unwrap_or(OUTPUT_REST);
        self.pipeline.push_back(output);
        let target = self.rest + self.gain * (delayed - OUTPUT_REST);
        self.pv += (target - self.pv) * self.dt_s / self.lag_s;
    }
}

const SAMPLE_MS: u32 = 100;
const STEP: f64 = 20.0;
const NOISE_BAND: f64 = 0.5;
const DEAD_TIME_S: f64 = 20.0;

fn tuning_controller(method: TuningMethod) -> Controller {
    let mut pid = Controller::new();
    pid.set_sample_time(SAMPLE_MS).unwrap();
    pid.set_manual_output(FixedDecimal::from_int(OUTPUT_REST as i32));
    pid.start_auto_tune_with(TunerSettings {
        method,
        step: FixedDecimal::from_int(STEP as i32),
        noise_band: FixedDecimal::from_raw((NOISE_BAND * 1000.0) as i32),
        lookback_s: 10,
        relay_bias: false,
    })
    .unwrap();
    pid
}

/// Run until the tuner finishes, returning the outcome, finish time and
/// the output held over each sample before that
fn run_traced<P: Plant>(
    pid: &mut Controller,
    plant: &mut P,
    sample_ms: u32,
) -> (TuneOutcome, u32, Vec<f64>) {
    let mut trace = Vec::new();
    let mut now = 0u32;
    while now < 3_600_000 {
        if let Tick::TuneComplete(outcome) = pid.compute(now, plant.pv()) {
            return (outcome, now, trace);
        }
        trace.push(pid.output());
        plant.advance(pid.output());
        now += sample_ms;
    }
    panic!("auto-tune did not finish");
}

fn run_to_completion(pid: &mut Controller, plant: &mut IntegratorPlant) -> (TuneOutcome, u32) {
    let (outcome, now, _) = run_traced(pid, plant, SAMPLE_MS);
    (outcome, now)
}

/// Controller sampling once a second, tuning with a 20 % relay step
fn slow_tuning_controller(method: TuningMethod, lookback_s: u16, relay_bias: bool) -> Controller {
    let mut pid = Controller::new();
    pid.set_sample_time(1_000).unwrap();
    pid.set_manual_output(FixedDecimal::from_int(OUTPUT_REST as i32));
    pid.start_auto_tune_with(TunerSettings {
        method,
        step: FixedDecimal::from_int(STEP as i32),
        noise_band: FixedDecimal::from_raw((NOISE_BAND * 1000.0) as i32),
        lookback_s,
        relay_bias,
    })
    .unwrap();
    pid
}

/// Collapse an output trace into `(level, samples)` runs
fn relay_runs(trace: &[f64]) -> Vec<(f64, usize)> {
    let mut runs: Vec<(f64, usize)> = Vec::new();
    for &level in trace {
        if let Some((last, count)) = runs.last_mut() {
            if *last == level {
                *count += 1;
                continue;
            }
        }
        runs.push((level, 1));
    }
    runs
}

/// Samples spent above the rest output over samples spent below it
fn up_down_ratio(runs: &[(f64, usize)]) -> f64 {
    let up: usize = runs.iter().filter(|(l, _)| *l > OUTPUT_REST).map(|(_, n)| n).sum();
    let down: usize = runs.iter().filter(|(l, _)| *l < OUTPUT_REST).map(|(_, n)| n).sum();
    up as f64 / down as f64
}

fn converged(outcome: TuneOutcome) -> TuneResult {
    match outcome {
        TuneOutcome::Converged(result) => result,
        TuneOutcome::Failed(failure) => panic!("auto-tune failed: {:?}", failure),
    }
}

fn within(actual: f64, expected: f64, fraction: f64) -> bool {
    (actual - expected).abs() <= fraction * expected.abs()
}

#[test]
fn converges_to_describing_function_prediction() {
    let slope = 0.1; // process units per second at full relay step
    let gain = slope / STEP;
    let mut plant = IntegratorPlant::new(gain, (DEAD_TIME_S * 10.0) as usize, 0.1);
    let mut pid = tuning_controller(TuningMethod::ZieglerNicholsPid);

    let (outcome, _) = run_to_completion(&mut pid, &mut plant);
    let result = converged(outcome);

    let amplitude = NOISE_BAND + slope * DEAD_TIME_S;
    let expected_ku = 4.0 * STEP / (PI * amplitude);
    let expected_pu = 4.0 * DEAD_TIME_S + 4.0 * NOISE_BAND / slope;
    assert!(within(result.ku, expected_ku, 0.05), "Ku {}", result.ku);
    assert!(within(result.pu_s, expected_pu, 0.05), "Pu {}", result.pu_s);

    // Ziegler-Nichols PID written back as display gains
    let kp = result.ku / 1.7;
    assert!(within(pid.kp().to_f64(), kp, 0.01));
    assert!(within(pid.ki().to_f64(), kp / (result.pu_s / 2.0), 0.01));
    assert!(within(pid.kd().to_f64(), kp * result.pu_s / 8.0, 0.01));
    assert_eq!(pid.direction(), Direction::Direct);

    // Pre-tuning state restored
    assert!(!pid.is_tuning());
    assert_eq!(pid.mode(), Mode::Manual);
    assert_eq!(pid.output(), OUTPUT_REST);
}

#[test]
fn reverse_acting_plant_flips_direction() {
    let slope = 0.1;
    let mut plant = IntegratorPlant::new(-slope / STEP, (DEAD_TIME_S * 10.0) as usize, 0.1);
    let mut pid = tuning_controller(TuningMethod::ZieglerNicholsPi);

    let (outcome, _) = run_to_completion(&mut pid, &mut plant);
    let result = converged(outcome);

    let amplitude = NOISE_BAND + slope * DEAD_TIME_S;
    assert!(result.ku < 0.0);
    assert!(within(-result.ku, 4.0 * STEP / (PI * amplitude), 0.05));

    assert_eq!(pid.direction(), Direction::Reverse);
    assert!(pid.kp().to_f64() > 0.0);
    assert!(within(pid.kp().to_f64(), -result.ku / 2.2, 0.01));
    assert_eq!(pid.kd(), FixedDecimal::ZERO);
    let (kp, _, _) = pid.scaled_gains();
    assert!(kp < 0.0);
}

#[test]
fn flat_process_fails_on_peak_timeout() {
    let mut pid = Controller::new();
    pid.set_manual_output(FixedDecimal::from_int(50));
    let before = (pid.kp(), pid.ki(), pid.kd());
    pid.start_auto_tune().unwrap();

    let mut now = 0u32;
    let outcome = loop {
        if let Tick::TuneComplete(outcome) = pid.compute(now, 100.0) {
            break outcome;
        }
        now += 1_000;
        assert!(now <= 400_000, "no timeout");
    };

    assert_eq!(outcome, TuneOutcome::Failed(TuneFailure::PeakTimeout));
    assert_eq!(now, 301_000);
    assert_eq!((pid.kp(), pid.ki(), pid.kd()), before);
    assert!(!pid.is_tuning());
    assert_eq!(pid.output(), 50.0);
}

#[test]
fn flat_process_off_the_start_value_fails_on_peak_timeout() {
    let mut pid = Controller::new();
    pid.set_manual_output(FixedDecimal::from_int(50));
    pid.start_auto_tune().unwrap();

    assert_eq!(pid.compute(0, 20.0), Tick::Updated);
    let mut now = 0u32;
    let outcome = loop {
        now += 1_000;
        if let Tick::TuneComplete(outcome) = pid.compute(now, 20.13) {
            break outcome;
        }
        assert!(now <= 400_000, "no timeout");
    };

    assert_eq!(outcome, TuneOutcome::Failed(TuneFailure::PeakTimeout));
    assert_eq!(now, 311_000);
    assert_eq!(pid.output(), 50.0);
}

#[test]
fn weak_plant_inside_noise_band_fails_on_peak_timeout() {
    // 20 % of relay moves the plant 0.1, inside a 0.2 band
    let mut plant = LagPlant::new(0.005, 10.0, 5.0, 1.0, 100.0, 100.0);
    let mut pid = Controller::new();
    pid.set_sample_time(1_000).unwrap();
    pid.set_manual_output(FixedDecimal::from_int(OUTPUT_REST as i32));
    pid.start_auto_tune_with(TunerSettings {
        method: TuningMethod::ZieglerNicholsPid,
        step: FixedDecimal::from_int(STEP as i32),
        noise_band: FixedDecimal::from_raw(200),
        lookback_s: 10,
        relay_bias: false,
    })
    .unwrap();

    let (outcome, now, _) = run_traced(&mut pid, &mut plant, 1_000);
    assert_eq!(outcome, TuneOutcome::Failed(TuneFailure::PeakTimeout));
    assert!(now > 300_000 && now < 400_000, "finished at {} ms", now);
    assert_eq!(pid.tuner().peak_count(), 0);
}

#[test]
fn direct_plant_drifting_down_keeps_direction() {
    // Resting 5 below where the run starts, so the process value keeps
    // falling for a while with the relay up
    let mut plant = LagPlant::new(0.5, 60.0, 5.0, 1.0, 100.0, 95.0);
    let mut pid = slow_tuning_controller(TuningMethod::ZieglerNicholsPid, 10, false);

    let (outcome, _, trace) = run_traced(&mut pid, &mut plant, 1_000);
    let result = converged(outcome);

    assert!(result.ku > 0.0, "Ku {}", result.ku);
    assert!(!pid.tuner().is_inverted());
    assert_eq!(pid.direction(), Direction::Direct);
    // Relay never stepped below rest while the process value was falling
    assert_eq!(trace[0], OUTPUT_REST + STEP);
    assert!(trace.iter().take(15).all(|&level| level == OUTPUT_REST + STEP));
}

#[test]
fn relay_bias_evens_out_half_cycles() {
    // Needs 40 % output to hold the start value, well off the 50 % rest
    let mut plant = LagPlant::new(2.0, 60.0, 5.0, 1.0, 100.0, 80.0);
    let mut pid = slow_tuning_controller(TuningMethod::ZieglerNicholsPid, 20, true);

    let (outcome, _, trace) = run_traced(&mut pid, &mut plant, 1_000);
    let result = converged(outcome);
    assert!(result.ku > 0.0);

    let bias = pid.tuner().relay_bias();
    assert!(bias > 3.0 && bias < 8.0, "bias {}", bias);
    assert!((pid.tuner().working_step() - STEP).abs() < 1e-9);

    // The last run is cut short by convergence
    let runs = relay_runs(&trace);
    let complete = &runs[..runs.len() - 1];
    assert!(complete.len() >= 10, "{:?}", complete);

    let early = &complete[..6];
    assert!(early.iter().all(|(l, _)| *l == OUTPUT_REST + STEP || *l == OUTPUT_REST - STEP));
    let late = &complete[complete.len() - 4..];
    for (level, _) in late {
        let centred = *level - bias;
        assert!(
            (centred - (OUTPUT_REST + STEP)).abs() < 1e-9
                || (centred - (OUTPUT_REST - STEP)).abs() < 1e-9,
            "level {}",
            level
        );
    }

    let before = up_down_ratio(early);
    let after = up_down_ratio(late);
    assert!(before > 2.0, "before {}", before);
    assert!(after < before && after < 2.0, "after {}", after);
}

#[test]
fn amigof_identifies_lag_plant() {
    let mut plant = LagPlant::new(1.0, 30.0, 5.0, 1.0, 100.0, 100.0);
    let mut pid = slow_tuning_controller(TuningMethod::AmigofPi, 20, false);

    let (outcome, _, trace) = run_traced(&mut pid, &mut plant, 1_000);
    let result = converged(outcome);

    // Output held while the baseline settles
    assert_eq!(trace[0], OUTPUT_REST);
    assert!(result.ku > 5.0 && result.ku < 9.0, "Ku {}", result.ku);
    assert!(result.pu_s > 18.0 && result.pu_s < 26.0, "Pu {}", result.pu_s);
    assert!(result.kp > 1.5 && result.kp < 2.5, "Kp {}", result.kp);
    assert!(result.ti_s > 8.0 && result.ti_s < 20.0, "Ti {}", result.ti_s);
    assert_eq!(result.td_s, 0.0);
    assert_ne!(pid.tuner().working_noise_band(), NOISE_BAND);

    assert!(within(pid.kp().to_f64(), result.kp, 0.01));
    assert_eq!(pid.kd(), FixedDecimal::ZERO);
    assert_eq!(pid.output(), OUTPUT_REST);
}

#[test]
fn stop_mid_run_keeps_gains() {
    let slope = 0.1;
    let mut plant = IntegratorPlant::new(slope / STEP, 200, 0.1);
    let mut pid = tuning_controller(TuningMethod::TyreusLuybenPid);
    let before = (pid.kp(), pid.ki(), pid.kd());

    let mut now = 0u32;
    while now < 60_000 {
        pid.compute(now, plant.pv);
        plant.advance(pid.output());
        now += SAMPLE_MS;
    }
    assert!(pid.is_tuning());
    pid.stop_auto_tune();
    assert!(!pid.is_tuning());
    assert_eq!((pid.kp(), pid.ki(), pid.kd()), before);
    assert_eq!(pid.output(), OUTPUT_REST);
}

proptest! {
    #[test]
    fn peak_history_keeps_latest_five(values in prop::collection::vec(-1e3f64..1e3, 1..40)) {
        let mut peaks = EventHistory::<5>::default();
        peaks.reset(0);
        for (i, value) in values.iter().enumerate() {
            peaks.shift();
            peaks.set_latest(i as u32, *value);
        }
        let n = values.len();
        for age in 0..n.min(5) {
            prop_assert_eq!(peaks.value(age), values[n - 1 - age]);
            prop_assert_eq!(peaks.time(age), (n - 1 - age) as u32);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn live_peaks_stay_ordered_and_alternate(
        slope in 0.02f64..0.5,
        delay in 10usize..300,
        band in prop::sample::select(vec![100i32, 200, 500, 1_000]),
        reverse in any::<bool>(),
    ) {
        let sign = if reverse { -1.0 } else { 1.0 };
        let mut plant = IntegratorPlant::new(sign * slope / STEP, delay, 0.1);
        let mut pid = Controller::new();
        pid.set_sample_time(SAMPLE_MS).unwrap();
        pid.set_manual_output(FixedDecimal::from_int(OUTPUT_REST as i32));
        pid.start_auto_tune_with(TunerSettings {
            method: TuningMethod::ZieglerNicholsPid,
            step: FixedDecimal::from_int(STEP as i32),
            noise_band: FixedDecimal::from_raw(band),
            lookback_s: 10,
            relay_bias: false,
        })
        .unwrap();

        let mut now = 0u32;
        let outcome = loop {
            if let Tick::TuneComplete(outcome) = pid.compute(now, plant.pv) {
                break outcome;
            }
            let tuner = pid.tuner();
            let peaks = tuner.peaks();
            prop_assert!(peaks.time(0) <= now);
            for age in 1..5 {
                prop_assert!(peaks.time(age) <= peaks.time(age - 1));
            }
            prop_assert!(tuner.peak_count() <= 20);
            if tuner.peak_count() >= 4 {
                for age in 1..3 {
                    let turn = (peaks.value(age) - peaks.value(age + 1))
                        * (peaks.value(age + 1) - peaks.value(age + 2));
                    prop_assert!(turn < 0.0, "peaks {:?} at {} ms", peaks, now);
                }
            }
            plant.advance(pid.output());
            now += SAMPLE_MS;
            prop_assert!(now < 3_600_000);
        };

        match outcome {
            TuneOutcome::Converged(result) => prop_assert_eq!(result.ku.signum(), sign),
            TuneOutcome::Failed(failure) => prop_assert!(false, "failed: {:?}", failure),
        }
    }
}
