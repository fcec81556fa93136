//! Property tests for the PID controller

use kiln_core::config::ConfigError;
use kiln_core::decimal::FixedDecimal;
use kiln_core::mode::{Direction, Mode};
use kiln_drivers::control::Controller;
use proptest::prelude::*;

fn gains() -> impl Strategy<Value = (i32, i32, i32)> {
    (0i32..20_000, 0i32..20_000, 0i32..20_000)
}

fn tuned(kp: i32, ki: i32, kd: i32) -> Controller {
    let mut pid = Controller::new();
    pid.set_tunings(
        FixedDecimal::from_raw(kp),
        FixedDecimal::from_raw(ki),
        FixedDecimal::from_raw(kd),
    )
    .unwrap();
    pid
}

fn direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Direct), Just(Direction::Reverse)]
}

proptest! {
    #[test]
    fn switch_to_automatic_is_bumpless(
        (kp, ki, kd) in gains(),
        dir in direction(),
        manual in 0i32..=1000,
        input in -50.0f64..500.0,
    ) {
        let mut pid = tuned(kp, ki, kd);
        pid.set_controller_direction(dir);
        pid.set_manual_output(FixedDecimal::from_raw(manual));
        pid.set_setpoint(input);
        pid.compute(0, input);

        pid.set_mode(Mode::Automatic);
        pid.compute(1_000, input);
        prop_assert_eq!(pid.output(), manual as f64 / 10.0);
    }

    #[test]
    fn negative_gains_are_rejected(
        (kp, ki, kd) in gains(),
        bad in -20_000i32..0,
        which in 0usize..3,
    ) {
        let mut pid = tuned(kp, ki, kd);
        let before = (pid.kp(), pid.ki(), pid.kd(), pid.scaled_gains());

        let mut proposed = [1_000, 1_000, 1_000];
        proposed[which] = bad;
        let result = pid.set_tunings(
            FixedDecimal::from_raw(proposed[0]),
            FixedDecimal::from_raw(proposed[1]),
            FixedDecimal::from_raw(proposed[2]),
        );
        prop_assert_eq!(result, Err(ConfigError::NegativeGain));
        prop_assert_eq!((pid.kp(), pid.ki(), pid.kd(), pid.scaled_gains()), before);
    }

    #[test]
    fn sample_time_changes_do_not_compound(
        (kp, ki, kd) in gains(),
        first in 1u32..10_000,
        second in 1u32..10_000,
    ) {
        let mut changed = tuned(kp, ki, kd);
        changed.set_sample_time(first).unwrap();
        changed.set_sample_time(second).unwrap();

        let mut direct = tuned(kp, ki, kd);
        direct.set_sample_time(second).unwrap();
        prop_assert_eq!(changed.scaled_gains(), direct.scaled_gains());

        // Continuous-time gains are unchanged by the interval
        let (_, ki_s, kd_s) = changed.scaled_gains();
        let ts = second as f64 / 1000.0;
        prop_assert!((ki_s / ts - ki as f64 / 1000.0).abs() < 1e-9);
        prop_assert!((kd_s * ts - kd as f64 / 1000.0).abs() < 1e-9);
    }

    #[test]
    fn direction_is_idempotent((kp, ki, kd) in gains(), dir in direction()) {
        let mut once = tuned(kp, ki, kd);
        once.set_controller_direction(dir);
        let mut twice = tuned(kp, ki, kd);
        twice.set_controller_direction(dir);
        twice.set_controller_direction(dir);
        prop_assert_eq!(once.scaled_gains(), twice.scaled_gains());

        // And reversible
        let original = tuned(kp, ki, kd);
        once.set_controller_direction(Direction::Direct);
        prop_assert_eq!(once.scaled_gains(), original.scaled_gains());
    }

    #[test]
    fn output_stays_within_limits(
        (kp, ki, kd) in gains(),
        dir in direction(),
        low in -100.0f64..50.0,
        span in 0.5f64..200.0,
        setpoint in 0.0f64..300.0,
        inputs in prop::collection::vec(-100.0f64..400.0, 1..50),
    ) {
        let high = low + span;
        let mut pid = tuned(kp, ki, kd);
        pid.set_controller_direction(dir);
        pid.set_output_limits(low, high).unwrap();
        pid.set_setpoint(setpoint);
        pid.set_mode(Mode::Automatic);

        let mut now = 0u32;
        for input in inputs {
            pid.compute(now, input);
            prop_assert!(pid.output() >= low && pid.output() <= high);
            now = now.wrapping_add(1_000);
        }
    }
}
