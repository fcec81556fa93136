//! Relay-feedback tuning rules
//!
//! Each rule divides the ultimate gain and period found by the relay
//! experiment: `Kp = Ku / dKp`, `Ti = Pu / dTi`, `Td = Pu / dTd`. The
//! divisors are stored as counts of 0.05 so the whole table fits in bytes.
//!
//! Sources: Tyreus-Luyben and Ciancone-Marlin from Yu, "Autotuning of PID
//! Controllers: A Relay Feedback Approach"; Pessen-Integral and the
//! overshoot rules from McCormack & Godfrey, IEEE TCST 6(1), 1998.

use kiln_core::config::TuningMethod;

/// Divisor unit (0.05)
const DIVISOR_UNIT: f64 = 0.05;

/// Divisor triple for one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TuningRule {
    divisors: [u8; 3],
}

impl TuningRule {
    const fn new(d_kp: u8, d_ti: u8, d_td: u8) -> Self {
        Self {
            divisors: [d_kp, d_ti, d_td],
        }
    }

    /// Gain divisor
    pub fn d_kp(&self) -> f64 {
        self.divisors[0] as f64 * DIVISOR_UNIT
    }

    /// Integral time divisor
    pub fn d_ti(&self) -> f64 {
        self.divisors[1] as f64 * DIVISOR_UNIT
    }

    /// Derivative time divisor (zero for PI rules)
    pub fn d_td(&self) -> f64 {
        self.divisors[2] as f64 * DIVISOR_UNIT
    }

    /// Check if this rule has no derivative term
    pub fn is_pi(&self) -> bool {
        self.divisors[2] == 0
    }

    /// Apply the rule to the ultimate gain and period (seconds)
    ///
    /// Returns `(Kp, Ti, Td)` with `Ti` and `Td` in seconds.
    pub fn apply(&self, ku: f64, pu_s: f64) -> (f64, f64, f64) {
        let kp = ku / self.d_kp();
        let ti = pu_s / self.d_ti();
        let td = if self.is_pi() { 0.0 } else { pu_s / self.d_td() };
        (kp, ti, td)
    }
}

/// Rule table in [`TuningMethod`] order (AMIGOf has no row)
const RULES: [TuningRule; 9] = [
    TuningRule::new(44, 24, 0),   // Ziegler-Nichols PI
    TuningRule::new(34, 40, 160), // Ziegler-Nichols PID
    TuningRule::new(64, 9, 0),    // Tyreus-Luyben PI
    TuningRule::new(44, 9, 126),  // Tyreus-Luyben PID
    TuningRule::new(66, 80, 0),   // Ciancone-Marlin PI
    TuningRule::new(66, 88, 162), // Ciancone-Marlin PID
    TuningRule::new(28, 50, 133), // Pessen-Integral PID
    TuningRule::new(60, 40, 60),  // Some-Overshoot PID
    TuningRule::new(100, 40, 60), // No-Overshoot PID
];

/// Look up the divisor table for a method
///
/// Returns `None` for AMIGOf, which computes its gains from the phase lag.
pub fn rule_for(method: TuningMethod) -> Option<TuningRule> {
    RULES.get(method.index()).copied()
}
