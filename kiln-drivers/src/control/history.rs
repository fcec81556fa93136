//! Fixed-size history buffers for the auto-tuner
//!
//! Both buffers shift on insert instead of wrapping an index, so slot 0 is
//! always the most recent entry and the tuner formulas can address older
//! entries by age directly.

use kiln_core::decimal::FixedDecimal;

/// Largest lookback window in samples
pub const MAX_WINDOW: usize = kiln_core::config::MAX_LOOKBACK_SAMPLES as usize;

/// Time-stamped event history, index 0 most recent
///
/// Used for relay peaks (time, process value) and relay steps
/// (time, integrated process value since the step).
#[derive(Debug, Clone, Copy)]
pub struct EventHistory<const N: usize> {
    times: [u32; N],
    values: [f64; N],
}

impl<const N: usize> Default for EventHistory<N> {
    fn default() -> Self {
        Self {
            times: [0; N],
            values: [0.0; N],
        }
    }
}

impl<const N: usize> EventHistory<N> {
    /// Clear all slots and stamp slot 0 with `now_ms`
    pub fn reset(&mut self, now_ms: u32) {
        *self = Self::default();
        self.times[0] = now_ms;
    }

    /// Move every entry one slot older, dropping the oldest
    ///
    /// Slot 0 keeps its previous contents until overwritten.
    pub fn shift(&mut self) {
        for i in (1..N).rev() {
            self.times[i] = self.times[i - 1];
            self.values[i] = self.values[i - 1];
        }
    }

    /// Overwrite the most recent entry
    pub fn set_latest(&mut self, time_ms: u32, value: f64) {
        self.times[0] = time_ms;
        self.values[0] = value;
    }

    /// Add to the value of the most recent entry
    pub fn accumulate(&mut self, value: f64) {
        self.values[0] += value;
    }

    /// Time of the entry `age` slots back
    pub fn time(&self, age: usize) -> u32 {
        self.times[age]
    }

    /// Value of the entry `age` slots back
    pub fn value(&self, age: usize) -> f64 {
        self.values[age]
    }
}

/// De-trended process values over the lookback window
///
/// Holds one slot more than the window so that the value leaving the window
/// is still available while the extremes are recomputed. Values are kept in
/// thousandths so that re-referencing a flat input leaves it exactly flat.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: [FixedDecimal<3>; MAX_WINDOW + 1],
    /// Window length in samples (1..=MAX_WINDOW)
    len: usize,
    /// Samples stored since the last restart, saturating at `len`
    count: usize,
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new(MAX_WINDOW)
    }
}

impl SampleWindow {
    /// Create an empty window of `len` samples (clamped to 1..=MAX_WINDOW)
    pub fn new(len: usize) -> Self {
        Self {
            samples: [FixedDecimal::ZERO; MAX_WINDOW + 1],
            len: len.clamp(1, MAX_WINDOW),
            count: 0,
        }
    }

    /// Window length in samples
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if no sample has been stored since the last restart
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Check if the window has been filled since the last restart
    pub fn is_full(&self) -> bool {
        self.count >= self.len
    }

    /// Forget stored samples, keeping the length
    pub fn restart(&mut self) {
        self.count = 0;
    }

    /// Store a sample while the window is filling
    ///
    /// Returns `false` without storing once the window is full; from then
    /// on samples go through [`SampleWindow::slide`].
    pub fn fill(&mut self, value: FixedDecimal<3>) -> bool {
        if self.count >= self.len {
            return false;
        }
        self.count += 1;
        self.samples[self.len - self.count] = value;
        true
    }

    /// Slide the window by one sample
    ///
    /// Returns the extremes of the window before the slide as `(max, min)`.
    /// Every stored sample is re-referenced by subtracting `offset_change`;
    /// `value` enters slot 0 re-referenced the same way.
    pub fn slide(
        &mut self,
        value: FixedDecimal<3>,
        offset_change: FixedDecimal<3>,
    ) -> (FixedDecimal<3>, FixedDecimal<3>) {
        let mut max = self.samples[0];
        let mut min = self.samples[0];
        for i in (0..self.len).rev() {
            let v = self.samples[i];
            if v > max {
                max = v;
            }
            if v < min {
                min = v;
            }
            self.samples[i + 1] = v - offset_change;
        }
        self.samples[0] = value - offset_change;
        (max, min)
    }

    /// Sample `age` slots back (0 is the newest)
    pub fn get(&self, age: usize) -> Option<FixedDecimal<3>> {
        if age < self.count.min(self.len) || (self.is_full() && age <= self.len) {
            Some(self.samples[age])
        } else {
            None
        }
    }
}
