//! Deterministic `DeterministicRng` doubles.

use chronoweave_core::rng::DeterministicRng;

/// Always returns `min` for `next_u32_range` and `0.0` for `next_f64`, so
/// retry backoff is always the shortest delay the policy allows.
#[derive(Debug)]
pub struct MockRng;

impl DeterministicRng for MockRng {
    fn next_u32_range(&mut self, min: u32, _max: u32) -> u32 {
        min
    }

    fn next_f64(&mut self) -> f64 {
        0.0
    }
}

/// Replays scripted draws and records every range asked for.
///
/// Each draw is clamped into the requested range; once the script runs out
/// every draw returns the range minimum.
#[derive(Debug, Default)]
pub struct SequenceRng {
    values: Vec<u32>,
    ranges: Vec<(u32, u32)>,
}

impl SequenceRng {
    /// Replays `values` in order.
    #[must_use]
    pub fn new(values: Vec<u32>) -> Self {
        Self {
            values,
            ranges: Vec::new(),
        }
    }

    /// Every `(min, max)` requested so far, in order.
    #[must_use]
    pub fn ranges(&self) -> &[(u32, u32)] {
        &self.ranges
    }
}

impl DeterministicRng for SequenceRng {
    fn next_u32_range(&mut self, min: u32, max: u32) -> u32 {
        let draw = self.values.get(self.ranges.len()).copied().unwrap_or(min);
        self.ranges.push((min, max));
        draw.clamp(min, max.max(min))
    }

    fn next_f64(&mut self) -> f64 {
        0.0
    }
}
