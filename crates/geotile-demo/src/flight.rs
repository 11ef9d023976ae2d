//! Scripted descent toward a target and per-frame statistics.

use rustc_hash::FxHashMap;

/// Altitude schedule falling geometrically from `start` to `end` meters.
#[derive(Debug, Clone, Copy)]
pub struct Descent {
    start: f64,
    end: f64,
    frames: u32,
}

impl Descent {
    pub fn new(start: f64, end: f64, frames: u32) -> Self {
        Self {
            start: start.max(1.0),
            end: end.max(1.0),
            frames,
        }
    }

    /// Altitude at `frame`, clamped to the last frame.
    pub fn altitude(&self, frame: u32) -> f64 {
        if self.frames <= 1 {
            return self.end;
        }
        let t = frame.min(self.frames - 1) as f64 / (self.frames - 1) as f64;
        self.start * (self.end / self.start).powf(t)
    }
}

/// Drawn tiles counted by level.
#[derive(Debug, Default)]
pub struct LevelHistogram {
    counts: FxHashMap<u32, usize>,
}

impl LevelHistogram {
    pub fn record(&mut self, level: u32) {
        *self.counts.entry(level).or_default() += 1;
    }

    pub fn deepest(&self) -> Option<u32> {
        self.counts.keys().copied().max()
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// `level:count` pairs in level order.
    pub fn summary(&self) -> String {
        let mut levels: Vec<_> = self.counts.iter().collect();
        levels.sort_unstable_by_key(|(level, _)| **level);
        levels
            .into_iter()
            .map(|(level, count)| format!("{level}:{count}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descent_endpoints() {
        let descent = Descent::new(2.0e7, 5000.0, 240);
        assert!((descent.altitude(0) - 2.0e7).abs() < 1e-6);
        assert!((descent.altitude(239) - 5000.0).abs() < 1e-6);
        assert!((descent.altitude(1000) - 5000.0).abs() < 1e-6);
    }

    #[test]
    fn test_descent_is_monotonic() {
        let descent = Descent::new(2.0e7, 5000.0, 60);
        let altitudes: Vec<_> = (0..60).map(|f| descent.altitude(f)).collect();
        assert!(altitudes.windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn test_single_frame_goes_straight_to_end() {
        assert_eq!(Descent::new(100.0, 10.0, 1).altitude(0), 10.0);
    }

    #[test]
    fn test_histogram_summary() {
        let mut histogram = LevelHistogram::default();
        for level in [3, 1, 3, 2] {
            histogram.record(level);
        }
        assert_eq!(histogram.summary(), "1:1 2:1 3:2");
        assert_eq!(histogram.deepest(), Some(3));
        assert_eq!(histogram.total(), 4);
    }
}
