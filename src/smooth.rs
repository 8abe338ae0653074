//! Temporal smoothing of keypoints over the most recent frames.

use crate::{
    error::{ensure, Error},
    pose::{Keypoint, PoseKeypoints, NUM_KEYPOINTS},
};
use std::collections::VecDeque;

/// Number of snapshots kept in the history buffer.
pub const HISTORY_CAPACITY: usize = 5;
pub const DEFAULT_WINDOW: usize = 3;
/// Snapshots required before any smoothed output is produced.
pub const MIN_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, structopt::StructOpt)]
pub struct SmoothingConfig {
    /// Number of most recent frames averaged per keypoint.
    #[structopt(long = "smoothing-window", default_value = "3")]
    pub window: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
        }
    }
}

impl SmoothingConfig {
    pub fn validate(&self) -> Result<(), Error> {
        ensure((1..=HISTORY_CAPACITY).contains(&self.window), || {
            format!(
                "smoothing window must lie in [1, {}], got {}",
                HISTORY_CAPACITY, self.window
            )
        })
    }
}

/// Bounded history of keypoint snapshots; the oldest is dropped on overflow.
#[derive(Debug, Clone)]
pub struct Smoother {
    window: usize,
    history: VecDeque<PoseKeypoints>,
}

impl Smoother {
    pub fn new(config: SmoothingConfig) -> Self {
        Self {
            window: config.window.clamp(1, HISTORY_CAPACITY),
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    pub fn push(&mut self, keypoints: PoseKeypoints) {
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(keypoints);
    }

    /// Per-keypoint mean of the last `window` snapshots (fewer while the
    /// history is still shorter than `window`), or `None` until
    /// [`MIN_SAMPLES`] have been pushed.
    pub fn smooth(&self) -> Option<PoseKeypoints> {
        if self.history.len() < MIN_SAMPLES {
            return None;
        }
        let count = self.window.min(self.history.len());

        let mut sums = [Keypoint::default(); NUM_KEYPOINTS];
        for snapshot in self.history.iter().rev().take(count) {
            for (sum, point) in sums.iter_mut().zip(snapshot.points().iter()) {
                sum.x += point.x;
                sum.y += point.y;
                sum.confidence += point.confidence;
            }
        }

        let n = count as f32;
        Some(PoseKeypoints::new(sums).map(|sum| Keypoint {
            x: sum.x / n,
            y: sum.y / n,
            confidence: sum.confidence / n,
        }))
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::KeypointKind;
    use assert_approx_eq::assert_approx_eq;

    fn uniform(value: f32) -> PoseKeypoints {
        PoseKeypoints::new([Keypoint::new(value, value, value); NUM_KEYPOINTS])
    }

    #[test]
    fn defaults_match_cli() {
        use structopt::StructOpt;
        assert_eq!(SmoothingConfig::from_iter(&["test"]), SmoothingConfig::default());
    }

    #[test]
    fn window_is_validated() {
        assert!(SmoothingConfig { window: 0 }.validate().is_err());
        assert!(SmoothingConfig { window: 6 }.validate().is_err());
        assert!(SmoothingConfig { window: 5 }.validate().is_ok());
    }

    #[test]
    fn absent_until_three_samples() {
        let mut smoother = Smoother::new(SmoothingConfig::default());
        smoother.push(uniform(0.5));
        assert!(smoother.smooth().is_none());
        smoother.push(uniform(0.5));
        assert!(smoother.smooth().is_none());
        smoother.push(uniform(0.5));
        assert!(smoother.smooth().is_some());
    }

    #[test]
    fn identical_samples_average_to_themselves() {
        let mut smoother = Smoother::new(SmoothingConfig::default());
        let sample = uniform(0.25);
        for _ in 0..3 {
            smoother.push(sample);
        }
        assert_eq!(smoother.smooth(), Some(sample));
    }

    #[test]
    fn averages_only_the_most_recent_window() {
        let mut smoother = Smoother::new(SmoothingConfig::default());
        for &value in &[0.9, 0.9, 0.1, 0.2, 0.3] {
            smoother.push(uniform(value));
        }
        let smoothed = smoother.smooth().unwrap();
        for (_, point) in smoothed.iter() {
            assert_approx_eq!(point.x, 0.2);
            assert_approx_eq!(point.y, 0.2);
            assert_approx_eq!(point.confidence, 0.2);
        }
    }

    #[test]
    fn history_is_bounded() {
        let mut smoother = Smoother::new(SmoothingConfig::default());
        for i in 0..12 {
            smoother.push(uniform(i as f32 / 12.0));
        }
        assert_eq!(smoother.len(), HISTORY_CAPACITY);
    }

    #[test]
    fn reset_restarts_warm_up() {
        let mut smoother = Smoother::new(SmoothingConfig::default());
        for _ in 0..4 {
            smoother.push(uniform(0.5));
        }
        smoother.reset();
        assert!(smoother.is_empty());
        smoother.push(uniform(0.5));
        assert!(smoother.smooth().is_none());
    }

    #[test]
    fn window_of_one_follows_latest_after_warm_up() {
        let mut smoother = Smoother::new(SmoothingConfig { window: 1 });
        smoother.push(uniform(0.1));
        assert!(smoother.smooth().is_none());
        smoother.push(uniform(0.3));
        assert!(smoother.smooth().is_none());
        smoother.push(uniform(0.7));
        assert_eq!(smoother.smooth(), Some(uniform(0.7)));
    }

    mod wide_window {
        use super::*;

        fn smoother(values: &[f32]) -> Smoother {
            let mut smoother = Smoother::new(SmoothingConfig { window: 5 });
            for &value in values {
                smoother.push(uniform(value));
            }
            smoother
        }

        #[test]
        fn present_after_three_samples() {
            assert!(smoother(&[0.1, 0.2]).smooth().is_none());
            let smoothed = smoother(&[0.1, 0.2, 0.6]).smooth().unwrap();
            assert_approx_eq!(smoothed[KeypointKind::Nose].x, 0.3);
        }

        #[test]
        fn averages_every_sample_until_full() {
            let smoothed = smoother(&[0.1, 0.2, 0.3, 0.6]).smooth().unwrap();
            assert_approx_eq!(smoothed[KeypointKind::Nose].confidence, 0.3);
            let smoothed = smoother(&[0.9, 0.1, 0.2, 0.3, 0.6, 0.3]).smooth().unwrap();
            assert_approx_eq!(smoothed[KeypointKind::Nose].y, 0.3);
        }
    }
}
