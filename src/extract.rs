use crate::{
    error::{ensure, Error},
    pose::{
        constants::{CORE_JOINTS, CORE_JOINT_FLOOR},
        Keypoint, KeypointKind, PoseKeypoints, ScreenKeypoints, NUM_KEYPOINTS,
        VALUES_PER_KEYPOINT,
    },
};
use ndarray::ArrayView2;
use ordered_float::NotNan;
use std::time::{Duration, Instant};

/// Number of values in a single-pose model output tensor.
pub const EXPECTED_OUTPUT_LEN: usize = NUM_KEYPOINTS * VALUES_PER_KEYPOINT;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;
pub const DEFAULT_SCREEN_WIDTH: f32 = 1080.0;
pub const DEFAULT_SCREEN_HEIGHT: f32 = 1920.0;

#[derive(Debug, Clone, Copy, PartialEq, structopt::StructOpt)]
pub struct KeypointExtractionConfig {
    /// Minimum confidence for a keypoint to count as valid.
    #[structopt(long, default_value = "0.3")]
    pub confidence_threshold: f32,
    /// Width of the destination (screen) coordinate space.
    #[structopt(long, default_value = "1080")]
    pub screen_width: f32,
    /// Height of the destination (screen) coordinate space.
    #[structopt(long, default_value = "1920")]
    pub screen_height: f32,
}

impl Default for KeypointExtractionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            screen_width: DEFAULT_SCREEN_WIDTH,
            screen_height: DEFAULT_SCREEN_HEIGHT,
        }
    }
}

impl KeypointExtractionConfig {
    pub fn validate(&self) -> Result<(), Error> {
        ensure((0.0..=1.0).contains(&self.confidence_threshold), || {
            format!(
                "confidence threshold must lie in [0, 1], got {}",
                self.confidence_threshold
            )
        })?;
        ensure(
            self.screen_width > 0.0 && self.screen_height > 0.0,
            || {
                format!(
                    "screen dimensions must be positive, got {}x{}",
                    self.screen_width, self.screen_height
                )
            },
        )
    }
}

/// Decoded pose for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseDetectionResult {
    pub keypoints: PoseKeypoints,
    pub screen_keypoints: ScreenKeypoints,
    /// Mean confidence of the core joints that clear the inclusion floor.
    pub overall_confidence: f32,
    /// Number of keypoints at or above the configured confidence threshold.
    pub valid_keypoints: usize,
    pub processing_time: Duration,
    pub frame_width: u32,
    pub frame_height: u32,
}

/// Clamp a raw model value into `[0, 1]`, mapping NaN to 0.
#[inline]
fn unit(value: f32) -> f32 {
    NotNan::new(value).map_or(0.0, |value| value.into_inner().clamp(0.0, 1.0))
}

fn overall_confidence(keypoints: &PoseKeypoints) -> f32 {
    let (sum, count) = CORE_JOINTS
        .iter()
        .map(|&kind| keypoints[kind].confidence)
        .filter(|&confidence| confidence > CORE_JOINT_FLOOR)
        .fold((0.0_f32, 0_u16), |(sum, count), confidence| {
            (sum + confidence, count + 1)
        });
    if count == 0 {
        0.0
    } else {
        sum / f32::from(count)
    }
}

/// Decode a flat `[17 x (y, x, confidence)]` model output into keypoints.
///
/// The output length is a hard precondition: anything other than
/// [`EXPECTED_OUTPUT_LEN`] values is an [`Error::InvalidTensorShape`].
pub fn extract(
    output: &[f32],
    (frame_width, frame_height): (u32, u32),
    config: &KeypointExtractionConfig,
) -> Result<PoseDetectionResult, Error> {
    let start = Instant::now();
    if output.len() != EXPECTED_OUTPUT_LEN {
        return Err(Error::InvalidTensorShape {
            expected: EXPECTED_OUTPUT_LEN,
            actual: output.len(),
        });
    }

    let rows = ArrayView2::from_shape((NUM_KEYPOINTS, VALUES_PER_KEYPOINT), output)
        .map_err(|e| Error::Shape(output.len(), e))?;

    let mut keypoints = PoseKeypoints::default();
    for (index, row) in rows.outer_iter().enumerate() {
        keypoints[KeypointKind::from_idx(index)?] = Keypoint {
            y: unit(row[0]),
            x: unit(row[1]),
            confidence: unit(row[2]),
        };
    }

    let KeypointExtractionConfig {
        confidence_threshold,
        screen_width,
        screen_height,
    } = *config;

    Ok(PoseDetectionResult {
        screen_keypoints: keypoints.map(|point| point.to_screen(screen_width, screen_height)),
        overall_confidence: overall_confidence(&keypoints),
        valid_keypoints: keypoints
            .points()
            .iter()
            .filter(|point| point.is_valid(confidence_threshold))
            .count(),
        keypoints,
        processing_time: start.elapsed(),
        frame_width,
        frame_height,
    })
}
