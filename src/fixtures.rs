//! Canned model outputs for replaying the pipeline without a model runtime.

use crate::{
    error::BoxError,
    executor::{ModelExecutor, ModelInput},
    extract::EXPECTED_OUTPUT_LEN,
};
use std::str::FromStr;

/// A person standing upright, facing the camera, every joint clearly visible.
#[rustfmt::skip]
pub const STANDING: [f32; EXPECTED_OUTPUT_LEN] = [
    // y     x     confidence
    0.15, 0.50, 0.95, // nose
    0.13, 0.52, 0.93, // left eye
    0.13, 0.48, 0.93, // right eye
    0.14, 0.55, 0.88, // left ear
    0.14, 0.45, 0.88, // right ear
    0.25, 0.60, 0.94, // left shoulder
    0.25, 0.40, 0.94, // right shoulder
    0.38, 0.63, 0.90, // left elbow
    0.38, 0.37, 0.90, // right elbow
    0.50, 0.64, 0.87, // left wrist
    0.50, 0.36, 0.87, // right wrist
    0.52, 0.56, 0.93, // left hip
    0.52, 0.44, 0.93, // right hip
    0.72, 0.56, 0.91, // left knee
    0.72, 0.44, 0.91, // right knee
    0.90, 0.56, 0.89, // left ankle
    0.90, 0.44, 0.89, // right ankle
];

/// A partially occluded, poorly lit subject: no confidence exceeds 0.5.
#[rustfmt::skip]
pub const LOW_CONFIDENCE: [f32; EXPECTED_OUTPUT_LEN] = [
    0.20, 0.48, 0.45,
    0.18, 0.50, 0.32,
    0.18, 0.46, 0.28,
    0.19, 0.53, 0.12,
    0.19, 0.43, 0.05,
    0.30, 0.58, 0.50,
    0.30, 0.38, 0.41,
    0.42, 0.61, 0.30,
    0.42, 0.35, 0.22,
    0.55, 0.62, 0.15,
    0.55, 0.34, 0.08,
    0.57, 0.55, 0.38,
    0.57, 0.43, 0.35,
    0.75, 0.55, 0.29,
    0.75, 0.43, 0.31,
    0.92, 0.55, 0.10,
    0.92, 0.43, 0.02,
];

/// Number of keypoints in `tensor` whose confidence is at least `threshold`.
pub fn count_at_or_above(tensor: &[f32], threshold: f32) -> usize {
    tensor
        .chunks_exact(3)
        .filter(|triplet| triplet[2] >= threshold)
        .count()
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Fixture {
    Standing,
    LowConfidence,
}

impl Fixture {
    pub fn tensor(self) -> &'static [f32] {
        match self {
            Self::Standing => &STANDING,
            Self::LowConfidence => &LOW_CONFIDENCE,
        }
    }
}

impl FromStr for Fixture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standing" => Ok(Self::Standing),
            "low-confidence" | "low_confidence" => Ok(Self::LowConfidence),
            other => Err(format!(
                "unknown fixture {:?}, expected one of: standing, low-confidence",
                other
            )),
        }
    }
}

/// Executor that answers every frame with the same output tensor.
#[derive(Debug, Clone)]
pub struct FixtureExecutor {
    tensor: Vec<f32>,
    runs: usize,
}

impl FixtureExecutor {
    pub fn new(tensor: &[f32]) -> Self {
        Self {
            tensor: tensor.to_vec(),
            runs: 0,
        }
    }

    pub fn runs(&self) -> usize {
        self.runs
    }
}

impl From<Fixture> for FixtureExecutor {
    fn from(fixture: Fixture) -> Self {
        Self::new(fixture.tensor())
    }
}

impl ModelExecutor for FixtureExecutor {
    fn run(&mut self, _input: ModelInput<'_>) -> Result<Vec<Vec<f32>>, BoxError> {
        self.runs += 1;
        Ok(vec![self.tensor.clone()])
    }
}
