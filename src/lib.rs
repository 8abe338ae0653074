//! Real-time single-person pose estimation pipeline: camera frames in,
//! MoveNet keypoints out.

pub mod convert;
pub mod error;
pub mod executor;
pub mod extract;
pub mod fixtures;
pub mod frame;
pub mod governor;
pub mod pipeline;
pub mod pose;
pub mod preprocess;
pub mod resample;
pub mod smooth;

pub use error::{BoxError, Error};
pub use executor::{ModelExecutor, ModelInput};
pub use extract::{KeypointExtractionConfig, PoseDetectionResult};
pub use frame::{Frame, PixelFormat};
pub use governor::{PipelineMetrics, SkipReason, ThroughputConfig};
pub use pipeline::{Pipeline, PipelineConfig, PipelineResult};
pub use pose::{Keypoint, KeypointKind, PoseKeypoints, ScreenKeypoint};
pub use preprocess::{OutputFormat, PreprocessingConfig, Strategy};
pub use smooth::SmoothingConfig;
