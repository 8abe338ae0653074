use crate::{
    error::Error,
    executor::ModelExecutor,
    extract::{self, KeypointExtractionConfig, PoseDetectionResult},
    frame::Frame,
    governor::{Decision, Governor, PipelineMetrics, SkipReason, ThroughputConfig},
    pose::PoseKeypoints,
    preprocess::{BufferSummary, Preprocess, PreprocessingConfig, Preprocessor},
    smooth::{Smoother, SmoothingConfig},
};
use rand::rngs::StdRng;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Every knob of the pipeline, validated once by [`Pipeline::new`].
#[derive(Debug, Clone, Copy, Default, PartialEq, structopt::StructOpt)]
pub struct PipelineConfig {
    #[structopt(flatten)]
    pub preprocessing: PreprocessingConfig,
    #[structopt(flatten)]
    pub extraction: KeypointExtractionConfig,
    #[structopt(flatten)]
    pub throughput: ThroughputConfig,
    #[structopt(flatten)]
    pub smoothing: SmoothingConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), Error> {
        self.preprocessing.validate()?;
        self.extraction.validate()?;
        self.throughput.validate()?;
        self.smoothing.validate()
    }
}

/// Outcome of one pipeline tick.
///
/// Failed and skipped ticks carry zeroed sub-results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineResult {
    pub preprocessing: BufferSummary,
    pub pose_detection: PoseDetectionResult,
    /// Keypoints averaged over the smoothing window, once it has filled.
    pub smoothed: Option<PoseKeypoints>,
    pub total_processing_time: Duration,
    pub success: bool,
    /// Full cause chain of the failure, if any.
    pub error: Option<String>,
    pub skipped: Option<SkipReason>,
}

impl PipelineResult {
    fn skipped(reason: SkipReason, total_processing_time: Duration) -> Self {
        Self {
            total_processing_time,
            skipped: Some(reason),
            ..Default::default()
        }
    }

    fn failed(error: String, total_processing_time: Duration) -> Self {
        Self {
            total_processing_time,
            error: Some(error),
            ..Default::default()
        }
    }
}

/// Runs frames through preprocessing, the model, keypoint extraction and
/// smoothing, one frame at a time.
pub struct Pipeline<P, E> {
    config: PipelineConfig,
    preprocessor: P,
    executor: E,
    governor: Governor,
    smoother: Smoother,
}

impl<E> Pipeline<Preprocess, E>
where
    E: ModelExecutor,
{
    /// Build a pipeline whose preprocessor matches `config.preprocessing.strategy`.
    pub fn from_config(config: PipelineConfig, executor: E) -> Result<Self, Error> {
        let preprocessor = Preprocess::from_config(&config.preprocessing);
        Self::new(config, preprocessor, executor)
    }
}

impl<P, E> Pipeline<P, E>
where
    P: Preprocessor,
    E: ModelExecutor,
{
    pub fn new(config: PipelineConfig, preprocessor: P, executor: E) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config,
            preprocessor,
            executor,
            governor: Governor::new(config.throughput),
            smoother: Smoother::new(config.smoothing),
        })
    }

    /// Replace the governor's random source, for reproducible load shedding.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.governor = Governor::with_rng(self.config.throughput, rng);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn metrics(&self) -> PipelineMetrics {
        self.governor.metrics()
    }

    /// Drop all counters and smoothing history.
    pub fn reset_session(&mut self) {
        self.governor.reset();
        self.smoother.reset();
        info!(message = "session reset");
    }

    pub fn process(&mut self, frame: &Frame<'_>) -> PipelineResult {
        self.process_at(frame, Instant::now())
    }

    /// Process `frame` as if it arrived at `now`.
    ///
    /// Never fails: errors from any stage are reported in the result.
    #[instrument(
        name = "Pipeline::process",
        skip(self, frame),
        fields(width = frame.width, height = frame.height, timestamp = frame.timestamp),
        level = "debug"
    )]
    pub fn process_at(&mut self, frame: &Frame<'_>, now: Instant) -> PipelineResult {
        let start = Instant::now();

        if let Decision::Skip(reason) = self.governor.admit(frame.width, frame.height, now) {
            return PipelineResult::skipped(reason, start.elapsed());
        }

        match self.run(frame) {
            Ok((preprocessing, pose_detection)) => {
                self.smoother.push(pose_detection.keypoints);
                let total_processing_time = start.elapsed();
                self.governor.record_processed(now, total_processing_time);
                PipelineResult {
                    preprocessing,
                    pose_detection,
                    smoothed: self.smoother.smooth(),
                    total_processing_time,
                    success: true,
                    error: None,
                    skipped: None,
                }
            }
            Err(error) => {
                let total_processing_time = start.elapsed();
                let message = error.chain();
                warn!(message = "frame failed", error = %message);
                self.governor.record_failure(total_processing_time);
                PipelineResult::failed(message, total_processing_time)
            }
        }
    }

    fn run(&mut self, frame: &Frame<'_>) -> Result<(BufferSummary, PoseDetectionResult), Error> {
        let buffer = self
            .preprocessor
            .preprocess(frame, &self.config.preprocessing)?;
        let outputs = self
            .executor
            .run(buffer.data.as_input())
            .map_err(Error::Executor)?;
        let output = outputs.first().ok_or(Error::NoExecutorOutputs)?;
        let pose_detection = extract::extract(
            output,
            (frame.width, frame.height),
            &self.config.extraction,
        )?;
        Ok((buffer.summary(), pose_detection))
    }
}
