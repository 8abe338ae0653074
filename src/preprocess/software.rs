use super::{finish, prepare, PreprocessedBuffer, PreprocessingConfig, Preprocessor};
use crate::{
    error::{Error, Stage},
    frame::Frame,
    resample,
};
use std::time::Instant;

/// Converts, crops and resizes on the CPU with the crate's own resampler.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwarePreprocessor;

impl Preprocessor for SoftwarePreprocessor {
    fn preprocess(
        &mut self,
        frame: &Frame<'_>,
        config: &PreprocessingConfig,
    ) -> Result<PreprocessedBuffer, Error> {
        let start = Instant::now();
        let (rgb, width, height, crop) = prepare(frame, config)?;
        let size = config.input_size as usize;
        let resized = resample::resize_region(&rgb, width, height, crop, size, size)
            .map_err(|e| e.at(Stage::Resize))?;
        finish(resized, config, start.elapsed())
    }
}
