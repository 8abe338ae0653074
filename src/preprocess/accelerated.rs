use super::{finish, prepare, PreprocessedBuffer, PreprocessingConfig, Preprocessor};
use crate::{
    error::{Error, Stage},
    frame::Frame,
    resample::CropRegion,
};
use fast_image_resize as fr;
use std::time::Instant;

/// Delegates crop and resize to `fast_image_resize`'s SIMD kernels.
///
/// YUV input is still converted by [`crate::convert`] first; the resizer
/// only understands interleaved pixel types.
pub struct AcceleratedPreprocessor {
    resizer: fr::Resizer,
}

impl AcceleratedPreprocessor {
    pub fn new() -> Self {
        Self {
            resizer: fr::Resizer::new(),
        }
    }

    fn resize(
        &mut self,
        rgb: &[u8],
        (width, height): (u32, u32),
        crop: CropRegion,
        size: u32,
    ) -> Result<Vec<u8>, Error> {
        let src = fr::images::ImageRef::new(width, height, rgb, fr::PixelType::U8x3)
            .map_err(Error::ResizeImage)?;
        let mut dst = fr::images::Image::new(size, size, fr::PixelType::U8x3);
        let options = fr::ResizeOptions::new()
            .resize_alg(fr::ResizeAlg::Nearest)
            .crop(
                crop.x as f64,
                crop.y as f64,
                crop.width as f64,
                crop.height as f64,
            );
        self.resizer
            .resize(&src, &mut dst, &options)
            .map_err(Error::AcceleratedResize)?;
        Ok(dst.buffer().to_vec())
    }
}

impl Default for AcceleratedPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor for AcceleratedPreprocessor {
    fn preprocess(
        &mut self,
        frame: &Frame<'_>,
        config: &PreprocessingConfig,
    ) -> Result<PreprocessedBuffer, Error> {
        let start = Instant::now();
        let (rgb, _, _, crop) = prepare(frame, config)?;
        let resized = self
            .resize(&rgb, (frame.width, frame.height), crop, config.input_size)
            .map_err(|e| e.at(Stage::Resize))?;
        finish(resized, config, start.elapsed())
    }
}
