use crate::{
    convert,
    error::{ensure, Error, Stage},
    executor::ModelInput,
    frame::{Frame, PixelFormat},
    resample::CropRegion,
};
use ndarray::Array3;
use std::{borrow::Cow, fmt, str::FromStr, time::Duration};

mod accelerated;
mod software;

pub use accelerated::AcceleratedPreprocessor;
pub use software::SoftwarePreprocessor;

pub const CHANNELS: usize = 3;
pub const DEFAULT_INPUT_SIZE: u32 = 192;
const MAX_INPUT_SIZE: u32 = 4096;

/// Turns a camera frame into a fixed-size model input.
pub trait Preprocessor {
    fn preprocess(
        &mut self,
        frame: &Frame<'_>,
        config: &PreprocessingConfig,
    ) -> Result<PreprocessedBuffer, Error>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Uint8,
    Float32,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uint8" | "u8" => Ok(Self::Uint8),
            "float32" | "f32" => Ok(Self::Float32),
            other => Err(format!("unknown output format {:?}, expected uint8 or float32", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint8 => f.write_str("uint8"),
            Self::Float32 => f.write_str("float32"),
        }
    }
}

/// Which implementation performs the crop and resize.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Strategy {
    Software,
    Accelerated,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "software" => Ok(Self::Software),
            "accelerated" => Ok(Self::Accelerated),
            other => Err(format!(
                "unknown preprocessing strategy {:?}, expected software or accelerated",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, structopt::StructOpt)]
pub struct PreprocessingConfig {
    /// Side length of the square model input.
    #[structopt(long, default_value = "192")]
    pub input_size: u32,
    /// Center-crop to a square before resizing instead of stretching.
    #[structopt(long, parse(try_from_str), default_value = "true")]
    pub maintain_aspect_ratio: bool,
    /// Element type of the model input: uint8 or float32.
    #[structopt(long, default_value = "float32")]
    pub output_format: OutputFormat,
    /// Scale float32 output into [0, 1]; ignored for uint8 output.
    #[structopt(long, parse(try_from_str), default_value = "true")]
    pub normalize_values: bool,
    /// Resize implementation: software or accelerated.
    #[structopt(long, default_value = "software")]
    pub strategy: Strategy,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            maintain_aspect_ratio: true,
            output_format: OutputFormat::Float32,
            normalize_values: true,
            strategy: Strategy::Software,
        }
    }
}

impl PreprocessingConfig {
    pub fn validate(&self) -> Result<(), Error> {
        ensure(
            (1..=MAX_INPUT_SIZE).contains(&self.input_size),
            || {
                format!(
                    "input size must lie in [1, {}], got {}",
                    MAX_INPUT_SIZE, self.input_size
                )
            },
        )
    }
}

/// Pixel data laid out as `[height, width, channels]`.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    U8(Array3<u8>),
    F32(Array3<f32>),
}

impl TensorData {
    pub fn as_input(&self) -> ModelInput<'_> {
        match self {
            Self::U8(data) => ModelInput::U8(data.view()),
            Self::F32(data) => ModelInput::F32(data.view()),
        }
    }

    pub fn format(&self) -> OutputFormat {
        match self {
            Self::U8(_) => OutputFormat::Uint8,
            Self::F32(_) => OutputFormat::Float32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::U8(data) => data.len(),
            Self::F32(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A model-ready frame, alive for a single pipeline tick.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedBuffer {
    pub data: TensorData,
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub processing_time: Duration,
}

impl PreprocessedBuffer {
    pub fn summary(&self) -> BufferSummary {
        BufferSummary {
            width: self.width,
            height: self.height,
            channels: self.channels,
            format: Some(self.data.format()),
            processing_time: self.processing_time,
        }
    }
}

/// Shape and timing of a [`PreprocessedBuffer`], without the pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BufferSummary {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub format: Option<OutputFormat>,
    pub processing_time: Duration,
}

pub enum Preprocess {
    Software(SoftwarePreprocessor),
    Accelerated(AcceleratedPreprocessor),
}

impl Preprocess {
    pub fn from_config(config: &PreprocessingConfig) -> Self {
        match config.strategy {
            Strategy::Software => Self::Software(SoftwarePreprocessor),
            Strategy::Accelerated => Self::Accelerated(AcceleratedPreprocessor::new()),
        }
    }
}

impl Preprocessor for Preprocess {
    fn preprocess(
        &mut self,
        frame: &Frame<'_>,
        config: &PreprocessingConfig,
    ) -> Result<PreprocessedBuffer, Error> {
        match self {
            Self::Software(p) => p.preprocess(frame, config),
            Self::Accelerated(p) => p.preprocess(frame, config),
        }
    }
}

/// Validate the frame against its declared format and return its dimensions.
fn check_frame(frame: &Frame<'_>) -> Result<(usize, usize), Error> {
    let (width, height) = frame.dims();
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }
    let expected = frame
        .pixel_format
        .min_len(width, height)
        .ok_or_else(|| Error::UnsupportedFormat(frame.pixel_format.clone()))?;
    if frame.bytes.is_empty() {
        return Err(Error::EmptyBuffer);
    }
    if frame.bytes.len() < expected {
        return Err(Error::BufferTooSmall {
            expected,
            actual: frame.bytes.len(),
        });
    }
    Ok((width, height))
}

/// Interleaved RGB pixels of a validated frame.
fn rgb_pixels<'a>(frame: &Frame<'a>, width: usize, height: usize) -> Result<Cow<'a, [u8]>, Error> {
    match frame.pixel_format {
        PixelFormat::Yuv420 => convert::yuv420_to_rgb(frame.bytes, width, height)
            .map(Cow::Owned)
            .map_err(|e| e.at(Stage::ColorConversion)),
        PixelFormat::Rgb => Ok(Cow::Borrowed(&frame.bytes[..width * height * CHANNELS])),
        PixelFormat::Other(_) => {
            Err(Error::UnsupportedFormat(frame.pixel_format.clone()).at(Stage::FormatCheck))
        }
    }
}

/// Decode a frame into RGB and pick the region to sample from.
fn prepare<'a>(
    frame: &Frame<'a>,
    config: &PreprocessingConfig,
) -> Result<(Cow<'a, [u8]>, usize, usize, CropRegion), Error> {
    let (width, height) = check_frame(frame).map_err(|e| e.at(Stage::FormatCheck))?;
    let rgb = rgb_pixels(frame, width, height)?;
    let crop = if config.maintain_aspect_ratio {
        CropRegion::centered_square(width, height)
    } else {
        CropRegion::full(width, height)
    };
    crop.check_within(width, height)
        .map_err(|e| e.at(Stage::Crop))?;
    Ok((rgb, width, height, crop))
}

/// Shape resized RGB into the configured output tensor.
fn finish(
    rgb: Vec<u8>,
    config: &PreprocessingConfig,
    processing_time: Duration,
) -> Result<PreprocessedBuffer, Error> {
    let size = config.input_size as usize;
    let len = rgb.len();
    let pixels = Array3::from_shape_vec((size, size, CHANNELS), rgb)
        .map_err(|e| Error::Shape(len, e).at(Stage::Normalization))?;
    let data = match config.output_format {
        OutputFormat::Uint8 => TensorData::U8(pixels),
        OutputFormat::Float32 if config.normalize_values => {
            TensorData::F32(pixels.mapv(|v| f32::from(v) / 255.0))
        }
        OutputFormat::Float32 => TensorData::F32(pixels.mapv(f32::from)),
    };
    Ok(PreprocessedBuffer {
        data,
        width: size,
        height: size,
        channels: CHANNELS,
        processing_time,
    })
}
