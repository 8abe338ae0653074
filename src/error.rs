use crate::frame::PixelFormat;

/// Opaque error returned by a model executor.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The preprocessing stage a failure originated in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Stage {
    FormatCheck,
    ColorConversion,
    Crop,
    Resize,
    Normalization,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::FormatCheck => "format check",
            Self::ColorConversion => "color conversion",
            Self::Crop => "crop",
            Self::Resize => "resize",
            Self::Normalization => "normalization",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid dimensions {width}x{height}: both must be positive")]
    InvalidDimensions { width: usize, height: usize },

    #[error("got empty pixel buffer")]
    EmptyBuffer,

    #[error("pixel buffer too small: expected at least {expected} bytes, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("crop region {width}x{height}+{x}+{y} does not fit a {frame_width}x{frame_height} frame")]
    CropOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        frame_width: usize,
        frame_height: usize,
    },

    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(PixelFormat),

    #[error("preprocessing failed during {stage}")]
    Preprocessing {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to shape {0} values into an array")]
    Shape(usize, #[source] ndarray::ShapeError),

    #[error("failed to wrap pixels for accelerated resize")]
    ResizeImage(#[source] fast_image_resize::ImageBufferError),

    #[error("accelerated resize failed")]
    AcceleratedResize(#[source] fast_image_resize::ResizeError),

    #[error("invalid model output tensor: expected {expected} values, got {actual}")]
    InvalidTensorShape { expected: usize, actual: usize },

    #[error("model executor failed")]
    Executor(#[source] BoxError),

    #[error("model executor returned no output tensors")]
    NoExecutorOutputs,

    #[error("failed to convert usize value to keypoint kind: {0}")]
    ConvertUSizeToKeypointKind(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Attribute this error to a preprocessing stage.
    pub(crate) fn at(self, stage: Stage) -> Self {
        match self {
            already @ Self::Preprocessing { .. } => already,
            other => Self::Preprocessing {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Render the error and all of its sources as `outer: inner: ...`.
    pub fn chain(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

/// Fail with [`Error::InvalidConfig`] unless `condition` holds.
pub(crate) fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), Error> {
    if condition {
        Ok(())
    } else {
        Err(Error::InvalidConfig(message()))
    }
}
