use std::{convert::Infallible, fmt, str::FromStr};

/// Pixel layout of a camera frame as reported by the frame source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelFormat {
    /// Planar YUV 4:2:0: a full resolution Y plane followed by quarter
    /// resolution U and V planes.
    Yuv420,
    /// Interleaved 8-bit RGB.
    Rgb,
    /// Anything else the frame source may hand over.
    Other(String),
}

impl PixelFormat {
    /// Minimum number of bytes a `width` x `height` frame of this format occupies.
    pub fn min_len(&self, width: usize, height: usize) -> Option<usize> {
        let pixels = width * height;
        match self {
            Self::Yuv420 => Some(pixels + 2 * (pixels / 4)),
            Self::Rgb => Some(pixels * 3),
            Self::Other(_) => None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yuv420 => f.write_str("yuv420"),
            Self::Rgb => f.write_str("rgb"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

impl FromStr for PixelFormat {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "yuv420" | "i420" | "yuv420p" => Self::Yuv420,
            "rgb" | "rgb24" => Self::Rgb,
            _ => Self::Other(s.to_owned()),
        })
    }
}

/// A single camera frame, borrowed from the frame source for the duration
/// of one pipeline call.
#[derive(Debug, Clone)]
pub struct Frame<'a> {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    /// Capture timestamp in the frame source's clock.
    pub timestamp: i64,
    pub bytes: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn new(
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        timestamp: i64,
        bytes: &'a [u8],
    ) -> Self {
        Self {
            width,
            height,
            pixel_format,
            timestamp,
            bytes,
        }
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.width as usize, self.height as usize)
    }
}
