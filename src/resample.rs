//! Center cropping and nearest-neighbour resampling of interleaved RGB.

use crate::error::Error;

const CHANNELS: usize = 3;

/// A rectangular region of a frame, in pixels.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CropRegion {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl CropRegion {
    /// The whole `width` x `height` frame.
    pub fn full(width: usize, height: usize) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// The largest square centered in a `width` x `height` frame.
    ///
    /// Landscape frames are cropped width-wise, portrait frames height-wise,
    /// and square frames are left untouched.
    pub fn centered_square(width: usize, height: usize) -> Self {
        if width > height {
            Self {
                x: (width - height) / 2,
                y: 0,
                width: height,
                height,
            }
        } else if height > width {
            Self {
                x: 0,
                y: (height - width) / 2,
                width,
                height: width,
            }
        } else {
            Self::full(width, height)
        }
    }

    pub fn is_full(&self, width: usize, height: usize) -> bool {
        *self == Self::full(width, height)
    }

    pub(crate) fn check_within(&self, frame_width: usize, frame_height: usize) -> Result<(), Error> {
        if self.width == 0
            || self.height == 0
            || self.x + self.width > frame_width
            || self.y + self.height > frame_height
        {
            return Err(Error::CropOutOfBounds {
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
                frame_width,
                frame_height,
            });
        }
        Ok(())
    }
}

fn check_dims(width: usize, height: usize) -> Result<(), Error> {
    if width == 0 || height == 0 {
        Err(Error::InvalidDimensions { width, height })
    } else {
        Ok(())
    }
}

/// Pick the source index for destination index `dst` along one axis.
#[inline]
fn nearest(dst: usize, src_len: usize, dst_len: usize) -> usize {
    ((dst * src_len) / dst_len).min(src_len - 1)
}

/// Resize interleaved RGB from `src_width` x `src_height` to `dst_width` x `dst_height`.
pub fn resize(
    rgb: &[u8],
    src_width: usize,
    src_height: usize,
    dst_width: usize,
    dst_height: usize,
) -> Result<Vec<u8>, Error> {
    resize_region(
        rgb,
        src_width,
        src_height,
        CropRegion::full(src_width, src_height),
        dst_width,
        dst_height,
    )
}

/// Resize the `crop` region of an interleaved RGB frame, fusing the crop into
/// the sampling pass.
pub fn resize_region(
    rgb: &[u8],
    src_width: usize,
    src_height: usize,
    crop: CropRegion,
    dst_width: usize,
    dst_height: usize,
) -> Result<Vec<u8>, Error> {
    check_dims(src_width, src_height)?;
    check_dims(dst_width, dst_height)?;
    if rgb.is_empty() {
        return Err(Error::EmptyBuffer);
    }
    let expected = src_width * src_height * CHANNELS;
    if rgb.len() < expected {
        return Err(Error::BufferTooSmall {
            expected,
            actual: rgb.len(),
        });
    }
    crop.check_within(src_width, src_height)?;

    let columns = (0..dst_width)
        .map(|dst_x| (crop.x + nearest(dst_x, crop.width, dst_width)) * CHANNELS)
        .collect::<Vec<_>>();

    let mut out = vec![0_u8; dst_width * dst_height * CHANNELS];
    for (dst_y, out_row) in out.chunks_exact_mut(dst_width * CHANNELS).enumerate() {
        let src_y = crop.y + nearest(dst_y, crop.height, dst_height);
        let src_row = &rgb[src_y * src_width * CHANNELS..(src_y + 1) * src_width * CHANNELS];
        for (pixel, &offset) in out_row.chunks_exact_mut(CHANNELS).zip(columns.iter()) {
            pixel.copy_from_slice(&src_row[offset..offset + CHANNELS]);
        }
    }
    Ok(out)
}
