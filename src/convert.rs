//! Planar YUV 4:2:0 to interleaved RGB conversion (ITU-R BT.601, full range).

use crate::error::Error;

const NEUTRAL_CHROMA: f32 = 128.0;

#[inline]
fn to_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Convert a single pixel with the BT.601 matrix.
#[inline]
pub(crate) fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = f32::from(y);
    let d = f32::from(u) - NEUTRAL_CHROMA;
    let e = f32::from(v) - NEUTRAL_CHROMA;
    [
        to_channel(y + 1.402 * e),
        to_channel(y - 0.344 * d - 0.714 * e),
        to_channel(y + 1.772 * d),
    ]
}

/// Convert a planar YUV 4:2:0 buffer into `width * height * 3` bytes of RGB.
///
/// Each 2x2 block of luma samples shares one U and one V sample. With odd
/// dimensions the trailing column reuses the last chroma sample of its row,
/// and lookups past the end of a chroma plane reuse its last sample.
pub fn yuv420_to_rgb(yuv: &[u8], width: usize, height: usize) -> Result<Vec<u8>, Error> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }
    if yuv.is_empty() {
        return Err(Error::EmptyBuffer);
    }

    let luma_len = width * height;
    let chroma_len = luma_len / 4;
    let expected = luma_len + 2 * chroma_len;
    if yuv.len() < expected {
        return Err(Error::BufferTooSmall {
            expected,
            actual: yuv.len(),
        });
    }

    let (luma, chroma) = yuv.split_at(luma_len);
    let (u_plane, rest) = chroma.split_at(chroma_len);
    let v_plane = &rest[..chroma_len];
    let chroma_width = (width / 2).max(1);

    let mut rgb = vec![0_u8; luma_len * 3];
    for (row, (luma_row, rgb_row)) in luma
        .chunks_exact(width)
        .zip(rgb.chunks_exact_mut(width * 3))
        .enumerate()
    {
        let chroma_row = (row / 2) * chroma_width;
        for (col, (&y, pixel)) in luma_row.iter().zip(rgb_row.chunks_exact_mut(3)).enumerate() {
            let (u, v) = match chroma_len.checked_sub(1) {
                Some(last) => {
                    let index = (chroma_row + (col / 2).min(chroma_width - 1)).min(last);
                    (u_plane[index], v_plane[index])
                }
                None => (NEUTRAL_CHROMA as u8, NEUTRAL_CHROMA as u8),
            };
            pixel.copy_from_slice(&yuv_to_rgb(y, u, v));
        }
    }

    Ok(rgb)
}

#[cfg(test)]
mod tests {
    use super::{yuv420_to_rgb, yuv_to_rgb};
    use crate::error::Error;

    /// Build a uniformly colored planar 4:2:0 buffer.
    fn flat_yuv(width: usize, height: usize, y: u8, u: u8, v: u8) -> Vec<u8> {
        let luma = width * height;
        let chroma = luma / 4;
        let mut buffer = vec![y; luma];
        buffer.extend(std::iter::repeat(u).take(chroma));
        buffer.extend(std::iter::repeat(v).take(chroma));
        buffer
    }

    fn expected_rgb(y: u8, u: u8, v: u8) -> [f64; 3] {
        let (y, d, e) = (f64::from(y), f64::from(u) - 128.0, f64::from(v) - 128.0);
        [
            (y + 1.402 * e).clamp(0.0, 255.0),
            (y - 0.344 * d - 0.714 * e).clamp(0.0, 255.0),
            (y + 1.772 * d).clamp(0.0, 255.0),
        ]
    }

    #[test]
    fn flat_color_within_rounding_bound() {
        for &(y, u, v) in &[(100, 90, 200), (128, 128, 128), (16, 240, 16), (235, 16, 240)] {
            let rgb = yuv420_to_rgb(&flat_yuv(8, 6, y, u, v), 8, 6).unwrap();
            let expected = expected_rgb(y, u, v);
            for pixel in rgb.chunks_exact(3) {
                for (&got, &want) in pixel.iter().zip(expected.iter()) {
                    assert!(
                        (f64::from(got) - want).abs() <= 2.0,
                        "got {} expected {} for yuv ({}, {}, {})",
                        got,
                        want,
                        y,
                        u,
                        v
                    );
                }
            }
        }
    }

    #[test]
    fn known_pixel_values() {
        assert_eq!(yuv_to_rgb(100, 90, 200), [201, 62, 33]);
        assert_eq!(yuv_to_rgb(128, 128, 128), [128, 128, 128]);
        assert_eq!(yuv_to_rgb(255, 255, 255), [255, 121, 255]);
        assert_eq!(yuv_to_rgb(0, 0, 0), [0, 135, 0]);
    }

    #[test]
    fn output_length() {
        let rgb = yuv420_to_rgb(&flat_yuv(6, 4, 50, 128, 128), 6, 4).unwrap();
        assert_eq!(rgb.len(), 6 * 4 * 3);
    }

    #[test]
    fn chroma_is_shared_per_block() {
        // 4x2 frame: two 2x2 blocks, left block red-ish, right block blue-ish
        let mut yuv = vec![128_u8; 8];
        yuv.extend_from_slice(&[128, 200]); // U
        yuv.extend_from_slice(&[200, 128]); // V
        let rgb = yuv420_to_rgb(&yuv, 4, 2).unwrap();
        let left = yuv_to_rgb(128, 128, 200);
        let right = yuv_to_rgb(128, 200, 128);
        for row in 0..2 {
            for col in 0..4 {
                let offset = (row * 4 + col) * 3;
                let expected = if col < 2 { left } else { right };
                assert_eq!(&rgb[offset..offset + 3], &expected[..]);
            }
        }
    }

    #[test]
    fn odd_dimensions_clamp_chroma() {
        // 3x3: chroma plane holds 2 samples per plane, lookups past it reuse the last
        let mut yuv = vec![128_u8; 9];
        yuv.extend_from_slice(&[128, 128]);
        yuv.extend_from_slice(&[128, 128]);
        let rgb = yuv420_to_rgb(&yuv, 3, 3).unwrap();
        assert_eq!(rgb.len(), 27);
        assert!(rgb.iter().all(|&c| c == 128));
    }

    #[test]
    fn odd_width_stays_on_its_chroma_row() {
        // 5x4: chroma rows are 2 samples wide, column 4 must not borrow from the next chroma row
        let mut yuv = vec![128_u8; 20];
        yuv.extend_from_slice(&[100, 110, 200, 210, 250]); // U
        yuv.extend_from_slice(&[128; 5]); // V
        let rgb = yuv420_to_rgb(&yuv, 5, 4).unwrap();
        let pixel = |row: usize, col: usize| {
            let offset = (row * 5 + col) * 3;
            [rgb[offset], rgb[offset + 1], rgb[offset + 2]]
        };
        assert_eq!(pixel(0, 4), yuv_to_rgb(128, 110, 128));
        assert_eq!(pixel(1, 4), yuv_to_rgb(128, 110, 128));
        assert_eq!(pixel(2, 4), yuv_to_rgb(128, 210, 128));
        assert_eq!(pixel(3, 3), yuv_to_rgb(128, 210, 128));
    }

    #[test]
    fn tiny_frame_without_chroma() {
        let rgb = yuv420_to_rgb(&[77], 1, 1).unwrap();
        assert_eq!(rgb, vec![77, 77, 77]);
    }

    #[test]
    fn rejects_invalid_input() {
        assert!(matches!(
            yuv420_to_rgb(&[0; 12], 0, 4),
            Err(Error::InvalidDimensions { .. })
        ));
        assert!(matches!(
            yuv420_to_rgb(&[0; 12], 4, 0),
            Err(Error::InvalidDimensions { .. })
        ));
        assert!(matches!(yuv420_to_rgb(&[], 4, 2), Err(Error::EmptyBuffer)));
        assert!(matches!(
            yuv420_to_rgb(&[0; 11], 4, 2),
            Err(Error::BufferTooSmall {
                expected: 12,
                actual: 11
            })
        ));
    }
}
