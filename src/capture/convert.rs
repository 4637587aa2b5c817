//! YUV 4:2:0 to base64 JPEG conversion for event keyframes

use std::time::Instant;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use tracing::instrument;

use super::frame::Yuv420Layout;
use crate::error::{BridgeError, Result};

/// Convert a planar YUV 4:2:0 buffer into a base64 encoded JPEG.
///
/// `quality` follows JPEG conventions (higher = larger/better) and is
/// clamped to 1..=100.
#[instrument(skip(data), fields(len = data.len()))]
pub fn yuv420_to_base64_jpeg(data: &[u8], width: u32, height: u32, quality: u8) -> Result<String> {
    let started = Instant::now();

    let rgb = yuv420_to_rgb(data, width, height)?;
    let jpeg = encode_jpeg(&rgb, quality)?;
    let encoded = STANDARD.encode(jpeg);

    metrics::histogram!("bridge_convert_time_us").record(started.elapsed().as_micros() as f64);
    Ok(encoded)
}

/// BT.601 conversion of every pixel, chroma upsampled per 2x2 block
pub fn yuv420_to_rgb(data: &[u8], width: u32, height: u32) -> Result<RgbImage> {
    let layout = match Yuv420Layout::new(width, height) {
        Ok(layout) => layout,
        // Larger than addressable memory, so no buffer can match
        Err(BridgeError::InvalidDimensions { .. }) if width > 0 && height > 0 => {
            return Err(BridgeError::InvalidFrameSize {
                expected: usize::MAX,
                actual: data.len(),
            });
        }
        Err(e) => return Err(e),
    };

    let expected = layout.frame_size();
    if data.len() != expected {
        return Err(BridgeError::InvalidFrameSize {
            expected,
            actual: data.len(),
        });
    }

    let u_end = layout.v_offset();
    let v_end = layout.frame_size();
    let mut rgb = Vec::with_capacity(layout.luma_size * 3);

    for y in 0..layout.height {
        for x in 0..layout.width {
            let y_index = y * layout.width + x;
            let chroma = layout.chroma_index(x, y);
            let u_index = layout.u_offset() + chroma;
            let v_index = layout.v_offset() + chroma;

            // Odd dimensions leave the last row/column without a chroma sample
            if y_index >= layout.luma_size {
                return Err(BridgeError::IndexOutOfRange {
                    index: y_index,
                    len: layout.luma_size,
                });
            }
            if u_index >= u_end {
                return Err(BridgeError::IndexOutOfRange {
                    index: u_index,
                    len: u_end,
                });
            }
            if v_index >= v_end {
                return Err(BridgeError::IndexOutOfRange {
                    index: v_index,
                    len: v_end,
                });
            }

            rgb.extend_from_slice(&bt601_to_rgb(data[y_index], data[u_index], data[v_index]));
        }
    }

    RgbImage::from_raw(width, height, rgb).ok_or(BridgeError::InvalidFrameSize {
        expected,
        actual: data.len(),
    })
}

/// Integer BT.601 (studio swing) YUV to RGB
#[inline]
pub fn bt601_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = i32::from(y) - 16;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;

    [
        clip((298 * c + 409 * e + 128) >> 8),
        clip((298 * c - 100 * d - 208 * e + 128) >> 8),
        clip((298 * c + 516 * d + 128) >> 8),
    ]
}

#[inline]
fn clip(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
    image.write_with_encoder(encoder)?;
    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_frame(width: usize, height: usize, luma: u8, chroma: u8) -> Vec<u8> {
        let luma_size = width * height;
        let mut data = vec![luma; luma_size];
        data.extend(std::iter::repeat(chroma).take(2 * (luma_size / 4)));
        data
    }

    fn decode(encoded: &str) -> image::RgbImage {
        let jpeg = STANDARD.decode(encoded).unwrap();
        image::load_from_memory(&jpeg).unwrap().to_rgb8()
    }

    #[test]
    fn bt601_reference_points() {
        assert_eq!(bt601_to_rgb(16, 128, 128), [0, 0, 0]);
        assert_eq!(bt601_to_rgb(235, 128, 128), [255, 255, 255]);
        assert_eq!(bt601_to_rgb(128, 128, 128), [130, 130, 130]);
        assert_eq!(bt601_to_rgb(81, 90, 240), [255, 0, 0]);
    }

    #[test]
    fn mid_gray_4x4_at_every_quality() {
        let data = uniform_frame(4, 4, 128, 128);
        assert_eq!(data.len(), 24);

        let rgb = yuv420_to_rgb(&data, 4, 4).unwrap();
        assert!(rgb.pixels().all(|p| p.0 == [130, 130, 130]));

        for quality in [1u8, 25, 50, 75, 100] {
            let encoded = yuv420_to_base64_jpeg(&data, 4, 4, quality).unwrap();
            assert!(!encoded.is_empty());

            let decoded = decode(&encoded);
            assert_eq!(decoded.dimensions(), (4, 4));
            for pixel in decoded.pixels() {
                for channel in pixel.0 {
                    assert!(
                        (i32::from(channel) - 130).abs() <= 4,
                        "quality {quality}: channel {channel} is not mid-gray"
                    );
                }
            }
        }
    }

    #[test]
    fn decoded_dimensions_match_source() {
        let data = uniform_frame(32, 16, 90, 128);
        let encoded = yuv420_to_base64_jpeg(&data, 32, 16, 50).unwrap();
        assert_eq!(decode(&encoded).dimensions(), (32, 16));
    }

    #[test]
    fn wrong_size_is_rejected() {
        let mut data = uniform_frame(4, 4, 128, 128);
        data.pop();
        match yuv420_to_base64_jpeg(&data, 4, 4, 50) {
            Err(BridgeError::InvalidFrameSize { expected, actual }) => {
                assert_eq!(expected, 24);
                assert_eq!(actual, 23);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        // A packed RGB buffer is not a YUV420 frame
        assert!(matches!(
            yuv420_to_rgb(&vec![0u8; 4 * 4 * 3], 4, 4),
            Err(BridgeError::InvalidFrameSize { .. })
        ));
    }

    #[test]
    fn unaddressable_dimensions_are_a_size_mismatch() {
        let data = uniform_frame(4, 4, 128, 128);
        assert!(matches!(
            yuv420_to_base64_jpeg(&data, u32::MAX, u32::MAX, 50),
            Err(BridgeError::InvalidFrameSize { actual: 24, .. })
        ));
    }

    #[test]
    fn odd_dimensions_hit_the_index_guard() {
        // 3x3: 9 luma + 2*2 chroma, but pixel (2,2) needs chroma sample 2
        let data = vec![128u8; 13];
        assert!(matches!(
            yuv420_to_rgb(&data, 3, 3),
            Err(BridgeError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn chroma_is_sampled_per_2x2_block() {
        // 4x2: two chroma samples per plane, left and right block
        let mut data = vec![128u8; 8];
        data.extend_from_slice(&[128, 128]); // U
        data.extend_from_slice(&[128, 240]); // V: right block is red-shifted

        let rgb = yuv420_to_rgb(&data, 4, 2).unwrap();
        let left = rgb.get_pixel(1, 1).0;
        let right = rgb.get_pixel(2, 0).0;

        assert_eq!(left, [130, 130, 130]);
        assert_eq!(right, bt601_to_rgb(128, 128, 240));
        assert_eq!(rgb.get_pixel(3, 1).0, right);
        assert!(right[0] > left[0]);
    }
}
