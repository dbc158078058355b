// SPDX-License-Identifier: GPL-3.0-only

//! Still image encoding

use crate::constants::pipeline;
use crate::errors::PhotoError;
use image::{DynamicImage, RgbaImage};
use tracing::debug;

/// Encode an RGBA image as JPEG, dropping alpha
pub fn encode_jpeg(image: &RgbaImage) -> Result<Vec<u8>, PhotoError> {
    encode_jpeg_with_quality(image, pipeline::JPEG_QUALITY)
}

pub fn encode_jpeg_with_quality(image: &RgbaImage, quality: u8) -> Result<Vec<u8>, PhotoError> {
    let rgb = DynamicImage::ImageRgba8(image.clone()).into_rgb8();
    let mut buffer = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder
        .encode(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| PhotoError::EncodingFailed(format!("JPEG encoding failed: {}", e)))?;

    debug!(
        width = rgb.width(),
        height = rgb.height(),
        size = buffer.len(),
        "JPEG encoded"
    );
    Ok(buffer)
}

/// Decode encoded still bytes into a preview image
pub fn decode_preview(data: &[u8]) -> Result<RgbaImage, PhotoError> {
    image::load_from_memory(data)
        .map(|img| img.into_rgba8())
        .map_err(|e| PhotoError::EncodingFailed(format!("Preview decode failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_decodes_to_same_size() {
        let img = RgbaImage::from_pixel(16, 8, image::Rgba([200, 10, 10, 255]));
        let data = encode_jpeg(&img).unwrap();
        assert_eq!(&data[..2], &[0xFF, 0xD8]);

        let preview = decode_preview(&data).unwrap();
        assert_eq!(preview.dimensions(), (16, 8));
        assert!(preview.get_pixel(8, 4)[0] > 150);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(
            decode_preview(b"not an image"),
            Err(PhotoError::EncodingFailed(_))
        ));
    }
}
