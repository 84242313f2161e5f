//! Photo compression applied before every upload.

use std::io::Cursor;

use image::{codecs::jpeg::JpegEncoder, GenericImageView, RgbImage};

use crate::{Error, Result};

/// Limits for a compressed photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionOptions {
    /// Longest edge of the output, in pixels.
    pub max_dimension: u32,
    /// Target size of the encoded JPEG.
    pub max_bytes: usize,
    /// First JPEG quality tried.
    pub initial_quality: u8,
    /// Quality floor; the result is returned even if still above `max_bytes`.
    pub min_quality: u8,
    /// Quality decrease per attempt.
    pub quality_step: u8,
}

impl CompressionOptions {
    pub const DEFAULT: Self = Self {
        max_dimension: 2048,
        max_bytes: 1024 * 1024,
        initial_quality: 85,
        min_quality: 40,
        quality_step: 10,
    };
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Encoded JPEG ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedPhoto {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// Decode `source`, downscale it to fit `max_dimension` and re-encode it as
/// JPEG, lowering quality step-wise until it fits `max_bytes`.
///
/// Images already within bounds are not upscaled.
pub fn compress_photo(source: &[u8], options: CompressionOptions) -> Result<CompressedPhoto> {
    if source.is_empty() {
        return Err(Error::Image("Photo bytes cannot be empty".to_string()));
    }
    if options.max_dimension == 0 || options.max_bytes == 0 {
        return Err(Error::Image(
            "Compression limits must be greater than zero".to_string(),
        ));
    }

    let decoded = image::load_from_memory(source)
        .map_err(|error| Error::Image(format!("Failed to decode photo: {error}")))?;

    let (source_width, source_height) = decoded.dimensions();
    let resized = if source_width <= options.max_dimension && source_height <= options.max_dimension
    {
        decoded
    } else {
        decoded.thumbnail(options.max_dimension, options.max_dimension)
    };
    // JPEG has no alpha channel
    let rgb = resized.to_rgb8();
    let (width, height) = rgb.dimensions();

    let min_quality = options.min_quality.clamp(1, 100);
    let step = options.quality_step.max(1);
    let mut quality = options.initial_quality.clamp(min_quality, 100);
    loop {
        let bytes = encode_jpeg(&rgb, quality)?;
        if bytes.len() <= options.max_bytes || quality <= min_quality {
            if bytes.len() > options.max_bytes {
                tracing::debug!(
                    size = bytes.len(),
                    max_bytes = options.max_bytes,
                    "Photo still above byte budget at minimum quality"
                );
            }
            return Ok(CompressedPhoto {
                bytes,
                width,
                height,
                quality,
            });
        }
        quality = quality.saturating_sub(step).max(min_quality);
    }
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut cursor, quality);
    encoder
        .encode_image(image)
        .map_err(|error| Error::Image(format!("Failed to encode JPEG: {error}")))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};

    /// A noisy PNG, so JPEG size depends on quality.
    pub(crate) fn source_png(width: u32, height: u32) -> Vec<u8> {
        let image = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_fn(width, height, |x, y| {
            let seed = x.wrapping_mul(31).wrapping_add(y.wrapping_mul(17)) ^ (x * y);
            Rgba([(seed % 251) as u8, (seed % 127) as u8, (seed % 61) as u8, 255])
        });

        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut cursor, ImageFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    #[test]
    fn downscales_to_max_dimension_preserving_ratio() {
        let result = compress_photo(
            &source_png(800, 400),
            CompressionOptions {
                max_dimension: 200,
                ..CompressionOptions::DEFAULT
            },
        )
        .unwrap();

        assert_eq!((result.width, result.height), (200, 100));
        assert_eq!(image::guess_format(&result.bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn small_images_are_not_upscaled() {
        let result = compress_photo(&source_png(64, 32), CompressionOptions::DEFAULT).unwrap();
        assert_eq!((result.width, result.height), (64, 32));
        assert_eq!(result.quality, CompressionOptions::DEFAULT.initial_quality);
    }

    #[test]
    fn lowers_quality_until_within_budget() {
        let source = source_png(300, 300);
        let generous = compress_photo(&source, CompressionOptions::DEFAULT).unwrap();

        let tight = compress_photo(
            &source,
            CompressionOptions {
                max_bytes: generous.bytes.len() - 1,
                ..CompressionOptions::DEFAULT
            },
        )
        .unwrap();

        assert!(tight.quality < generous.quality);
        assert!(tight.quality >= CompressionOptions::DEFAULT.min_quality);
    }

    #[test]
    fn stops_at_minimum_quality() {
        let result = compress_photo(
            &source_png(120, 120),
            CompressionOptions {
                max_bytes: 1,
                ..CompressionOptions::DEFAULT
            },
        )
        .unwrap();
        assert_eq!(result.quality, CompressionOptions::DEFAULT.min_quality);
    }

    #[test]
    fn rejects_undecodable_source() {
        let err = compress_photo(b"not-an-image", CompressionOptions::DEFAULT).unwrap_err();
        match err {
            Error::Image(message) => assert!(message.contains("decode")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
