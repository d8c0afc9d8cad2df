//! Segment normalisation: `RgbImage` → base64 JPEG under the payload ceiling.
//!
//! Screenshots are photographic enough (gradients, hero images) that PNG
//! routinely blows through a 5 MiB base64 budget for a single 2 560 × 7 000
//! band. JPEG is lossy, so the quality is lowered step by step until the
//! payload fits: fidelity is traded for compliance, monotonically, and the
//! loop is bounded by the configured quality floor.

use crate::config::ImageLimits;
use crate::error::ImageValidationError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// MIME type of every image part sent to the model.
pub const IMAGE_MIME_TYPE: &str = "image/jpeg";

/// A segment ready to be embedded in a model request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedSegment {
    /// 1-based position of the segment, top to bottom.
    pub index: usize,
    pub width: u32,
    pub height: u32,
    /// JPEG quality that produced `data`.
    pub quality: u8,
    /// Base64 (standard alphabet, padded) JPEG bytes.
    pub data: String,
}

impl EncodedSegment {
    /// `data:` URI suitable for an `image_url` content part.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", IMAGE_MIME_TYPE, self.data)
    }
}

/// Encode one segment as JPEG, lowering quality until the base64 payload
/// fits `limits.max_base64_bytes`.
///
/// # Errors
/// * [`ImageValidationError::DimensionExceeded`] — immediately, without
///   encoding, when either side is `>= limits.max_dimension`
/// * [`ImageValidationError::TooLarge`] — every quality down to
///   `limits.min_quality` was tried and none fit
/// * [`ImageValidationError::Encode`] — the JPEG encoder failed
pub fn normalize_segment(
    img: &RgbImage,
    index: usize,
    limits: &ImageLimits,
) -> Result<EncodedSegment, ImageValidationError> {
    let (width, height) = img.dimensions();
    check_dimensions(width, height, index, limits)?;

    let (quality, data) = compress_adaptive(index, limits, |quality| encode_jpeg(img, quality))?;

    info!(
        "Slice {}: {}x{}, Quality: {}, Size: {:.2}MB",
        index,
        width,
        height,
        quality,
        data.len() as f64 / 1024.0 / 1024.0
    );

    Ok(EncodedSegment {
        index,
        width,
        height,
        quality,
        data,
    })
}

/// Reject segments the model cannot accept at any quality.
pub fn check_dimensions(
    width: u32,
    height: u32,
    index: usize,
    limits: &ImageLimits,
) -> Result<(), ImageValidationError> {
    if width >= limits.max_dimension || height >= limits.max_dimension {
        return Err(ImageValidationError::DimensionExceeded {
            index,
            width,
            height,
            max_dimension: limits.max_dimension,
        });
    }
    Ok(())
}

/// Walk the quality ladder, returning the first `(quality, base64)` whose
/// length fits the ceiling.
///
/// `encode` produces raw image bytes for a given quality. It is a parameter
/// so the ladder can be exercised without encoding real megapixel images.
pub fn compress_adaptive<F>(
    index: usize,
    limits: &ImageLimits,
    mut encode: F,
) -> Result<(u8, String), ImageValidationError>
where
    F: FnMut(u8) -> Result<Vec<u8>, image::ImageError>,
{
    let mut last_size = 0;

    for quality in limits.quality_ladder() {
        let raw = encode(quality).map_err(|e| ImageValidationError::Encode {
            index,
            quality,
            detail: e.to_string(),
        })?;
        let b64 = STANDARD.encode(&raw);

        if b64.len() <= limits.max_base64_bytes {
            return Ok((quality, b64));
        }

        debug!(
            "Slice {}: quality {} → {} bytes base64, over {} limit",
            index,
            quality,
            b64.len(),
            limits.max_base64_bytes
        );
        last_size = b64.len();
    }

    Err(ImageValidationError::TooLarge {
        index,
        min_quality: limits.min_quality,
        max_bytes: limits.max_base64_bytes,
        last_size,
    })
}

fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(img)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// base64 length of `n` raw bytes.
    fn b64_len(n: usize) -> usize {
        n.div_ceil(3) * 4
    }

    #[test]
    fn small_segment_fits_at_initial_quality() {
        let img = RgbImage::from_pixel(1280, 800, Rgb([240, 240, 240]));
        let seg = normalize_segment(&img, 1, &ImageLimits::default()).unwrap();
        assert_eq!(seg.quality, 85);
        assert_eq!((seg.width, seg.height), (1280, 800));
        assert!(seg.data.len() <= ImageLimits::default().max_base64_bytes);

        let jpeg = STANDARD.decode(&seg.data).expect("valid base64");
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "JPEG SOI marker");
    }

    #[test]
    fn data_uri_uses_jpeg_mime() {
        let seg = EncodedSegment {
            index: 1,
            width: 1,
            height: 1,
            quality: 85,
            data: "QUJD".into(),
        };
        assert_eq!(seg.data_uri(), "data:image/jpeg;base64,QUJD");
    }

    #[test]
    fn oversized_dimension_fails_without_encoding() {
        let limits = ImageLimits {
            max_dimension: 16,
            ..Default::default()
        };
        let img = RgbImage::new(16, 4);
        let err = normalize_segment(&img, 3, &limits).unwrap_err();
        assert_eq!(
            err,
            ImageValidationError::DimensionExceeded {
                index: 3,
                width: 16,
                height: 4,
                max_dimension: 16
            }
        );
    }

    #[test]
    fn height_at_limit_is_rejected() {
        let limits = ImageLimits::default();
        assert!(check_dimensions(100, 7990, 1, &limits).is_err());
        assert!(check_dimensions(7989, 7989, 1, &limits).is_ok());
    }

    #[test]
    fn ladder_stops_at_first_fitting_quality() {
        // raw size shrinks with quality; only q <= 40 fits under the ceiling
        let limits = ImageLimits {
            max_base64_bytes: b64_len(400),
            ..Default::default()
        };
        let mut tried = Vec::new();
        let (quality, data) = compress_adaptive(1, &limits, |q| {
            tried.push(q);
            Ok(vec![0u8; q as usize * 10])
        })
        .unwrap();

        assert_eq!(quality, 40);
        assert_eq!(tried, vec![85, 80, 75, 70, 65, 60, 55, 50, 45, 40]);
        assert!(data.len() <= limits.max_base64_bytes);
    }

    #[test]
    fn ladder_exhaustion_reports_too_large_after_fourteen_attempts() {
        let limits = ImageLimits {
            max_base64_bytes: 8,
            ..Default::default()
        };
        let mut attempts = 0;
        let err = compress_adaptive(2, &limits, |_| {
            attempts += 1;
            Ok(vec![0u8; 1000])
        })
        .unwrap_err();

        assert_eq!(attempts, 14);
        assert_eq!(
            err,
            ImageValidationError::TooLarge {
                index: 2,
                min_quality: 20,
                max_bytes: 8,
                last_size: b64_len(1000),
            }
        );
    }

    #[test]
    fn encoder_failure_stops_the_loop() {
        let mut attempts = 0;
        let err = compress_adaptive(1, &ImageLimits::default(), |q| {
            attempts += 1;
            Err(image::ImageError::Parameter(
                image::error::ParameterError::from_kind(
                    image::error::ParameterErrorKind::Generic(format!("bad quality {q}")),
                ),
            ))
        })
        .unwrap_err();

        assert_eq!(attempts, 1);
        assert!(matches!(err, ImageValidationError::Encode { quality: 85, .. }));
    }

    #[test]
    fn noisy_segment_degrades_quality_under_tight_ceiling() {
        // pseudo-random noise compresses poorly, forcing quality down
        let mut state = 0x1234_5678u32;
        let img = RgbImage::from_fn(256, 256, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let b = state.to_le_bytes();
            Rgb([b[0], b[1], b[2]])
        });

        let q85 = STANDARD.encode(encode_jpeg(&img, 85).unwrap()).len();
        let limits = ImageLimits {
            max_base64_bytes: q85 - 1,
            ..Default::default()
        };
        match normalize_segment(&img, 1, &limits) {
            Ok(seg) => {
                assert!(seg.quality < 85);
                assert!(seg.data.len() <= limits.max_base64_bytes);
            }
            Err(e) => assert!(matches!(e, ImageValidationError::TooLarge { .. })),
        }
    }
}
