//! Decoding and vertical slicing of full-page screenshots.
//!
//! A full-page capture of a long landing page is easily 2 560 × 30 000 px,
//! far above the per-image dimension limit of vision models. Downscaling
//! would make body text unreadable, so tall images are cut into horizontal
//! bands instead and sent as an ordered series.
//!
//! Colour-mode flattening happens once, before slicing, so every segment
//! shares the same opaque RGB layout expected by the JPEG encoder.

use crate::config::ImageLimits;
use crate::error::ImageValidationError;
use image::{DynamicImage, ImageReader, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::{debug, info};

/// One vertical band of a source image.
///
/// `index` is 1-based. `top` is inclusive and `bottom` exclusive, so
/// `height == bottom - top`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSegment {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub top: u32,
    pub bottom: u32,
}

/// Decode raw screenshot bytes (PNG or JPEG) into an opaque RGB bitmap.
///
/// The header is checked against `limits.max_decode_pixels` first; within
/// that budget the decoder runs without the `image` crate's default 512 MiB
/// allocation cap, which a 2x full-page capture exceeds routinely.
///
/// An alpha channel is dropped rather than composited, which keeps the
/// stored colour of each pixel.
pub fn decode_screenshot(
    bytes: &[u8],
    limits: &ImageLimits,
) -> Result<RgbImage, ImageValidationError> {
    let (width, height) = reader(bytes)?.into_dimensions().map_err(decode_err)?;
    let pixels = u64::from(width) * u64::from(height);
    if pixels > limits.max_decode_pixels {
        return Err(ImageValidationError::PixelBudgetExceeded {
            width,
            height,
            max_pixels: limits.max_decode_pixels,
        });
    }

    let mut reader = reader(bytes)?;
    reader.no_limits();
    let img = reader.decode().map_err(decode_err)?;
    info!("Original image dimensions: {}x{}", img.width(), img.height());
    Ok(flatten(img))
}

fn reader(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, ImageValidationError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageValidationError::Decode {
            detail: e.to_string(),
        })
}

fn decode_err(e: image::ImageError) -> ImageValidationError {
    ImageValidationError::Decode {
        detail: e.to_string(),
    }
}

fn flatten(img: DynamicImage) -> RgbImage {
    match img {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other => {
            debug!("Flattening {:?} to RGB", other.color());
            other.to_rgb8()
        }
    }
}

/// Compute slice boundaries for an image of the given size.
///
/// * `height <= max_dimension` → one segment covering the whole image.
/// * otherwise `n = ceil(height / max_dimension)` segments of
///   `floor(height / n)` rows each; the final segment runs to `height` and
///   absorbs the remainder.
///
/// The returned spans are contiguous and cover `[0, height)` exactly once.
pub fn plan_slices(width: u32, height: u32, max_dimension: u32) -> Vec<ImageSegment> {
    if height <= max_dimension {
        return vec![ImageSegment {
            index: 1,
            width,
            height,
            top: 0,
            bottom: height,
        }];
    }

    let num_slices = height.div_ceil(max_dimension);
    let slice_height = height / num_slices;
    debug!(
        "Slicing into {} segments of ~{}px height",
        num_slices, slice_height
    );

    (0..num_slices)
        .map(|i| {
            let top = i * slice_height;
            let bottom = if i + 1 == num_slices {
                height
            } else {
                (i + 1) * slice_height
            };
            ImageSegment {
                index: i as usize + 1,
                width,
                height: bottom - top,
                top,
                bottom,
            }
        })
        .collect()
}

/// Cut `img` into the segments produced by [`plan_slices`].
///
/// Takes ownership so a single-segment image moves through without a copy.
pub fn slice_image(img: RgbImage, limits: &ImageLimits) -> Vec<(ImageSegment, RgbImage)> {
    let (width, height) = img.dimensions();
    let plan = plan_slices(width, height, limits.max_dimension);

    if let [only] = plan.as_slice() {
        return vec![(*only, img)];
    }

    info!("Slicing {}x{} image into {} segments", width, height, plan.len());
    plan.into_iter()
        .map(|seg| {
            let band = image::imageops::crop_imm(&img, 0, seg.top, width, seg.height).to_image();
            (seg, band)
        })
        .collect()
}
