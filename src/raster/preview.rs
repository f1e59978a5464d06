//! Preview overlays: a downscaled slide image with everything outside the
//! mask dimmed to half intensity.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};

use crate::error::RasterError;

/// Default preview scale relative to the mask-production level.
pub const DEFAULT_PREVIEW_RATIO: f64 = 0.25;

/// Build the overlay at `ratio` of the image size.
///
/// Both inputs are resized bilinearly; a preview pixel counts as masked when
/// the resized mask is at least half foreground.
pub fn overlay_preview(image: &RgbImage, mask: &GrayImage, ratio: f64) -> RgbImage {
    let width = ((image.width() as f64 * ratio) as u32).max(1);
    let height = ((image.height() as f64 * ratio) as u32).max(1);

    let mut preview = imageops::resize(image, width, height, FilterType::Triangle);
    let mask = imageops::resize(mask, width, height, FilterType::Triangle);

    for (pixel, mask_pixel) in preview.pixels_mut().zip(mask.pixels()) {
        if mask_pixel.0[0] < 128 {
            for channel in pixel.0.iter_mut() {
                *channel /= 2;
            }
        }
    }

    preview
}

/// Write an overlay preview; the format follows the file extension.
pub fn write_preview(
    path: impl AsRef<Path>,
    image: &RgbImage,
    mask: &GrayImage,
    ratio: f64,
) -> Result<(), RasterError> {
    let path = path.as_ref();
    overlay_preview(image, mask, ratio)
        .save(path)
        .map_err(|e| RasterError::Image {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}
