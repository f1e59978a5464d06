//! Mask scale registry.
//!
//! Each mask raster was produced at some pyramid level and then stored at
//! its own pixel dimensions. A single scalar, the mean of the two axis
//! ratios between the slide bounds and the mask, approximates how many
//! level-0 pixels one mask pixel covers.

use crate::error::ImportError;

use super::types::{Bounds, Coordinate, MaskType};

/// Compute the level-0-pixels-per-mask-pixel scale of a raster.
///
/// # Errors
///
/// Returns [`ImportError::InvalidScale`] when the raster or bounds are empty,
/// since the resulting factor would be zero or infinite.
pub fn register_raster(width: u32, height: u32, bounds: &Bounds) -> Result<f64, ImportError> {
    let scale = (bounds.width as f64 / width as f64 + bounds.height as f64 / height as f64) / 2.0;

    if !scale.is_finite() || scale <= 0.0 {
        return Err(ImportError::InvalidScale {
            what: format!("{}x{} raster over {}x{} bounds", width, height, bounds.width, bounds.height),
            value: scale,
        });
    }

    Ok(scale)
}

/// Map a level-0 coordinate into a raster's pixel grid.
///
/// Rounds to the nearest pixel; truncation would drift by up to half a pixel
/// at small scales.
#[inline]
pub fn to_raster_coordinate(coordinate: Coordinate, scale: f64) -> (u32, u32) {
    (
        (coordinate.x as f64 / scale).round() as u32,
        (coordinate.y as f64 / scale).round() as u32,
    )
}

/// Scale factors for both mask rasters of a slide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskScales {
    specimen: f64,
    annotation: f64,
}

impl MaskScales {
    /// Register both masks against the slide bounds.
    pub fn register(
        specimen: (u32, u32),
        annotation: (u32, u32),
        bounds: &Bounds,
    ) -> Result<Self, ImportError> {
        Ok(Self {
            specimen: register_raster(specimen.0, specimen.1, bounds)?,
            annotation: register_raster(annotation.0, annotation.1, bounds)?,
        })
    }

    pub fn get(&self, mask: MaskType) -> f64 {
        match mask {
            MaskType::Specimen => self.specimen,
            MaskType::Annotation => self.annotation,
        }
    }
}
