//! Physical units to pixel counts.

use serde::{Deserialize, Serialize};

use super::types::MicronSize;

/// Microns per pixel of the pyramid's finest level.
///
/// Both axes are strictly positive; [`crate::slide::SlideProperties`] rejects
/// anything else when it parses the slide metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub mpp_x: f64,
    pub mpp_y: f64,
}

impl Calibration {
    pub const fn new(mpp_x: f64, mpp_y: f64) -> Self {
        Self { mpp_x, mpp_y }
    }

    /// Isotropic pixel size: the finer of the two axes.
    pub fn min_axis(&self) -> f64 {
        self.mpp_x.min(self.mpp_y)
    }

    pub fn is_valid(&self) -> bool {
        self.mpp_x.is_finite() && self.mpp_y.is_finite() && self.mpp_x > 0.0 && self.mpp_y > 0.0
    }
}

/// Convert a length in microns into level-0 pixels.
#[inline]
pub fn to_pixels(length_microns: f64, calibration: &Calibration) -> f64 {
    length_microns / calibration.min_axis()
}

/// Convert a level-0 pixel count back into microns.
#[inline]
pub fn to_microns(pixels: f64, calibration: &Calibration) -> f64 {
    pixels * calibration.min_axis()
}

impl MicronSize {
    /// Per-axis conversion to fractional level-0 pixels `(x, y)`.
    pub fn to_pixels(&self, calibration: &Calibration) -> (f64, f64) {
        (
            to_pixels(self.x, calibration),
            to_pixels(self.y, calibration),
        )
    }
}
