//! SlideReader trait for format-agnostic pyramid access.
//!
//! This module defines the `SlideReader` trait, the interface the patch
//! importer and the mask pipeline use to read image pyramids. The reader
//! exposes a string-keyed property map, the level downsample list, and
//! region reads at any level.
//!
//! # Usage
//!
//! The trait is implemented by [`crate::slide::TiffSlide`] for pyramidal
//! TIFF and Aperio SVS files. Tests implement it over synthetic images.

use std::collections::BTreeMap;

use image::RgbImage;

use crate::error::SlideError;
use crate::geometry::{Coordinate, PixelSize};

use super::properties::SlideProperties;

// =============================================================================
// Level Information
// =============================================================================

/// Information about a single pyramid level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelInfo {
    /// Width of this level in pixels
    pub width: u32,

    /// Height of this level in pixels
    pub height: u32,

    /// Width of each stored chunk (tile or strip) in pixels
    pub tile_width: u32,

    /// Height of each stored chunk (tile or strip) in pixels
    pub tile_height: u32,

    /// Downsample factor relative to level 0
    ///
    /// Level 0 has downsample 1.0, level 1 might have 4.0, etc.
    pub downsample: f64,
}

impl LevelInfo {
    /// Number of chunks in X and Y directions.
    pub fn tile_count(&self) -> (u32, u32) {
        (
            self.width.div_ceil(self.tile_width.max(1)),
            self.height.div_ceil(self.tile_height.max(1)),
        )
    }
}

// =============================================================================
// SlideReader Trait
// =============================================================================

/// Format-agnostic interface for reading Whole Slide Image pyramids.
///
/// Reads take `&mut self`: a reader is owned by one session (one patch
/// importer or one mask production task) and is never shared across threads.
pub trait SlideReader: Send {
    /// Raw metadata, keyed like OpenSlide properties
    /// (`openslide.mpp-x`, `openslide.level[0].width`, ...).
    fn properties(&self) -> &BTreeMap<String, String>;

    /// Get the number of pyramid levels.
    ///
    /// Level 0 is always the highest resolution (full size).
    fn level_count(&self) -> usize;

    /// Get dimensions of a specific level.
    ///
    /// Returns `(width, height)` in pixels, or `None` if level is out of range.
    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)>;

    /// Get the downsample factor for a level.
    ///
    /// Returns `None` if level is out of range.
    fn level_downsample(&self, level: usize) -> Option<f64>;

    /// Read a region as RGB pixels.
    ///
    /// `origin` is the top-left corner in level-0 pixels of the global slide
    /// space; `size` is measured in pixels of `level`. Pixels outside the
    /// level are returned black.
    ///
    /// # Errors
    ///
    /// Returns an error if the level is out of range or if decoding the
    /// underlying data fails.
    fn read_region(
        &mut self,
        origin: Coordinate,
        level: usize,
        size: PixelSize,
    ) -> Result<RgbImage, SlideError>;

    /// Get dimensions of the full-resolution (level 0) image.
    fn dimensions(&self) -> Option<(u32, u32)> {
        self.level_dimensions(0)
    }

    /// Downsample factors of every level, finest first.
    fn level_downsamples(&self) -> Vec<f64> {
        (0..self.level_count())
            .filter_map(|level| self.level_downsample(level))
            .collect()
    }

    /// Bounds and calibration parsed from [`SlideReader::properties`].
    fn slide_properties(&self) -> Result<SlideProperties, SlideError> {
        SlideProperties::parse(self.properties())
    }
}

// =============================================================================
// Tests
// =============================================================================
