//! Patch importer: one slide plus its specimen and annotation masks,
//! addressable through a single level-0 coordinate space.
//!
//! # Lifecycle
//!
//! ```text
//! open / from_parts ──► configure ──► load_image / load_mask / is_usable_mask
//!                          ▲   │
//!                          └───┘  (reconfigure replaces the geometry)
//! ```
//!
//! Opening reads the calibration, bounds and level downsamples and registers
//! each mask's scale. `configure` derives a [`PatchGeometry`] from physical
//! patch and interval sizes and returns the candidate grid. Lookups before
//! the first `configure` fail with [`ImportError::NotConfigured`].
//!
//! # Coordinates
//!
//! Every public coordinate is `(x, y)` in level-0 pixels relative to the
//! bounds origin, and every size is `(width, height)`. In mask rasters `x`
//! selects columns and `y` selects rows.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ImportError;
use crate::geometry::{
    generate_candidates, select_level, to_raster_coordinate, Bounds, Calibration, CandidateSet,
    Coordinate, MaskScales, MaskType, MicronSize, PixelSize,
};
use crate::raster::MaskRaster;
use crate::slide::{SlideProperties, SlideReader, TiffSlide};

/// Default acceptance threshold of [`PatchImporter::is_usable_mask`].
pub const DEFAULT_PASS_RATIO: f64 = 0.5;

// =============================================================================
// Settings and geometry
// =============================================================================

/// Physical patch footprint, sampling interval and output size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatchSettings {
    pub patch_microns: MicronSize,
    pub interval_microns: MicronSize,
    pub output_size: PixelSize,
}

impl Default for PatchSettings {
    fn default() -> Self {
        Self {
            patch_microns: MicronSize::square(500.0),
            interval_microns: MicronSize::square(250.0),
            output_size: PixelSize::square(128),
        }
    }
}

impl PatchSettings {
    fn validate(&self) -> Result<(), ImportError> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.patch_microns.x) || !positive(self.patch_microns.y) {
            return Err(ImportError::InvalidSettings(format!(
                "patch size must be positive, got {:?}",
                self.patch_microns
            )));
        }
        if !positive(self.interval_microns.x) || !positive(self.interval_microns.y) {
            return Err(ImportError::InvalidSettings(format!(
                "interval must be positive, got {:?}",
                self.interval_microns
            )));
        }
        if self.output_size.is_empty() {
            return Err(ImportError::InvalidSettings(
                "output size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pixel footprints derived by [`PatchImporter::configure`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatchGeometry {
    /// Working pyramid level
    pub level: usize,

    /// Downsample of the working level
    pub level_downsample: f64,

    /// Patch footprint in working-level pixels
    pub level_pixel_size: PixelSize,

    /// Patch footprint in specimen mask pixels
    pub specimen_pixel_size: PixelSize,

    /// Patch footprint in annotation mask pixels
    pub annotation_pixel_size: PixelSize,

    /// Size every lookup is resized to
    pub output_size: PixelSize,

    /// Candidate spacing in level-0 pixels
    pub interval_pixels: PixelSize,

    /// Candidate grid dimensions `(columns, rows)`
    pub grid: (usize, usize),
}

impl PatchGeometry {
    pub fn mask_pixel_size(&self, mask: MaskType) -> PixelSize {
        match mask {
            MaskType::Specimen => self.specimen_pixel_size,
            MaskType::Annotation => self.annotation_pixel_size,
        }
    }
}

/// Per-call overrides for lookups. Absent fields use the configured geometry.
///
/// `level` only applies to image reads; masks are single-resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionOptions {
    pub level: Option<usize>,
    pub pixel_size: Option<PixelSize>,
    pub output_size: Option<PixelSize>,
}

impl RegionOptions {
    pub fn with_level(mut self, level: usize) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_pixel_size(mut self, pixel_size: PixelSize) -> Self {
        self.pixel_size = Some(pixel_size);
        self
    }

    pub fn with_output_size(mut self, output_size: PixelSize) -> Self {
        self.output_size = Some(output_size);
        self
    }
}

// =============================================================================
// PatchImporter
// =============================================================================

/// A slide with its two masks, sampled through one coordinate space.
pub struct PatchImporter<S: SlideReader = TiffSlide> {
    slide: S,
    specimen: MaskRaster,
    annotation: MaskRaster,
    properties: SlideProperties,
    level_downsamples: Vec<f64>,
    scales: MaskScales,
    geometry: Option<PatchGeometry>,
}

impl PatchImporter<TiffSlide> {
    /// Open a slide and its two mask TIFFs.
    ///
    /// Nothing is kept if any of the three files fails to open.
    pub fn open(
        slide_path: impl AsRef<Path>,
        specimen_path: impl AsRef<Path>,
        annotation_path: impl AsRef<Path>,
    ) -> Result<Self, ImportError> {
        let slide = TiffSlide::open(slide_path)?;
        let specimen = MaskRaster::open(specimen_path)?;
        let annotation = MaskRaster::open(annotation_path)?;
        Self::from_parts(slide, specimen, annotation)
    }
}

impl<S: SlideReader> PatchImporter<S> {
    /// Assemble an importer from an opened reader and loaded masks.
    ///
    /// # Errors
    ///
    /// Fails when the slide lacks bounds or a valid calibration, or when a
    /// mask has no pixels.
    pub fn from_parts(
        slide: S,
        specimen: MaskRaster,
        annotation: MaskRaster,
    ) -> Result<Self, ImportError> {
        let properties = slide.slide_properties()?;
        let level_downsamples = slide.level_downsamples();
        let scales = MaskScales::register(
            specimen.dimensions(),
            annotation.dimensions(),
            &properties.bounds,
        )?;

        debug!(
            bounds = ?properties.bounds,
            mpp = properties.calibration.min_axis(),
            specimen_scale = scales.get(MaskType::Specimen),
            annotation_scale = scales.get(MaskType::Annotation),
            "Opened patch importer"
        );

        Ok(Self {
            slide,
            specimen,
            annotation,
            properties,
            level_downsamples,
            scales,
            geometry: None,
        })
    }

    pub fn bounds(&self) -> Bounds {
        self.properties.bounds
    }

    pub fn calibration(&self) -> Calibration {
        self.properties.calibration
    }

    pub fn level_downsamples(&self) -> &[f64] {
        &self.level_downsamples
    }

    pub fn scales(&self) -> &MaskScales {
        &self.scales
    }

    /// Geometry of the last `configure`, if any.
    pub fn geometry(&self) -> Option<&PatchGeometry> {
        self.geometry.as_ref()
    }

    /// Candidate grid dimensions `(columns, rows)` of the last `configure`.
    pub fn grid(&self) -> Option<(usize, usize)> {
        self.geometry.map(|g| g.grid)
    }

    pub fn mask(&self, mask: MaskType) -> &MaskRaster {
        match mask {
            MaskType::Specimen => &self.specimen,
            MaskType::Annotation => &self.annotation,
        }
    }

    /// Derive the patch geometry and return the shuffled candidate grid.
    ///
    /// The working level targets a source footprint of about twice the
    /// output size, so every patch is downscaled by roughly 2x on output.
    pub fn configure<R: Rng + ?Sized>(
        &mut self,
        settings: &PatchSettings,
        rng: &mut R,
    ) -> Result<CandidateSet, ImportError> {
        settings.validate()?;
        let calibration = self.properties.calibration;

        let (patch_x, patch_y) = settings.patch_microns.to_pixels(&calibration);
        let target_downsample = ((patch_x + patch_y) / 2.0) / (2.0 * settings.output_size.mean());
        let level = select_level(&self.level_downsamples, target_downsample).ok_or_else(|| {
            ImportError::InvalidSettings(format!(
                "no pyramid level for downsample {:.3}",
                target_downsample
            ))
        })?;
        let level_downsample = self.level_downsamples[level];

        let level_pixel_size = PixelSize::new(
            (patch_x / level_downsample).round() as u32,
            (patch_y / level_downsample).round() as u32,
        );
        if level_pixel_size.is_empty() {
            return Err(ImportError::InvalidSettings(format!(
                "patch of {:?} microns is empty at level {}",
                settings.patch_microns, level
            )));
        }

        let mask_size = |scale: f64| {
            PixelSize::new(
                (level_pixel_size.width as f64 * level_downsample / scale).round() as u32,
                (level_pixel_size.height as f64 * level_downsample / scale).round() as u32,
            )
        };
        let specimen_pixel_size = mask_size(self.scales.get(MaskType::Specimen));
        let annotation_pixel_size = mask_size(self.scales.get(MaskType::Annotation));

        let (interval_x, interval_y) = settings.interval_microns.to_pixels(&calibration);
        let interval_pixels = PixelSize::new(interval_x as u32, interval_y as u32);
        if interval_pixels.is_empty() {
            return Err(ImportError::InvalidSettings(format!(
                "interval of {:?} microns is below one pixel",
                settings.interval_microns
            )));
        }

        let candidates = generate_candidates(&self.properties.bounds, interval_pixels, rng);

        let geometry = PatchGeometry {
            level,
            level_downsample,
            level_pixel_size,
            specimen_pixel_size,
            annotation_pixel_size,
            output_size: settings.output_size,
            interval_pixels,
            grid: (candidates.count_x, candidates.count_y),
        };
        debug!(?geometry, candidates = candidates.len(), "Configured patch geometry");
        self.geometry = Some(geometry);

        Ok(candidates)
    }

    /// Read the slide patch at `coordinate`, resized to the output size.
    pub fn load_image(
        &mut self,
        coordinate: Coordinate,
        options: &RegionOptions,
    ) -> Result<RgbImage, ImportError> {
        let geometry = self.geometry.ok_or(ImportError::NotConfigured)?;
        let level = options.level.unwrap_or(geometry.level);
        let pixel_size = options.pixel_size.unwrap_or(geometry.level_pixel_size);
        let output_size = options.output_size.unwrap_or(geometry.output_size);

        let origin = self.properties.bounds.to_global(coordinate);
        let region = self
            .slide
            .read_region(origin, level, pixel_size)
            .map_err(|source| ImportError::ImageLookup { coordinate, source })?;

        Ok(resize_to(region, output_size))
    }

    /// Read the mask patch at `coordinate`, resized to the output size.
    ///
    /// The window is clipped to the raster before resizing.
    pub fn load_mask(
        &self,
        mask: MaskType,
        coordinate: Coordinate,
        options: &RegionOptions,
    ) -> Result<GrayImage, ImportError> {
        let geometry = self.geometry.ok_or(ImportError::NotConfigured)?;
        let pixel_size = options
            .pixel_size
            .unwrap_or_else(|| geometry.mask_pixel_size(mask));
        let output_size = options.output_size.unwrap_or(geometry.output_size);

        let window = self.mask_window(mask, coordinate, pixel_size)?;
        Ok(resize_to(window, output_size))
    }

    /// Whether each coordinate's mask patch is mostly foreground.
    ///
    /// A patch is usable when its mean normalized value strictly exceeds
    /// `pass_ratio`. The native mask footprint is used (no resize). Lookups
    /// that fail count as unusable, and so does every coordinate before
    /// `configure`; the result is index-aligned with `coordinates`.
    pub fn is_usable_mask(
        &self,
        mask: MaskType,
        coordinates: &[Coordinate],
        pass_ratio: f64,
        pixel_size: Option<PixelSize>,
    ) -> Vec<bool> {
        let Some(geometry) = self.geometry else {
            return vec![false; coordinates.len()];
        };
        let pixel_size = pixel_size.unwrap_or_else(|| geometry.mask_pixel_size(mask));

        coordinates
            .iter()
            .map(|&coordinate| {
                self.mask_window(mask, coordinate, pixel_size)
                    .map(|window| foreground_fraction(&window) > pass_ratio)
                    .unwrap_or(false)
            })
            .collect()
    }

    fn mask_window(
        &self,
        mask: MaskType,
        coordinate: Coordinate,
        pixel_size: PixelSize,
    ) -> Result<GrayImage, ImportError> {
        let (x, y) = to_raster_coordinate(coordinate, self.scales.get(mask));
        let raster = self.mask(mask);

        raster
            .window(x, y, pixel_size)
            .ok_or_else(|| ImportError::MaskWindow {
                mask,
                coordinate,
                message: format!(
                    "window at ({}, {}) of {}x{} lies outside the {}x{} raster",
                    x,
                    y,
                    pixel_size.width,
                    pixel_size.height,
                    raster.dimensions().0,
                    raster.dimensions().1
                ),
            })
    }
}

fn resize_to<P>(
    image: image::ImageBuffer<P, Vec<u8>>,
    size: PixelSize,
) -> image::ImageBuffer<P, Vec<u8>>
where
    P: image::Pixel<Subpixel = u8> + 'static,
{
    if image.dimensions() == (size.width, size.height) {
        return image;
    }
    imageops::resize(&image, size.width, size.height, FilterType::Triangle)
}

/// Mean of `value / 255` over the window.
fn foreground_fraction(window: &GrayImage) -> f64 {
    let count = window.as_raw().len();
    if count == 0 {
        return 0.0;
    }
    let total: u64 = window.as_raw().iter().map(|&v| v as u64).sum();
    total as f64 / (255.0 * count as f64)
}

// =============================================================================
// Tests
// =============================================================================
