//! # wsi-prepro
//!
//! Preprocessing for Whole Slide Images (WSI): tissue and annotation masks,
//! and random patch sampling with the slide and both masks kept aligned.
//!
//! A slide pyramid, a specimen mask and an annotation mask are stored at
//! different resolutions. This library maps them into one level-0 pixel
//! coordinate space so that a single `(x, y)` addresses the same physical
//! location in all three.
//!
//! ## Features
//!
//! - **Mask production**: HSV and Laplacian range selection for tissue,
//!   polygon filling for annotations, written as LZW BigTIFF with previews
//! - **Patch sampling**: micron-sized patches, automatic pyramid level
//!   choice, shuffled non-overlapping candidate grids, mask-coverage filter
//! - **Batch processing**: catalog-driven mask production on a worker pool
//! - **Format support**: pyramidal TIFF and Aperio SVS via the `tiff` crate
//!
//! ## Architecture
//!
//! - [`geometry`] - units, level selection, mask scales, candidate grids
//! - [`slide`] - slide reader trait, metadata parsing, TIFF/SVS reader
//! - [`raster`] - mask TIFF codec and preview overlays
//! - [`mask`] - specimen and annotation mask production
//! - [`patch`] - patch importer and patch export
//! - [`batch`] - parallel per-slide mask production
//! - [`catalog`] - slide catalog backed by SQLite
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use rand::{rngs::StdRng, SeedableRng};
//! use wsi_prepro::{Coordinate, MaskType, PatchImporter, PatchSettings, RegionOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut importer = PatchImporter::open("slide.svs", "spec.tif", "anno.tif")?;
//! let candidates = importer.configure(&PatchSettings::default(), &mut StdRng::seed_from_u64(0))?;
//!
//! let usable = importer.is_usable_mask(MaskType::Specimen, &candidates.coordinates, 0.5, None);
//! for (coordinate, _) in candidates.coordinates.iter().zip(usable).filter(|(_, ok)| *ok) {
//!     let patch = importer.load_image(*coordinate, &RegionOptions::default())?;
//!     println!("{:?}: {}x{}", coordinate, patch.width(), patch.height());
//! }
//! # let _ = Coordinate::new(0, 0);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod catalog;
pub mod config;
pub mod error;
pub mod geometry;
pub mod mask;
pub mod patch;
pub mod raster;
pub mod slide;

// Re-export commonly used types
pub use batch::{run_batch, BatchReport, TaskFailure};
pub use catalog::{plan_tasks, SlideCatalog, SlideRecord, SqliteCatalog, TaskPlan};
pub use config::{Cli, Command, MaskConfig, SampleConfig};
pub use error::{CatalogError, ImportError, MaskError, RasterError, SlideError};
pub use geometry::{
    generate_candidates, select_level, to_raster_coordinate, Bounds, Calibration, CandidateSet,
    Coordinate, MaskScales, MaskType, MicronSize, PixelSize,
};
pub use mask::{
    build_annotation_mask, build_specimen_mask, process_task, produce_masks, HsvlChannels,
    MaskTask, OutputLayout, SpecimenOptions,
};
pub use patch::{
    export_patches, ExportOptions, PatchGeometry, PatchImporter, PatchSettings, RegionOptions,
};
pub use raster::{write_mask_bigtiff, MaskRaster};
pub use slide::{LevelInfo, SlideProperties, SlideReader, TiffSlide};
