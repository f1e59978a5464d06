//! Patch sampling.
//!
//! [`PatchImporter`] ties a slide pyramid and its two mask rasters into one
//! coordinate space, derives patch footprints from physical sizes and
//! produces shuffled candidate grids. [`export_patches`] filters candidates
//! by mask coverage and writes the accepted patches as PNG files.

mod export;
mod importer;

pub use export::{export_patches, ExportOptions};
pub use importer::{
    PatchGeometry, PatchImporter, PatchSettings, RegionOptions, DEFAULT_PASS_RATIO,
};
