//! Slide abstraction layer.
//!
//! This module provides a unified interface for reading Whole Slide Image
//! pyramids regardless of their underlying format.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   PatchImporter / mask production       │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           SlideReader Trait             │
//! │  (properties, downsamples, regions)     │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              TiffSlide                  │
//! │  (pyramidal TIFF / SVS, chunk cache)    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use wsi_prepro::slide::{SlideReader, TiffSlide};
//! use wsi_prepro::geometry::{Coordinate, PixelSize};
//!
//! let mut slide = TiffSlide::open("slides/sample.svs")?;
//! let properties = slide.slide_properties()?;
//! let region = slide.read_region(properties.bounds.origin(), 2, PixelSize::square(512))?;
//! ```

mod properties;
mod reader;
mod tiff_slide;

pub use properties::{
    level_property, SlideProperties, PROPERTY_BOUNDS_HEIGHT, PROPERTY_BOUNDS_WIDTH,
    PROPERTY_BOUNDS_X, PROPERTY_BOUNDS_Y, PROPERTY_COMMENT, PROPERTY_LEVEL_COUNT, PROPERTY_MPP_X,
    PROPERTY_MPP_Y, PROPERTY_VENDOR,
};
pub use reader::{LevelInfo, SlideReader};
pub use tiff_slide::{AperioDescription, TiffSlide, DEFAULT_CHUNK_CACHE_CAPACITY};
