use std::path::PathBuf;

use thiserror::Error;

use crate::geometry::{Coordinate, MaskType};

/// Errors raised while opening or reading an image pyramid.
#[derive(Debug, Error)]
pub enum SlideError {
    /// The slide file could not be opened or read
    #[error("I/O error on {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// The TIFF structure could not be decoded
    #[error("TIFF error: {0}")]
    Tiff(String),

    /// A required property is missing from the slide metadata
    #[error("Missing slide property: {0}")]
    MissingProperty(String),

    /// A property is present but cannot be interpreted
    #[error("Invalid slide property {key}: {message}")]
    InvalidProperty { key: String, message: String },

    /// The file contains no image that can serve as a pyramid level
    #[error("No pyramid levels found in {0}")]
    NoLevels(PathBuf),

    /// Requested level does not exist
    #[error("Invalid level {level}: slide has {max_levels} levels")]
    InvalidLevel { level: usize, max_levels: usize },

    /// The sample layout of a level is not supported
    #[error("Unsupported color type: {0}")]
    UnsupportedColor(String),
}

impl From<tiff::TiffError> for SlideError {
    fn from(err: tiff::TiffError) -> Self {
        SlideError::Tiff(err.to_string())
    }
}

/// Errors raised by the mask raster codec and preview writer.
#[derive(Debug, Error)]
pub enum RasterError {
    /// Reading or writing the file failed
    #[error("I/O error on {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// The TIFF codec rejected the data
    #[error("TIFF error on {path}: {message}")]
    Tiff { path: PathBuf, message: String },

    /// The image codec rejected the data
    #[error("Image error on {path}: {message}")]
    Image { path: PathBuf, message: String },

    /// The raster has a layout that cannot be used as a mask
    #[error("Unsupported mask layout in {path}: {message}")]
    Unsupported { path: PathBuf, message: String },

    /// The raster has no pixels
    #[error("Empty raster: {0}")]
    Empty(PathBuf),
}

/// Errors raised by the patch importer.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The primary slide failed to open or read
    #[error("Slide error: {0}")]
    Slide(#[from] SlideError),

    /// A mask raster failed to open
    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),

    /// A derived scale factor is zero, negative or not finite
    #[error("Invalid scale for {what}: {value}")]
    InvalidScale { what: String, value: f64 },

    /// Patch settings are unusable
    #[error("Invalid patch settings: {0}")]
    InvalidSettings(String),

    /// A lookup was attempted before `configure`
    #[error("Patch importer is not configured")]
    NotConfigured,

    /// Reading the primary image at a coordinate failed
    #[error("Image lookup failed at ({}, {}): {source}", coordinate.x, coordinate.y)]
    ImageLookup {
        coordinate: Coordinate,
        #[source]
        source: SlideError,
    },

    /// A mask window falls outside its raster
    #[error("{mask} mask lookup failed at ({}, {}): {message}", coordinate.x, coordinate.y)]
    MaskWindow {
        mask: MaskType,
        coordinate: Coordinate,
        message: String,
    },
}

/// Errors raised while producing and persisting masks for one slide.
#[derive(Debug, Error)]
pub enum MaskError {
    /// The slide could not be read
    #[error("Slide error: {0}")]
    Slide(#[from] SlideError),

    /// A mask or preview could not be written
    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),

    /// Blur parameters are unusable
    #[error("Invalid blur: {0}")]
    InvalidBlur(String),

    /// The production downsample matches no level
    #[error("Invalid downsample: {0}")]
    InvalidDownsample(f64),

    /// Output directories or dump files could not be written
    #[error("I/O error on {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// Parameter dumps could not be serialized
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors raised by the slide catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The database rejected the query
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The table name is not a plain identifier
    #[error("Invalid table name: {0}")]
    InvalidTable(String),

    /// A coordinates column holds malformed JSON
    #[error("Malformed coordinates for slide {slide_id}: {message}")]
    MalformedCoordinates { slide_id: String, message: String },

    /// The blocking query task did not complete
    #[error("Catalog task failed: {0}")]
    Task(String),
}
