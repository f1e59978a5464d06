use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Coordinate
// =============================================================================

/// A patch origin in level-0 pixels, relative to the slide bounds origin.
///
/// This is the single addressing key shared by the pyramid and both masks.
/// Add [`Bounds::origin`] before using it against the pyramid's global
/// address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: u32,
    pub y: u32,
}

impl Coordinate {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

// =============================================================================
// Sizes
// =============================================================================

/// A raster extent in pixels, always `(width, height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Square size with equal sides.
    pub const fn square(side: u32) -> Self {
        Self::new(side, side)
    }

    /// Mean of the two sides.
    pub fn mean(&self) -> f64 {
        (self.width as f64 + self.height as f64) / 2.0
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A physical extent in microns along x and y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MicronSize {
    pub x: f64,
    pub y: f64,
}

impl MicronSize {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub const fn square(side: f64) -> Self {
        Self::new(side, side)
    }

    pub fn mean(&self) -> f64 {
        (self.x + self.y) / 2.0
    }
}

// =============================================================================
// Bounds
// =============================================================================

/// Usable rectangle of a slide in level-0 pixels, excluding scanner padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Top-left corner in the pyramid's global level-0 space.
    pub fn origin(&self) -> Coordinate {
        Coordinate::new(self.x, self.y)
    }

    pub fn size(&self) -> PixelSize {
        PixelSize::new(self.width, self.height)
    }

    /// Translate a bounds-relative coordinate into global level-0 space.
    pub fn to_global(&self, coordinate: Coordinate) -> Coordinate {
        Coordinate::new(
            self.x.saturating_add(coordinate.x),
            self.y.saturating_add(coordinate.y),
        )
    }
}

// =============================================================================
// MaskType
// =============================================================================

/// Which auxiliary mask raster a lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskType {
    Specimen,
    Annotation,
}

impl MaskType {
    pub const ALL: [MaskType; 2] = [MaskType::Specimen, MaskType::Annotation];

    /// Short directory/file stem used in the persisted layout.
    pub fn stem(&self) -> &'static str {
        match self {
            MaskType::Specimen => "spec",
            MaskType::Annotation => "anno",
        }
    }
}

impl fmt::Display for MaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaskType::Specimen => write!(f, "specimen"),
            MaskType::Annotation => write!(f, "annotation"),
        }
    }
}
