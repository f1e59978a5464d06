//! Slide metadata: bounds and physical calibration.
//!
//! Readers publish their metadata as a flat string map using OpenSlide's
//! property names. Bounds are optional (most formats have no scanner
//! padding) and fall back to the level-0 dimensions; the calibration is
//! required.

use std::collections::BTreeMap;

use crate::error::SlideError;
use crate::geometry::{Bounds, Calibration};

pub const PROPERTY_BOUNDS_X: &str = "openslide.bounds-x";
pub const PROPERTY_BOUNDS_Y: &str = "openslide.bounds-y";
pub const PROPERTY_BOUNDS_WIDTH: &str = "openslide.bounds-width";
pub const PROPERTY_BOUNDS_HEIGHT: &str = "openslide.bounds-height";
pub const PROPERTY_MPP_X: &str = "openslide.mpp-x";
pub const PROPERTY_MPP_Y: &str = "openslide.mpp-y";
pub const PROPERTY_LEVEL_COUNT: &str = "openslide.level-count";
pub const PROPERTY_VENDOR: &str = "openslide.vendor";
pub const PROPERTY_COMMENT: &str = "openslide.comment";

/// Key of a per-level property, e.g. `openslide.level[0].width`.
pub fn level_property(level: usize, field: &str) -> String {
    format!("openslide.level[{}].{}", level, field)
}

/// Parsed slide-wide metadata needed for coordinate reconciliation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlideProperties {
    pub bounds: Bounds,
    pub calibration: Calibration,
}

impl SlideProperties {
    /// Parse bounds and calibration from a property map.
    ///
    /// # Errors
    ///
    /// Fails when the level-0 dimensions or either mpp value is missing,
    /// unparsable, or non-positive.
    pub fn parse(properties: &BTreeMap<String, String>) -> Result<Self, SlideError> {
        let bounds = Self::parse_bounds(properties)?;

        let calibration = Calibration::new(
            parse_value(properties, PROPERTY_MPP_X)?,
            parse_value(properties, PROPERTY_MPP_Y)?,
        );
        if !calibration.is_valid() {
            return Err(SlideError::InvalidProperty {
                key: PROPERTY_MPP_X.to_string(),
                message: format!(
                    "calibration must be positive, got ({}, {})",
                    calibration.mpp_x, calibration.mpp_y
                ),
            });
        }

        Ok(Self {
            bounds,
            calibration,
        })
    }

    /// Parse only the bounds; uncalibrated slides are accepted.
    pub fn parse_bounds(properties: &BTreeMap<String, String>) -> Result<Bounds, SlideError> {
        let bounds = if properties.contains_key(PROPERTY_BOUNDS_X) {
            Bounds::new(
                parse_value(properties, PROPERTY_BOUNDS_X)?,
                parse_value(properties, PROPERTY_BOUNDS_Y)?,
                parse_value(properties, PROPERTY_BOUNDS_WIDTH)?,
                parse_value(properties, PROPERTY_BOUNDS_HEIGHT)?,
            )
        } else {
            Bounds::new(
                0,
                0,
                parse_value(properties, &level_property(0, "width"))?,
                parse_value(properties, &level_property(0, "height"))?,
            )
        };

        if bounds.width == 0 || bounds.height == 0 {
            return Err(SlideError::InvalidProperty {
                key: PROPERTY_BOUNDS_WIDTH.to_string(),
                message: format!("empty bounds {}x{}", bounds.width, bounds.height),
            });
        }

        Ok(bounds)
    }
}

fn parse_value<T: std::str::FromStr>(
    properties: &BTreeMap<String, String>,
    key: &str,
) -> Result<T, SlideError>
where
    T::Err: std::fmt::Display,
{
    let raw = properties
        .get(key)
        .ok_or_else(|| SlideError::MissingProperty(key.to_string()))?;

    raw.trim()
        .parse::<T>()
        .map_err(|e| SlideError::InvalidProperty {
            key: key.to_string(),
            message: format!("{:?}: {}", raw, e),
        })
}
