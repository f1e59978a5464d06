//! Specimen (tissue) mask from colour-range selection.
//!
//! Each [`RangeCriteria`] selects the pixels whose four channels all fall in
//! their inclusive ranges. Selections are summed, smoothed with a Gaussian
//! and thresholded.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::separable_filter_equal;
use serde::{Deserialize, Serialize};

use crate::error::MaskError;

use super::channels::HsvlChannels;

type FloatPlane = ImageBuffer<Luma<f32>, Vec<f32>>;

// =============================================================================
// Options
// =============================================================================

/// Inclusive range of 8-bit channel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRange {
    pub low: u8,
    pub high: u8,
}

impl ChannelRange {
    pub const fn new(low: u8, high: u8) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, value: u8) -> bool {
        self.low <= value && value <= self.high
    }
}

/// One colour selection: all four ranges must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeCriteria {
    #[serde(alias = "h")]
    pub hue: ChannelRange,
    #[serde(alias = "s")]
    pub saturation: ChannelRange,
    #[serde(alias = "v")]
    pub value: ChannelRange,
    #[serde(alias = "l")]
    pub laplacian: ChannelRange,
}

impl RangeCriteria {
    fn matches(&self, channels: &HsvlChannels, x: u32, y: u32) -> bool {
        self.hue.contains(channels.hue.get_pixel(x, y).0[0])
            && self.saturation.contains(channels.saturation.get_pixel(x, y).0[0])
            && self.value.contains(channels.value.get_pixel(x, y).0[0])
            && self.laplacian.contains(channels.laplacian.get_pixel(x, y).0[0])
    }
}

/// Gaussian smoothing and the threshold applied afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlurThreshold {
    /// Kernel size in pixels; must be odd
    pub kernel_size: u32,

    /// Standard deviation; values <= 0 are derived from the kernel size
    pub sigma: f64,

    /// Minimum smoothed selection count for foreground
    pub threshold: f32,
}

impl BlurThreshold {
    pub fn validate(&self) -> Result<(), MaskError> {
        if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
            return Err(MaskError::InvalidBlur(format!(
                "kernel size must be odd and positive, got {}",
                self.kernel_size
            )));
        }
        if !self.sigma.is_finite() {
            return Err(MaskError::InvalidBlur(format!(
                "sigma must be finite, got {}",
                self.sigma
            )));
        }
        Ok(())
    }

    /// Normalized 1-D Gaussian weights.
    pub fn kernel(&self) -> Vec<f32> {
        let size = self.kernel_size.max(1) as usize;
        let sigma = if self.sigma > 0.0 {
            self.sigma
        } else {
            0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8
        };
        let center = (size as f64 - 1.0) / 2.0;

        let weights: Vec<f64> = (0..size)
            .map(|i| {
                let d = i as f64 - center;
                (-(d * d) / (2.0 * sigma * sigma)).exp()
            })
            .collect();
        let total: f64 = weights.iter().sum();

        weights.into_iter().map(|w| (w / total) as f32).collect()
    }
}

/// Everything needed to build a specimen mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecimenOptions {
    pub criteria: Vec<RangeCriteria>,
    pub blur: BlurThreshold,
}

impl Default for SpecimenOptions {
    fn default() -> Self {
        Self {
            criteria: vec![RangeCriteria {
                hue: ChannelRange::new(128, 250),
                saturation: ChannelRange::new(20, 250),
                value: ChannelRange::new(60, 240),
                laplacian: ChannelRange::new(20, 255),
            }],
            blur: BlurThreshold {
                kernel_size: 31,
                sigma: 21.0,
                threshold: 0.2,
            },
        }
    }
}

// =============================================================================
// Mask construction
// =============================================================================

/// Build the specimen mask for one set of channels.
///
/// Foreground is 255. An empty criteria list yields an all-background mask.
pub fn build_specimen_mask(
    channels: &HsvlChannels,
    criteria: &[RangeCriteria],
    blur: &BlurThreshold,
) -> Result<GrayImage, MaskError> {
    blur.validate()?;

    let (width, height) = channels.dimensions();
    if criteria.is_empty() {
        return Ok(GrayImage::new(width, height));
    }

    let selection: FloatPlane = ImageBuffer::from_fn(width, height, |x, y| {
        let count = criteria
            .iter()
            .filter(|c| c.matches(channels, x, y))
            .count();
        Luma([count as f32])
    });

    let smoothed: FloatPlane = separable_filter_equal(&selection, &blur.kernel());

    let mut mask = GrayImage::new(width, height);
    for (target, source) in mask.pixels_mut().zip(smoothed.pixels()) {
        if source.0[0] >= blur.threshold {
            target.0[0] = 255;
        }
    }

    Ok(mask)
}
