//! Colour channels used for tissue detection.

use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::filter::filter3x3;

/// 3x3 aperture Laplacian (second derivative in both axes).
const LAPLACIAN_KERNEL: [f32; 9] = [2.0, 0.0, 2.0, 0.0, -8.0, 0.0, 2.0, 0.0, 2.0];

/// Hue, saturation, value and Laplacian-of-value planes of one image.
///
/// All planes are 8-bit and share the source dimensions. Hue uses the full
/// byte range (0..=255 covers 0..360 degrees).
#[derive(Debug, Clone)]
pub struct HsvlChannels {
    pub hue: GrayImage,
    pub saturation: GrayImage,
    pub value: GrayImage,
    pub laplacian: GrayImage,
}

impl HsvlChannels {
    pub fn from_rgb(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let mut hue = GrayImage::new(width, height);
        let mut saturation = GrayImage::new(width, height);
        let mut value = GrayImage::new(width, height);

        for (x, y, pixel) in image.enumerate_pixels() {
            let [h, s, v] = hsv_full(pixel.0);
            hue.put_pixel(x, y, Luma([h]));
            saturation.put_pixel(x, y, Luma([s]));
            value.put_pixel(x, y, Luma([v]));
        }

        let laplacian = laplacian_u8(&value);

        Self {
            hue,
            saturation,
            value,
            laplacian,
        }
    }

    /// `(width, height)` shared by all planes.
    pub fn dimensions(&self) -> (u32, u32) {
        self.hue.dimensions()
    }
}

/// RGB to full-range HSV.
fn hsv_full([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = max - min;

    let saturation = if max == 0 {
        0
    } else {
        (255 * diff + max / 2) / max
    };

    let hue = if diff == 0 {
        0
    } else {
        let diff = diff as f64;
        let mut degrees = if max == r {
            60.0 * (g - b) as f64 / diff
        } else if max == g {
            120.0 + 60.0 * (b - r) as f64 / diff
        } else {
            240.0 + 60.0 * (r - g) as f64 / diff
        };
        if degrees < 0.0 {
            degrees += 360.0;
        }
        ((degrees * 256.0 / 360.0).round() as i32).min(255)
    };

    [hue as u8, saturation as u8, max as u8]
}

/// Laplacian of a plane, saturated to 0..=255.
fn laplacian_u8(plane: &GrayImage) -> GrayImage {
    let response: ImageBuffer<Luma<f32>, Vec<f32>> = filter3x3(plane, &LAPLACIAN_KERNEL);
    let (width, height) = response.dimensions();
    let data = response
        .into_raw()
        .into_iter()
        .map(|v| v.round().clamp(0.0, 255.0) as u8)
        .collect();

    GrayImage::from_raw(width, height, data).unwrap_or_else(|| GrayImage::new(width, height))
}
