//! Mask raster codec.
//!
//! Masks are stored as 3-channel 8-bit BigTIFF, LZW compressed, with
//! foreground 255 and background 0 replicated on every channel. Reading
//! keeps only the first channel.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use image::imageops;
use image::GrayImage;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, Compression, TiffEncoder};
use tiff::ColorType;

use crate::error::RasterError;
use crate::geometry::PixelSize;

/// Foreground value of a stored mask.
pub const MASK_FOREGROUND: u8 = 255;

/// A mask raster held in memory as a single channel.
#[derive(Debug, Clone)]
pub struct MaskRaster {
    image: GrayImage,
}

impl MaskRaster {
    /// Wrap an in-memory mask.
    pub fn from_image(image: GrayImage) -> Self {
        Self { image }
    }

    /// Read the first channel of a mask TIFF.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable, is not 8-bit, or has no
    /// pixels.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RasterError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| RasterError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let tiff_error = |e: tiff::TiffError| RasterError::Tiff {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(tiff_error)?
            .with_limits(Limits::unlimited());
        let (width, height) = decoder.dimensions().map_err(tiff_error)?;
        if width == 0 || height == 0 {
            return Err(RasterError::Empty(path.to_path_buf()));
        }

        let samples = match decoder.colortype().map_err(tiff_error)? {
            ColorType::Gray(8) => 1,
            ColorType::RGB(8) => 3,
            ColorType::RGBA(8) => 4,
            other => return Err(unsupported(path, format!("color type {:?}", other))),
        };
        let data = match decoder.read_image().map_err(tiff_error)? {
            DecodingResult::U8(data) => data,
            _ => return Err(unsupported(path, "non 8-bit samples".to_string())),
        };

        let channel: Vec<u8> = data.iter().step_by(samples).copied().collect();
        let image = GrayImage::from_raw(width, height, channel)
            .ok_or_else(|| unsupported(path, "truncated pixel data".to_string()))?;

        Ok(Self { image })
    }

    /// `(width, height)` of the raster.
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    /// Copy the window with top-left `(x, y)`, clipped to the raster.
    ///
    /// `x` indexes columns and `y` rows. Returns `None` when nothing of the
    /// window lies inside the raster.
    pub fn window(&self, x: u32, y: u32, size: PixelSize) -> Option<GrayImage> {
        let (width, height) = self.image.dimensions();
        let x0 = x.min(width);
        let y0 = y.min(height);
        let x1 = x.saturating_add(size.width).min(width);
        let y1 = y.saturating_add(size.height).min(height);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }

        Some(imageops::crop_imm(&self.image, x0, y0, x1 - x0, y1 - y0).to_image())
    }
}

fn unsupported(path: &Path, message: String) -> RasterError {
    RasterError::Unsupported {
        path: path.to_path_buf(),
        message,
    }
}

/// Write a mask as a 3-channel LZW BigTIFF.
///
/// Non-zero input pixels become [`MASK_FOREGROUND`]. The file is stored in
/// strips, not 256x256 tiles: the `tiff` encoder has no tiled output. Readers
/// that only accept tiled pyramids will not open it; [`MaskRaster::open`]
/// reads either layout.
pub fn write_mask_bigtiff(path: impl AsRef<Path>, mask: &GrayImage) -> Result<(), RasterError> {
    let path: PathBuf = path.as_ref().to_path_buf();
    let tiff_error = |e: tiff::TiffError| RasterError::Tiff {
        path: path.clone(),
        message: e.to_string(),
    };

    let file = File::create(&path).map_err(|e| RasterError::Io {
        path: path.clone(),
        message: e.to_string(),
    })?;

    let rgb: Vec<u8> = mask
        .as_raw()
        .iter()
        .flat_map(|&v| {
            let v = if v > 0 { MASK_FOREGROUND } else { 0 };
            [v, v, v]
        })
        .collect();

    let mut encoder = TiffEncoder::new_big(BufWriter::new(file))
        .map_err(tiff_error)?
        .with_compression(Compression::Lzw);
    encoder
        .write_image::<colortype::RGB8>(mask.width(), mask.height(), &rgb)
        .map_err(tiff_error)?;

    Ok(())
}
