//! Pyramidal TIFF and Aperio SVS reader.
//!
//! # File Structure
//!
//! A WSI TIFF holds several IFDs, but not all of them are pyramid levels:
//! - **Pyramid levels**: tiled images, the largest being level 0
//! - **Thumbnail, label, macro**: small stripped images
//!
//! Levels are the tiled IFDs sorted by width. A plain TIFF without any tiled
//! IFD is read as a single-level pyramid from its first image, so stripped
//! rasters written by this crate can be opened as slides too.
//!
//! # Metadata
//!
//! Aperio stores the calibration in the first IFD's ImageDescription as a
//! pipe-separated list (`...|AppMag = 20|MPP = 0.4990|...`). Other files fall
//! back to the XResolution/YResolution tags.
//!
//! Decoded chunks are kept in an LRU cache, since neighbouring region reads
//! usually overlap the same tiles.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{Rgb, RgbImage};
use lru::LruCache;
use tiff::decoder::ifd::Value;
use tiff::decoder::{ChunkType, Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::debug;

use crate::error::SlideError;
use crate::geometry::{Coordinate, PixelSize};

use super::properties::{
    level_property, PROPERTY_COMMENT, PROPERTY_LEVEL_COUNT, PROPERTY_MPP_X, PROPERTY_MPP_Y,
    PROPERTY_VENDOR,
};
use super::reader::{LevelInfo, SlideReader};

// =============================================================================
// Constants
// =============================================================================

/// Maximum number of IFDs to inspect (safety limit)
const MAX_IFDS: usize = 100;

/// Default number of decoded chunks kept per slide.
pub const DEFAULT_CHUNK_CACHE_CAPACITY: usize = 64;

/// TIFF ResolutionUnit values
const RESOLUTION_UNIT_INCH: u16 = 2;
const RESOLUTION_UNIT_CENTIMETER: u16 = 3;

// =============================================================================
// Aperio Metadata
// =============================================================================

/// Metadata parsed from an Aperio ImageDescription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AperioDescription {
    /// Microns per pixel (same on both axes)
    pub mpp: Option<f64>,

    /// Objective magnification (e.g., 20, 40)
    pub magnification: Option<f64>,

    /// Whether the description carries the Aperio marker
    pub is_aperio: bool,
}

impl AperioDescription {
    /// Parse the pipe-separated `key = value` pairs of a description.
    pub fn parse(description: &str) -> Self {
        let mut parsed = AperioDescription {
            is_aperio: description.contains("Aperio"),
            ..Default::default()
        };

        for part in description.split('|') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            match key.trim() {
                "MPP" => parsed.mpp = value.trim().parse().ok(),
                "AppMag" => parsed.magnification = value.trim().parse().ok(),
                _ => {}
            }
        }

        parsed
    }
}

// =============================================================================
// Level Data
// =============================================================================

#[derive(Debug, Clone)]
struct LevelData {
    ifd_index: usize,
    info: LevelInfo,
    samples: usize,
}

/// One decoded chunk: interleaved 8-bit samples.
struct Chunk {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

// =============================================================================
// TiffSlide
// =============================================================================

/// Region reader for pyramidal TIFF and SVS files on local disk.
pub struct TiffSlide {
    path: PathBuf,
    decoder: Decoder<BufReader<File>>,
    levels: Vec<LevelData>,
    properties: BTreeMap<String, String>,
    chunks: LruCache<(usize, u32), Arc<Chunk>>,
}

impl TiffSlide {
    /// Open a slide with the default chunk cache capacity.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SlideError> {
        Self::open_with_cache(path, DEFAULT_CHUNK_CACHE_CAPACITY)
    }

    /// Open a slide and identify its pyramid levels.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not a TIFF, or holds
    /// no image usable as level 0.
    pub fn open_with_cache(path: impl AsRef<Path>, cache_capacity: usize) -> Result<Self, SlideError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| SlideError::Io {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let mut decoder = Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited());

        let mut tiled = Vec::new();
        let mut first = None;
        let mut description = None;
        let mut resolution = None;

        for ifd_index in 0..MAX_IFDS {
            if ifd_index == 0 {
                description = decoder.get_tag_ascii_string(Tag::ImageDescription).ok();
                resolution = read_resolution(&mut decoder);
            }

            let level = read_level(&mut decoder, ifd_index)?;
            match level {
                Some((data, true)) => tiled.push(data),
                Some((data, false)) if ifd_index == 0 => first = Some(data),
                _ => {}
            }

            if !decoder.more_images() {
                break;
            }
            decoder.next_image()?;
        }

        let mut levels = if tiled.is_empty() {
            first.into_iter().collect::<Vec<_>>()
        } else {
            tiled
        };
        if levels.is_empty() {
            return Err(SlideError::NoLevels(path));
        }

        levels.sort_by(|a, b| b.info.width.cmp(&a.info.width));
        let (base_width, base_height) = (levels[0].info.width as f64, levels[0].info.height as f64);
        for level in &mut levels {
            level.info.downsample = (base_width / level.info.width as f64
                + base_height / level.info.height as f64)
                / 2.0;
        }

        let properties = build_properties(&levels, description.as_deref(), resolution);
        debug!(
            path = %path.display(),
            levels = levels.len(),
            "Opened TIFF slide"
        );

        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            path,
            decoder,
            levels,
            properties,
            chunks: LruCache::new(capacity),
        })
    }

    /// Path this slide was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get complete information about a level.
    pub fn level_info(&self, level: usize) -> Option<LevelInfo> {
        self.levels.get(level).map(|l| l.info)
    }

    fn chunk(&mut self, level: usize, index: u32) -> Result<Arc<Chunk>, SlideError> {
        if let Some(chunk) = self.chunks.get(&(level, index)) {
            return Ok(Arc::clone(chunk));
        }

        let data = &self.levels[level];
        let samples = data.samples;
        self.decoder.seek_to_image(data.ifd_index)?;
        let (_, rows) = self.decoder.chunk_data_dimensions(index);
        let buffer = match self.decoder.read_chunk(index)? {
            DecodingResult::U8(buffer) => buffer,
            _ => {
                return Err(SlideError::UnsupportedColor(format!(
                    "non 8-bit samples in {}",
                    self.path.display()
                )))
            }
        };

        let height = rows.max(1) as usize;
        let width = buffer.len() / (height * samples);
        let chunk = Arc::new(Chunk {
            width,
            height,
            data: buffer,
        });
        self.chunks.put((level, index), Arc::clone(&chunk));
        Ok(chunk)
    }
}

impl SlideReader for TiffSlide {
    fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.levels
            .get(level)
            .map(|l| (l.info.width, l.info.height))
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.levels.get(level).map(|l| l.info.downsample)
    }

    fn read_region(
        &mut self,
        origin: Coordinate,
        level: usize,
        size: PixelSize,
    ) -> Result<RgbImage, SlideError> {
        let data = self
            .levels
            .get(level)
            .cloned()
            .ok_or(SlideError::InvalidLevel {
                level,
                max_levels: self.levels.len(),
            })?;
        let info = data.info;

        let left = (origin.x as f64 / info.downsample).floor() as i64;
        let top = (origin.y as f64 / info.downsample).floor() as i64;
        let mut region = RgbImage::new(size.width, size.height);

        let x0 = left.max(0);
        let y0 = top.max(0);
        let x1 = (left + size.width as i64).min(info.width as i64);
        let y1 = (top + size.height as i64).min(info.height as i64);
        if x0 >= x1 || y0 >= y1 {
            return Ok(region);
        }

        let tile_width = info.tile_width.max(1) as i64;
        let tile_height = info.tile_height.max(1) as i64;
        let (tiles_x, _) = info.tile_count();

        for tile_y in (y0 / tile_height)..=((y1 - 1) / tile_height) {
            for tile_x in (x0 / tile_width)..=((x1 - 1) / tile_width) {
                let index = (tile_y as u32) * tiles_x + tile_x as u32;
                let chunk = self.chunk(level, index)?;

                let chunk_left = tile_x * tile_width;
                let chunk_top = tile_y * tile_height;
                let px_start = x0.max(chunk_left);
                let px_end = x1.min(chunk_left + chunk.width as i64);
                let py_start = y0.max(chunk_top);
                let py_end = y1.min(chunk_top + chunk.height as i64);

                for py in py_start..py_end {
                    let row = (py - chunk_top) as usize * chunk.width;
                    for px in px_start..px_end {
                        let offset = (row + (px - chunk_left) as usize) * data.samples;
                        let pixel = if data.samples == 1 {
                            let v = chunk.data[offset];
                            Rgb([v, v, v])
                        } else {
                            Rgb([
                                chunk.data[offset],
                                chunk.data[offset + 1],
                                chunk.data[offset + 2],
                            ])
                        };
                        region.put_pixel((px - left) as u32, (py - top) as u32, pixel);
                    }
                }
            }
        }

        Ok(region)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Inspect the current IFD. Returns the level data and whether it is tiled,
/// or `None` for images that cannot be read as RGB.
fn read_level(
    decoder: &mut Decoder<BufReader<File>>,
    ifd_index: usize,
) -> Result<Option<(LevelData, bool)>, SlideError> {
    let (width, height) = decoder.dimensions()?;
    let samples = match decoder.colortype()? {
        ColorType::Gray(8) => 1,
        ColorType::RGB(8) | ColorType::YCbCr(8) => 3,
        ColorType::RGBA(8) => 4,
        other => {
            debug!(ifd_index, ?other, "Skipping IFD with unsupported color type");
            return Ok(None);
        }
    };
    let tiled = matches!(decoder.get_chunk_type(), ChunkType::Tile);
    let (tile_width, tile_height) = decoder.chunk_dimensions();

    Ok(Some((
        LevelData {
            ifd_index,
            info: LevelInfo {
                width,
                height,
                tile_width,
                tile_height,
                downsample: 1.0,
            },
            samples,
        },
        tiled,
    )))
}

/// Microns per pixel from the resolution tags of the current IFD.
fn read_resolution(decoder: &mut Decoder<BufReader<File>>) -> Option<(f64, f64)> {
    let unit = match decoder.find_tag(Tag::ResolutionUnit).ok().flatten() {
        Some(Value::Short(unit)) => unit,
        Some(Value::Unsigned(unit)) => u16::try_from(unit).unwrap_or(0),
        _ => RESOLUTION_UNIT_INCH,
    };
    let microns_per_unit = match unit {
        RESOLUTION_UNIT_CENTIMETER => 10_000.0,
        RESOLUTION_UNIT_INCH => 25_400.0,
        _ => return None,
    };

    let mut per_axis = |tag| match decoder.find_tag(tag).ok().flatten() {
        Some(Value::Rational(n, d)) if n > 0 && d > 0 => Some(microns_per_unit * d as f64 / n as f64),
        _ => None,
    };
    let x = per_axis(Tag::XResolution)?;
    let y = per_axis(Tag::YResolution)?;
    Some((x, y))
}

fn build_properties(
    levels: &[LevelData],
    description: Option<&str>,
    resolution: Option<(f64, f64)>,
) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    properties.insert(PROPERTY_LEVEL_COUNT.to_string(), levels.len().to_string());

    for (index, level) in levels.iter().enumerate() {
        let info = level.info;
        properties.insert(level_property(index, "width"), info.width.to_string());
        properties.insert(level_property(index, "height"), info.height.to_string());
        properties.insert(level_property(index, "downsample"), info.downsample.to_string());
        properties.insert(level_property(index, "tile-width"), info.tile_width.to_string());
        properties.insert(level_property(index, "tile-height"), info.tile_height.to_string());
    }

    let aperio = description.map(AperioDescription::parse).unwrap_or_default();
    if let Some(text) = description {
        properties.insert(PROPERTY_COMMENT.to_string(), text.to_string());
        properties.insert("tiff.ImageDescription".to_string(), text.to_string());
    }
    properties.insert(
        PROPERTY_VENDOR.to_string(),
        if aperio.is_aperio { "aperio" } else { "generic-tiff" }.to_string(),
    );
    if let Some(magnification) = aperio.magnification {
        properties.insert("aperio.AppMag".to_string(), magnification.to_string());
    }

    let mpp = aperio.mpp.map(|mpp| (mpp, mpp)).or(resolution);
    if let Some((x, y)) = mpp {
        properties.insert(PROPERTY_MPP_X.to_string(), x.to_string());
        properties.insert(PROPERTY_MPP_Y.to_string(), y.to_string());
    }

    properties
}

// =============================================================================
// Tests
// =============================================================================
