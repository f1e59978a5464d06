//! Test utilities for integration tests.
//!
//! This module writes small slide and mask files to disk: a tiled,
//! uncompressed RGB pyramid with an Aperio description, and mask TIFFs
//! produced by the crate's own writer.

use std::fs;
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma, Rgb, RgbImage};

use wsi_prepro::write_mask_bigtiff;

// =============================================================================
// Fixture Colours
// =============================================================================

/// Tissue colour of even rows.
pub const TISSUE_LIGHT: Rgb<u8> = Rgb([220, 120, 180]);

/// Tissue colour of odd rows.
pub const TISSUE_DARK: Rgb<u8> = Rgb([150, 60, 120]);

/// Glass background.
pub const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Level-0 size of the fixture slide.
pub const SLIDE_WIDTH: u32 = 256;
pub const SLIDE_HEIGHT: u32 = 192;

/// Microns per pixel written to the fixture description.
pub const SLIDE_MPP: f64 = 0.5;

/// Striped tissue on the left half of the level, glass on the right.
///
/// Every level is drawn at its own resolution so that the stripes stay one
/// pixel high and carry a strong Laplacian response.
pub fn slide_level(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        if x >= width / 2 {
            BACKGROUND
        } else if y % 2 == 0 {
            TISSUE_LIGHT
        } else {
            TISSUE_DARK
        }
    })
}

// =============================================================================
// Tiled TIFF Builder
// =============================================================================

const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;

/// Builder for little-endian tiled RGB TIFF pyramids.
pub struct PyramidBuilder {
    description: Option<String>,
    levels: Vec<(RgbImage, u32)>,
}

impl PyramidBuilder {
    pub fn new() -> Self {
        Self {
            description: None,
            levels: Vec::new(),
        }
    }

    /// ImageDescription of the first IFD.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a level stored in square tiles of `tile_size`.
    pub fn add_level(mut self, image: RgbImage, tile_size: u32) -> Self {
        self.levels.push((image, tile_size));
        self
    }

    /// Build the TIFF file data.
    pub fn build(self) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(b"II");
        data.extend(42u16.to_le_bytes());
        let mut next_pointer = data.len();
        data.extend(0u32.to_le_bytes());

        for (index, (image, tile_size)) in self.levels.iter().enumerate() {
            let description = if index == 0 {
                self.description.as_deref()
            } else {
                None
            };

            // Tile payloads first, then the out-of-line tag values
            let tiles = split_tiles(image, *tile_size);
            let mut tile_offsets = Vec::with_capacity(tiles.len());
            let mut tile_counts = Vec::with_capacity(tiles.len());
            for tile in &tiles {
                align(&mut data);
                tile_offsets.push(data.len() as u32);
                tile_counts.push(tile.len() as u32);
                data.extend(tile);
            }

            let mut entries = vec![
                Entry::long(256, image.width()),
                Entry::long(257, image.height()),
                Entry::external(258, TYPE_SHORT, 3, shorts(&[8, 8, 8]), &mut data),
                Entry::short(259, 1),
                Entry::short(262, 2),
                Entry::short(277, 3),
                Entry::short(284, 1),
                Entry::short(322, *tile_size as u16),
                Entry::short(323, *tile_size as u16),
                Entry::longs(324, &tile_offsets, &mut data),
                Entry::longs(325, &tile_counts, &mut data),
            ];
            if let Some(text) = description {
                let mut bytes = text.as_bytes().to_vec();
                bytes.push(0);
                let count = bytes.len() as u32;
                entries.push(Entry::external(270, TYPE_ASCII, count, bytes, &mut data));
            }
            entries.sort_by_key(|e| e.tag);

            align(&mut data);
            let ifd_offset = data.len() as u32;
            data[next_pointer..next_pointer + 4].copy_from_slice(&ifd_offset.to_le_bytes());

            data.extend((entries.len() as u16).to_le_bytes());
            for entry in &entries {
                data.extend(entry.tag.to_le_bytes());
                data.extend(entry.field_type.to_le_bytes());
                data.extend(entry.count.to_le_bytes());
                data.extend(entry.value);
            }
            next_pointer = data.len();
            data.extend(0u32.to_le_bytes());
        }

        data
    }
}

impl Default for PyramidBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Entry {
    tag: u16,
    field_type: u16,
    count: u32,
    value: [u8; 4],
}

impl Entry {
    fn short(tag: u16, value: u16) -> Self {
        let mut field = [0u8; 4];
        field[..2].copy_from_slice(&value.to_le_bytes());
        Self {
            tag,
            field_type: TYPE_SHORT,
            count: 1,
            value: field,
        }
    }

    fn long(tag: u16, value: u32) -> Self {
        Self {
            tag,
            field_type: TYPE_LONG,
            count: 1,
            value: value.to_le_bytes(),
        }
    }

    fn longs(tag: u16, values: &[u32], data: &mut Vec<u8>) -> Self {
        if values.len() == 1 {
            return Self::long(tag, values[0]);
        }
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::external(tag, TYPE_LONG, values.len() as u32, bytes, data)
    }

    /// Value stored after the current end of `data`.
    fn external(tag: u16, field_type: u16, count: u32, bytes: Vec<u8>, data: &mut Vec<u8>) -> Self {
        align(data);
        let offset = data.len() as u32;
        data.extend(bytes);
        Self {
            tag,
            field_type,
            count,
            value: offset.to_le_bytes(),
        }
    }
}

fn shorts(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// TIFF offsets must be word aligned.
fn align(data: &mut Vec<u8>) {
    if data.len() % 2 == 1 {
        data.push(0);
    }
}

/// Row-major tiles, each padded with black to the full tile size.
fn split_tiles(image: &RgbImage, tile_size: u32) -> Vec<Vec<u8>> {
    let tiles_x = image.width().div_ceil(tile_size);
    let tiles_y = image.height().div_ceil(tile_size);

    let mut tiles = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for tile_y in 0..tiles_y {
        for tile_x in 0..tiles_x {
            let mut tile = Vec::with_capacity((tile_size * tile_size * 3) as usize);
            for y in 0..tile_size {
                for x in 0..tile_size {
                    let (px, py) = (tile_x * tile_size + x, tile_y * tile_size + y);
                    if px < image.width() && py < image.height() {
                        tile.extend(image.get_pixel(px, py).0);
                    } else {
                        tile.extend([0, 0, 0]);
                    }
                }
            }
            tiles.push(tile);
        }
    }
    tiles
}

// =============================================================================
// Fixture Files
// =============================================================================

/// Three-level Aperio-style pyramid: 256x192, 128x96 and 64x48.
///
/// The middle level has a partial bottom tile row; the last level is a
/// single padded tile.
pub fn create_test_slide() -> Vec<u8> {
    PyramidBuilder::new()
        .with_description(format!(
            "Aperio Image Library v12.0.0\r\n{}x{} (64x64) RGB|AppMag = 20|MPP = {}",
            SLIDE_WIDTH, SLIDE_HEIGHT, SLIDE_MPP
        ))
        .add_level(slide_level(SLIDE_WIDTH, SLIDE_HEIGHT), 64)
        .add_level(slide_level(SLIDE_WIDTH / 2, SLIDE_HEIGHT / 2), 64)
        .add_level(slide_level(SLIDE_WIDTH / 4, SLIDE_HEIGHT / 4), 64)
        .build()
}

/// Write the test slide to `dir/name`.
pub fn write_test_slide(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, create_test_slide()).unwrap();
    path
}

/// Mask raster with foreground where `inside(x, y)` holds.
pub fn mask_image(width: u32, height: u32, inside: impl Fn(u32, u32) -> bool) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        if inside(x, y) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Write a mask TIFF the way mask production does.
pub fn write_test_mask(dir: &Path, name: &str, mask: &GrayImage) -> PathBuf {
    let path = dir.join(name);
    write_mask_bigtiff(&path, mask).unwrap();
    path
}

/// Slide plus masks aligned with it.
///
/// - specimen: 64x48 (scale 4), foreground on the left half
/// - annotation: 32x24 (scale 8), foreground on the top-left quadrant
pub fn write_sample_set(dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
    let slide = write_test_slide(dir, "slide.svs");
    let specimen = write_test_mask(dir, "spec.tif", &mask_image(64, 48, |x, _| x < 32));
    let annotation = write_test_mask(
        dir,
        "anno.tif",
        &mask_image(32, 24, |x, y| x < 16 && y < 12),
    );
    (slide, specimen, annotation)
}

// =============================================================================
// Validation Helpers
// =============================================================================

/// Check for the BigTIFF magic (`II` + 43 or `MM` + 43).
pub fn is_bigtiff_magic(data: &[u8]) -> bool {
    data.len() >= 4
        && ((data[0..2] == *b"II" && data[2..4] == [43, 0])
            || (data[0..2] == *b"MM" && data[2..4] == [0, 43]))
}

/// Check for the PNG signature.
pub fn is_png(data: &[u8]) -> bool {
    data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
}
