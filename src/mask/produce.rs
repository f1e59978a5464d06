//! Per-slide mask production.
//!
//! One [`MaskTask`] describes one slide. Processing reads the whole bounded
//! slide at the level closest to the task downsample, derives both masks at
//! that resolution, and persists masks, previews and parameter dumps under
//! an [`OutputLayout`].

use std::fs;
use std::path::{Path, PathBuf};

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::MaskError;
use crate::geometry::{select_level, MaskType, PixelSize};
use crate::raster::{write_mask_bigtiff, write_preview, DEFAULT_PREVIEW_RATIO};
use crate::slide::{SlideProperties, SlideReader, TiffSlide};

use super::annotation::{build_annotation_mask, PolygonGroup};
use super::channels::HsvlChannels;
use super::specimen::{build_specimen_mask, SpecimenOptions};

/// Default downsample at which masks are produced.
pub const DEFAULT_MASK_DOWNSAMPLE: f64 = 12.0;

// =============================================================================
// Task and layout
// =============================================================================

/// Everything a worker needs to produce the masks of one slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskTask {
    pub slide_id: String,
    pub slide_path: PathBuf,
    pub downsample: f64,
    pub options: SpecimenOptions,
    pub coordinates: Vec<PolygonGroup>,
}

/// Directory tree that receives mask outputs.
///
/// ```text
/// {root}/spec/{mask,dump,preview}/{id}.{tif,dump,png}
/// {root}/anno/{mask,dump,preview}/{id}.{tif,dump,png}
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mask_path(&self, mask: MaskType, slide_id: &str) -> PathBuf {
        self.file_path(mask, "mask", slide_id, "tif")
    }

    pub fn dump_path(&self, mask: MaskType, slide_id: &str) -> PathBuf {
        self.file_path(mask, "dump", slide_id, "dump")
    }

    pub fn preview_path(&self, mask: MaskType, slide_id: &str) -> PathBuf {
        self.file_path(mask, "preview", slide_id, "png")
    }

    /// Create every output directory that does not exist yet.
    pub fn prepare(&self) -> Result<(), MaskError> {
        for mask in MaskType::ALL {
            for kind in ["mask", "dump", "preview"] {
                let dir = self.root.join(mask.stem()).join(kind);
                fs::create_dir_all(&dir).map_err(|e| MaskError::Io {
                    path: dir.clone(),
                    message: e.to_string(),
                })?;
            }
        }
        Ok(())
    }

    fn file_path(&self, mask: MaskType, kind: &str, slide_id: &str, extension: &str) -> PathBuf {
        self.root
            .join(mask.stem())
            .join(kind)
            .join(format!("{}.{}", slide_id, extension))
    }
}

// =============================================================================
// Production
// =============================================================================

/// Masks of one slide with the level image they were derived from.
#[derive(Debug, Clone)]
pub struct ProducedMasks {
    pub level: usize,
    pub level_downsample: f64,
    pub image: RgbImage,
    pub specimen: GrayImage,
    pub annotation: GrayImage,
}

/// Paths written for one slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskOutputs {
    pub slide_id: String,
    pub specimen_mask: PathBuf,
    pub annotation_mask: PathBuf,
}

/// Build specimen and annotation masks for the bounded slide area.
///
/// The level is the one whose downsample is closest to `downsample` in log
/// space; the mask canvas is the bounds divided by that level's downsample.
pub fn produce_masks<S: SlideReader + ?Sized>(
    slide: &mut S,
    downsample: f64,
    options: &SpecimenOptions,
    coordinates: &[PolygonGroup],
) -> Result<ProducedMasks, MaskError> {
    if !downsample.is_finite() || downsample <= 0.0 {
        return Err(MaskError::InvalidDownsample(downsample));
    }
    options.blur.validate()?;

    let bounds = SlideProperties::parse_bounds(slide.properties())?;
    let downsamples = slide.level_downsamples();
    let level = select_level(&downsamples, downsample)
        .ok_or(MaskError::InvalidDownsample(downsample))?;
    let level_downsample = downsamples[level];

    let canvas = PixelSize::new(
        ((bounds.width as f64 / level_downsample).round() as u32).max(1),
        ((bounds.height as f64 / level_downsample).round() as u32).max(1),
    );
    debug!(
        level,
        level_downsample,
        width = canvas.width,
        height = canvas.height,
        "Selected mask level"
    );

    let image = slide.read_region(bounds.origin(), level, canvas)?;
    let channels = HsvlChannels::from_rgb(&image);
    let specimen = build_specimen_mask(&channels, &options.criteria, &options.blur)?;
    let annotation = build_annotation_mask(canvas, level_downsample, coordinates);

    Ok(ProducedMasks {
        level,
        level_downsample,
        image,
        specimen,
        annotation,
    })
}

/// Persist masks, previews and parameter dumps of one slide.
pub fn save_masks(
    layout: &OutputLayout,
    slide_id: &str,
    produced: &ProducedMasks,
    options: &SpecimenOptions,
    coordinates: &[PolygonGroup],
) -> Result<MaskOutputs, MaskError> {
    layout.prepare()?;

    let specimen_mask = layout.mask_path(MaskType::Specimen, slide_id);
    let annotation_mask = layout.mask_path(MaskType::Annotation, slide_id);

    write_preview(
        layout.preview_path(MaskType::Specimen, slide_id),
        &produced.image,
        &produced.specimen,
        DEFAULT_PREVIEW_RATIO,
    )?;
    write_preview(
        layout.preview_path(MaskType::Annotation, slide_id),
        &produced.image,
        &produced.annotation,
        DEFAULT_PREVIEW_RATIO,
    )?;
    write_mask_bigtiff(&specimen_mask, &produced.specimen)?;
    write_mask_bigtiff(&annotation_mask, &produced.annotation)?;
    write_dump(&layout.dump_path(MaskType::Specimen, slide_id), options)?;
    write_dump(&layout.dump_path(MaskType::Annotation, slide_id), coordinates)?;

    Ok(MaskOutputs {
        slide_id: slide_id.to_string(),
        specimen_mask,
        annotation_mask,
    })
}

/// Open the task's slide, produce its masks and persist them.
pub fn process_task(task: &MaskTask, layout: &OutputLayout) -> Result<MaskOutputs, MaskError> {
    info!(slide_id = %task.slide_id, path = %task.slide_path.display(), "Producing masks");

    let mut slide = TiffSlide::open(&task.slide_path)?;
    let produced = produce_masks(&mut slide, task.downsample, &task.options, &task.coordinates)?;
    let outputs = save_masks(
        layout,
        &task.slide_id,
        &produced,
        &task.options,
        &task.coordinates,
    )?;

    info!(
        slide_id = %task.slide_id,
        level = produced.level,
        "Masks written"
    );
    Ok(outputs)
}

fn write_dump<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), MaskError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).map_err(|e| MaskError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
