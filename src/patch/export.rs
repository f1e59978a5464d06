//! Writing accepted patches to disk.

use std::fs;
use std::path::Path;

use image::{GrayImage, RgbImage};
use tracing::{debug, info};

use crate::error::{ImportError, RasterError};
use crate::geometry::{Coordinate, MaskType};
use crate::slide::SlideReader;

use super::importer::{PatchImporter, RegionOptions, DEFAULT_PASS_RATIO};

/// Candidate filtering for [`export_patches`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportOptions {
    /// Maximum number of patches to write
    pub count: usize,

    /// Foreground fraction a mask patch must exceed
    pub pass_ratio: f64,

    /// Also require the annotation mask to pass
    pub require_annotation: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            count: 100,
            pass_ratio: DEFAULT_PASS_RATIO,
            require_annotation: false,
        }
    }
}

/// Filter `candidates` by mask usability and write the first accepted ones.
///
/// Each accepted patch produces `{index}_{x}_{y}_image.png`,
/// `{index}_{x}_{y}_spec.png` and `{index}_{x}_{y}_anno.png` in `output_dir`.
/// Candidates keep their input order, so a shuffled candidate set yields a
/// random sample. Returns the accepted coordinates.
pub fn export_patches<S: SlideReader>(
    importer: &mut PatchImporter<S>,
    candidates: &[Coordinate],
    options: &ExportOptions,
    output_dir: impl AsRef<Path>,
) -> Result<Vec<Coordinate>, ImportError> {
    if importer.geometry().is_none() {
        return Err(ImportError::NotConfigured);
    }
    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir).map_err(|e| RasterError::Io {
        path: output_dir.to_path_buf(),
        message: e.to_string(),
    })?;

    let specimen = importer.is_usable_mask(MaskType::Specimen, candidates, options.pass_ratio, None);
    let annotation = if options.require_annotation {
        importer.is_usable_mask(MaskType::Annotation, candidates, options.pass_ratio, None)
    } else {
        vec![true; candidates.len()]
    };

    let accepted: Vec<Coordinate> = candidates
        .iter()
        .zip(specimen.iter().zip(annotation.iter()))
        .filter(|(_, (&spec, &anno))| spec && anno)
        .map(|(&coordinate, _)| coordinate)
        .take(options.count)
        .collect();
    debug!(
        candidates = candidates.len(),
        accepted = accepted.len(),
        "Filtered candidates by mask"
    );

    let region = RegionOptions::default();
    for (index, &coordinate) in accepted.iter().enumerate() {
        let stem = format!("{}_{}_{}", index, coordinate.x, coordinate.y);

        let image = importer.load_image(coordinate, &region)?;
        save_rgb(&output_dir.join(format!("{}_image.png", stem)), &image)?;

        for mask in MaskType::ALL {
            let patch = importer.load_mask(mask, coordinate, &region)?;
            save_gray(
                &output_dir.join(format!("{}_{}.png", stem, mask.stem())),
                &patch,
            )?;
        }
    }

    info!(
        written = accepted.len(),
        output = %output_dir.display(),
        "Exported patches"
    );
    Ok(accepted)
}

fn save_rgb(path: &Path, image: &RgbImage) -> Result<(), RasterError> {
    image.save(path).map_err(|e| image_error(path, e))
}

fn save_gray(path: &Path, image: &GrayImage) -> Result<(), RasterError> {
    image.save(path).map_err(|e| image_error(path, e))
}

fn image_error(path: &Path, err: image::ImageError) -> RasterError {
    RasterError::Image {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
