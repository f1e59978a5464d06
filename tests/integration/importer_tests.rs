//! Patch importer integration tests.
//!
//! Tests verify:
//! - A tiled pyramid opens with its levels and calibration
//! - Opening fails as a whole when one of the three files is unusable
//! - Configure picks the level and grid for micron-sized patches
//! - Image and mask lookups read the aligned locations
//! - Export writes only patches that pass the mask filters

use std::collections::HashSet;
use std::fs;

use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::SeedableRng;

use wsi_prepro::{
    export_patches, Coordinate, ExportOptions, ImportError, MaskRaster, MaskType, MicronSize,
    PatchImporter, PatchSettings, PixelSize, RegionOptions, SlideReader, TiffSlide,
};

use super::test_utils::{
    is_png, write_sample_set, write_test_slide, PyramidBuilder, BACKGROUND, SLIDE_HEIGHT,
    SLIDE_MPP, SLIDE_WIDTH, TISSUE_DARK, TISSUE_LIGHT,
};

/// 32 micron patches (64 px at level 0) sampled every 32 microns, written
/// at 16x16.
fn settings() -> PatchSettings {
    PatchSettings {
        patch_microns: MicronSize::square(32.0),
        interval_microns: MicronSize::square(32.0),
        output_size: PixelSize::square(16),
    }
}

fn open_configured(dir: &std::path::Path) -> (PatchImporter, Vec<Coordinate>) {
    let (slide, specimen, annotation) = write_sample_set(dir);
    let mut importer = PatchImporter::open(&slide, &specimen, &annotation).unwrap();
    let candidates = importer
        .configure(&settings(), &mut StdRng::seed_from_u64(11))
        .unwrap();
    (importer, candidates.coordinates)
}

// =============================================================================
// Slide Reading
// =============================================================================

#[test]
fn test_tiled_pyramid_levels() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_test_slide(dir.path(), "slide.svs");

    let slide = TiffSlide::open(&path).unwrap();
    assert_eq!(slide.level_count(), 3);
    assert_eq!(slide.dimensions(), Some((SLIDE_WIDTH, SLIDE_HEIGHT)));
    assert_eq!(slide.level_dimensions(1), Some((128, 96)));
    assert_eq!(slide.level_downsamples(), vec![1.0, 2.0, 4.0]);

    let properties = slide.slide_properties().unwrap();
    assert_eq!(properties.calibration.mpp_x, SLIDE_MPP);
    assert_eq!(properties.bounds.width, SLIDE_WIDTH);
    assert_eq!(properties.bounds.height, SLIDE_HEIGHT);
}

#[test]
fn test_region_across_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_test_slide(dir.path(), "slide.svs");
    let mut slide = TiffSlide::open(&path).unwrap();

    // Level 1 origin (48, 48): spans four tiles, including the partial row
    let region = slide
        .read_region(Coordinate::new(96, 96), 1, PixelSize::square(32))
        .unwrap();

    assert_eq!(region.get_pixel(15, 0), &TISSUE_LIGHT);
    assert_eq!(region.get_pixel(15, 1), &TISSUE_DARK);
    assert_eq!(region.get_pixel(16, 0), &BACKGROUND);
    assert_eq!(region.get_pixel(0, 16), &TISSUE_LIGHT);
    assert_eq!(region.get_pixel(0, 17), &TISSUE_DARK);
    assert_eq!(region.get_pixel(31, 31), &BACKGROUND);
}

// =============================================================================
// Opening
// =============================================================================

#[test]
fn test_open_fails_on_missing_mask() {
    let dir = tempfile::tempdir().unwrap();
    let (slide, specimen, _) = write_sample_set(dir.path());

    let result = PatchImporter::open(&slide, &specimen, dir.path().join("absent.tif"));
    assert!(matches!(result, Err(ImportError::Raster(_))));
}

#[test]
fn test_open_fails_on_non_tiff_slide() {
    let dir = tempfile::tempdir().unwrap();
    let (_, specimen, annotation) = write_sample_set(dir.path());
    let bogus = dir.path().join("bogus.svs");
    fs::write(&bogus, b"not a slide at all").unwrap();

    let result = PatchImporter::open(&bogus, &specimen, &annotation);
    assert!(matches!(result, Err(ImportError::Slide(_))));
}

#[test]
fn test_tiled_mask_opens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tiled_mask.tif");
    let mask = RgbImage::from_fn(40, 24, |x, _| {
        if x < 20 {
            Rgb([255, 255, 255])
        } else {
            Rgb([0, 0, 0])
        }
    });
    fs::write(&path, PyramidBuilder::new().add_level(mask, 16).build()).unwrap();

    let raster = MaskRaster::open(&path).unwrap();
    assert_eq!(raster.dimensions(), (40, 24));
    assert_eq!(raster.image().get_pixel(19, 23).0[0], 255);
    assert_eq!(raster.image().get_pixel(20, 0).0[0], 0);
}

#[test]
fn test_open_registers_mask_scales() {
    let dir = tempfile::tempdir().unwrap();
    let (slide, specimen, annotation) = write_sample_set(dir.path());

    let importer = PatchImporter::open(&slide, &specimen, &annotation).unwrap();
    assert_eq!(importer.scales().get(MaskType::Specimen), 4.0);
    assert_eq!(importer.scales().get(MaskType::Annotation), 8.0);
    assert!(importer.geometry().is_none());
}

// =============================================================================
// Configuration and Lookups
// =============================================================================

#[test]
fn test_configure_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let (importer, coordinates) = open_configured(dir.path());

    let geometry = importer.geometry().unwrap();
    assert_eq!(geometry.level, 1);
    assert_eq!(geometry.level_pixel_size, PixelSize::square(32));
    assert_eq!(geometry.specimen_pixel_size, PixelSize::square(16));
    assert_eq!(geometry.annotation_pixel_size, PixelSize::square(8));
    assert_eq!(geometry.interval_pixels, PixelSize::square(64));

    assert_eq!(importer.grid(), Some((3, 2)));
    let unique: HashSet<_> = coordinates.iter().copied().collect();
    let expected: HashSet<_> = [0, 64, 128]
        .into_iter()
        .flat_map(|x| [0, 64].into_iter().map(move |y| Coordinate::new(x, y)))
        .collect();
    assert_eq!(unique, expected);
}

#[test]
fn test_same_seed_same_order() {
    let dir = tempfile::tempdir().unwrap();
    let (_, first) = open_configured(dir.path());
    let (_, second) = open_configured(dir.path());
    assert_eq!(first, second);
}

#[test]
fn test_load_image_native_size() {
    let dir = tempfile::tempdir().unwrap();
    let (mut importer, _) = open_configured(dir.path());
    let native = RegionOptions::default().with_output_size(PixelSize::square(32));

    let tissue = importer.load_image(Coordinate::new(0, 0), &native).unwrap();
    assert_eq!(tissue.dimensions(), (32, 32));
    assert_eq!(tissue.get_pixel(0, 0), &TISSUE_LIGHT);
    assert_eq!(tissue.get_pixel(0, 1), &TISSUE_DARK);

    let glass = importer.load_image(Coordinate::new(192, 0), &native).unwrap();
    assert!(glass.pixels().all(|p| *p == Rgb([255, 255, 255])));

    let resized = importer
        .load_image(Coordinate::new(0, 0), &RegionOptions::default())
        .unwrap();
    assert_eq!(resized.dimensions(), (16, 16));
}

#[test]
fn test_load_mask_aligned_with_image() {
    let dir = tempfile::tempdir().unwrap();
    let (importer, _) = open_configured(dir.path());
    let region = RegionOptions::default();

    let tissue = importer
        .load_mask(MaskType::Specimen, Coordinate::new(64, 0), &region)
        .unwrap();
    assert_eq!(tissue.dimensions(), (16, 16));
    assert!(tissue.pixels().all(|p| p.0[0] == 255));

    let glass = importer
        .load_mask(MaskType::Specimen, Coordinate::new(128, 64), &region)
        .unwrap();
    assert!(glass.pixels().all(|p| p.0[0] == 0));

    let annotated = importer
        .load_mask(MaskType::Annotation, Coordinate::new(0, 0), &region)
        .unwrap();
    assert_eq!(annotated.dimensions(), (16, 16));
    assert!(annotated.pixels().all(|p| p.0[0] == 255));
}

#[test]
fn test_usable_masks() {
    let dir = tempfile::tempdir().unwrap();
    let (importer, _) = open_configured(dir.path());
    let coordinates = [
        Coordinate::new(0, 0),
        Coordinate::new(64, 64),
        Coordinate::new(128, 0),
        Coordinate::new(0, 64),
    ];

    let specimen = importer.is_usable_mask(MaskType::Specimen, &coordinates, 0.5, None);
    assert_eq!(specimen, vec![true, true, false, true]);

    // (0, 64) covers the annotation edge: exactly half foreground is rejected
    let annotation = importer.is_usable_mask(MaskType::Annotation, &coordinates, 0.5, None);
    assert_eq!(annotation, vec![true, false, false, false]);
}

// =============================================================================
// Export
// =============================================================================

#[test]
fn test_export_writes_accepted_patches() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("patches");
    let (mut importer, coordinates) = open_configured(dir.path());

    let accepted =
        export_patches(&mut importer, &coordinates, &ExportOptions::default(), &output).unwrap();

    let accepted_set: HashSet<_> = accepted.iter().copied().collect();
    let expected: HashSet<_> = [(0, 0), (64, 0), (0, 64), (64, 64)]
        .into_iter()
        .map(|(x, y)| Coordinate::new(x, y))
        .collect();
    assert_eq!(accepted_set, expected);

    for (index, coordinate) in accepted.iter().enumerate() {
        for suffix in ["image", "spec", "anno"] {
            let name = format!("{}_{}_{}_{}.png", index, coordinate.x, coordinate.y, suffix);
            let data = fs::read(output.join(&name)).unwrap();
            assert!(is_png(&data), "{} is not a PNG", name);
        }
    }
    assert_eq!(fs::read_dir(&output).unwrap().count(), accepted.len() * 3);

    let patch = image::open(output.join(format!(
        "0_{}_{}_image.png",
        accepted[0].x, accepted[0].y
    )))
    .unwrap();
    assert_eq!((patch.width(), patch.height()), (16, 16));
}

#[test]
fn test_export_requires_annotation_and_honours_count() {
    let dir = tempfile::tempdir().unwrap();
    let (mut importer, coordinates) = open_configured(dir.path());

    let options = ExportOptions {
        require_annotation: true,
        ..ExportOptions::default()
    };
    let accepted = export_patches(&mut importer, &coordinates, &options, dir.path().join("anno"))
        .unwrap();
    let accepted_set: HashSet<_> = accepted.iter().copied().collect();
    assert_eq!(
        accepted_set,
        HashSet::from([Coordinate::new(0, 0), Coordinate::new(64, 0)])
    );

    let options = ExportOptions {
        count: 1,
        ..ExportOptions::default()
    };
    let limited = export_patches(&mut importer, &coordinates, &options, dir.path().join("one"))
        .unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(fs::read_dir(dir.path().join("one")).unwrap().count(), 3);
}

#[test]
fn test_export_before_configure() {
    let dir = tempfile::tempdir().unwrap();
    let (slide, specimen, annotation) = write_sample_set(dir.path());
    let mut importer = PatchImporter::open(&slide, &specimen, &annotation).unwrap();

    let result = export_patches(
        &mut importer,
        &[Coordinate::new(0, 0)],
        &ExportOptions::default(),
        dir.path().join("out"),
    );
    assert!(matches!(result, Err(ImportError::NotConfigured)));
}
