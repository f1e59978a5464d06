//! Mask production integration tests.
//!
//! Tests verify:
//! - A slide on disk yields both masks, previews and parameter dumps
//! - Produced masks segment the fixture tissue and annotation
//! - Catalog-driven batches isolate failing slides
//! - Produced masks can be fed straight back into the patch importer

use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rusqlite::{params, Connection};

use wsi_prepro::mask::{PolygonGroup, DEFAULT_MASK_DOWNSAMPLE};
use wsi_prepro::{
    plan_tasks, process_task, run_batch, MaskRaster, MaskTask, MaskType, MicronSize, OutputLayout,
    PatchImporter, PatchSettings, PixelSize, SlideCatalog, SpecimenOptions, SqliteCatalog,
};

use super::test_utils::{is_bigtiff_magic, is_png, write_test_slide};

/// Level-0 rectangle over the top-left quadrant of the fixture slide.
fn quadrant() -> Vec<PolygonGroup> {
    vec![vec![vec![
        [0.0, 0.0],
        [128.0, 0.0],
        [128.0, 96.0],
        [0.0, 96.0],
    ]]]
}

fn task(id: &str, slide_path: &Path) -> MaskTask {
    MaskTask {
        slide_id: id.to_string(),
        slide_path: slide_path.to_path_buf(),
        downsample: DEFAULT_MASK_DOWNSAMPLE,
        options: SpecimenOptions::default(),
        coordinates: quadrant(),
    }
}

// =============================================================================
// Single Slide
// =============================================================================

#[test]
fn test_process_task_writes_layout() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_test_slide(dir.path(), "slide.svs");
    let layout = OutputLayout::new(dir.path().join("out"));

    let outputs = process_task(&task("42", &slide), &layout).unwrap();
    assert_eq!(outputs.slide_id, "42");
    assert_eq!(outputs.specimen_mask, layout.mask_path(MaskType::Specimen, "42"));
    assert_eq!(outputs.annotation_mask, layout.mask_path(MaskType::Annotation, "42"));

    for mask in MaskType::ALL {
        let tiff = fs::read(layout.mask_path(mask, "42")).unwrap();
        assert!(is_bigtiff_magic(&tiff));

        let preview = fs::read(layout.preview_path(mask, "42")).unwrap();
        assert!(is_png(&preview));
        let preview = image::load_from_memory(&preview).unwrap();
        assert_eq!((preview.width(), preview.height()), (16, 12));

        assert!(layout.dump_path(mask, "42").exists());
    }
}

#[test]
fn test_dumps_record_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_test_slide(dir.path(), "slide.svs");
    let layout = OutputLayout::new(dir.path());

    process_task(&task("7", &slide), &layout).unwrap();

    let options: SpecimenOptions =
        serde_json::from_str(&fs::read_to_string(layout.dump_path(MaskType::Specimen, "7")).unwrap())
            .unwrap();
    assert_eq!(options, SpecimenOptions::default());

    let coordinates: Vec<PolygonGroup> = serde_json::from_str(
        &fs::read_to_string(layout.dump_path(MaskType::Annotation, "7")).unwrap(),
    )
    .unwrap();
    assert_eq!(coordinates, quadrant());
}

#[test]
fn test_masks_segment_fixture() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_test_slide(dir.path(), "slide.svs");
    let layout = OutputLayout::new(dir.path());

    let outputs = process_task(&task("1", &slide), &layout).unwrap();

    // Downsample 12 selects the 4x level: a 64x48 canvas
    let specimen = MaskRaster::open(&outputs.specimen_mask).unwrap();
    assert_eq!(specimen.dimensions(), (64, 48));
    assert_eq!(specimen.image().get_pixel(5, 24).0[0], 255);
    assert_eq!(specimen.image().get_pixel(60, 24).0[0], 0);

    let annotation = MaskRaster::open(&outputs.annotation_mask).unwrap();
    assert_eq!(annotation.dimensions(), (64, 48));
    assert_eq!(annotation.image().get_pixel(10, 10).0[0], 255);
    assert_eq!(annotation.image().get_pixel(16, 12).0[0], 255);
    assert_eq!(annotation.image().get_pixel(50, 40).0[0], 0);
    assert_eq!(annotation.image().get_pixel(10, 40).0[0], 0);
}

#[test]
fn test_missing_slide_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let layout = OutputLayout::new(dir.path().join("out"));

    let result = process_task(&task("9", &dir.path().join("absent.svs")), &layout);
    assert!(result.is_err());
    assert!(!layout.mask_path(MaskType::Specimen, "9").exists());
}

// =============================================================================
// Batch
// =============================================================================

fn seed_catalog(path: &Path, slide: &Path, missing: &Path) {
    let connection = Connection::open(path).unwrap();
    SqliteCatalog::create_table(&connection, "slides").unwrap();

    let annotation = r#"{"coordinates": [[[[0, 0], [128, 0], [128, 96], [0, 96]]]]}"#;
    let mut insert = connection
        .prepare("INSERT INTO slides (id, file_path, human_coordinates) VALUES (?1, ?2, ?3)")
        .unwrap();
    insert
        .execute(params![1, slide.to_str().unwrap(), annotation])
        .unwrap();
    insert
        .execute(params![2, missing.to_str().unwrap(), annotation])
        .unwrap();
    insert
        .execute(params![3, slide.to_str().unwrap(), Option::<String>::None])
        .unwrap();
    insert
        .execute(params![4, slide.to_str().unwrap(), r#"{"coordinates": [[[[0,0,5]]]]}"#])
        .unwrap();
}

#[tokio::test]
async fn test_catalog_batch_isolates_failures() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_test_slide(dir.path(), "slide.svs");
    let database = dir.path().join("catalog.sqlite");
    seed_catalog(&database, &slide, &dir.path().join("missing.svs"));

    let catalog = SqliteCatalog::new(&database, "slides").unwrap();
    let records = catalog.slides().await.unwrap();
    let plan = plan_tasks(&records, DEFAULT_MASK_DOWNSAMPLE, &SpecimenOptions::default());
    assert_eq!(plan.tasks.len(), 2);
    assert_eq!(plan.skipped, 1);

    let layout = OutputLayout::new(dir.path().join("masks"));
    let mut report = run_batch(plan.tasks, 2, layout.clone()).await;
    report.failed.extend(plan.rejected);

    assert_eq!(report.total(), 3);
    assert!(!report.is_success());
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.succeeded[0].slide_id, "1");

    let mut failed: Vec<&str> = report.failed.iter().map(|f| f.slide_id.as_str()).collect();
    failed.sort();
    assert_eq!(failed, vec!["2", "4"]);

    assert!(layout.mask_path(MaskType::Specimen, "1").exists());
    assert!(!layout.mask_path(MaskType::Specimen, "2").exists());
    assert!(!layout.mask_path(MaskType::Specimen, "4").exists());
}

// =============================================================================
// Round Trip Into Sampling
// =============================================================================

#[test]
fn test_produced_masks_drive_sampling() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_test_slide(dir.path(), "slide.svs");
    let layout = OutputLayout::new(dir.path());
    let outputs = process_task(&task("5", &slide), &layout).unwrap();

    let mut importer =
        PatchImporter::open(&slide, &outputs.specimen_mask, &outputs.annotation_mask).unwrap();
    assert_eq!(importer.scales().get(MaskType::Specimen), 4.0);

    let settings = PatchSettings {
        patch_microns: MicronSize::square(32.0),
        interval_microns: MicronSize::square(32.0),
        output_size: PixelSize::square(16),
    };
    let candidates = importer
        .configure(&settings, &mut StdRng::seed_from_u64(3))
        .unwrap();
    let usable = importer.is_usable_mask(MaskType::Specimen, &candidates.coordinates, 0.5, None);

    for (coordinate, usable) in candidates.coordinates.iter().zip(usable) {
        // Glass on the right half never passes
        if coordinate.x >= 128 {
            assert!(!usable, "{:?} should be rejected", coordinate);
        }
    }
}
