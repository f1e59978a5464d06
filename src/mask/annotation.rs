//! Annotation mask from human-drawn polygons.
//!
//! Annotations are stored as a list of groups, each group a list of
//! polygons in level-0 pixels. Only the first polygon of each group is
//! drawn; later polygons (holes, in the annotation tool's export) are
//! ignored.

use image::{GrayImage, Luma};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::geometry::PixelSize;

/// A polygon as `[x, y]` vertices in level-0 pixels.
pub type Polygon = Vec<[f64; 2]>;

/// Polygons drawn as one annotation; only the first is filled.
pub type PolygonGroup = Vec<Polygon>;

/// Annotation payload as stored in the slide catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationGeometry {
    pub coordinates: Vec<PolygonGroup>,
}

/// Rasterize annotation groups onto a `canvas` sized mask.
///
/// Vertices are divided by `downsample` and truncated toward zero. Filled
/// polygons are unioned; foreground is 255. Groups whose first polygon has
/// fewer than three distinct vertices are skipped.
pub fn build_annotation_mask(
    canvas: PixelSize,
    downsample: f64,
    groups: &[PolygonGroup],
) -> GrayImage {
    let mut mask = GrayImage::new(canvas.width, canvas.height);

    for (index, group) in groups.iter().enumerate() {
        let Some(polygon) = group.first() else {
            warn!(group = index, "Skipping empty annotation group");
            continue;
        };

        let points = scaled_vertices(polygon, downsample);
        if points.len() < 3 {
            warn!(
                group = index,
                vertices = points.len(),
                "Skipping degenerate annotation polygon"
            );
            continue;
        }

        draw_polygon_mut(&mut mask, &points, Luma([255u8]));
    }

    mask
}

/// Scale vertices into canvas space, dropping repeats and the closing vertex.
fn scaled_vertices(polygon: &Polygon, downsample: f64) -> Vec<Point<i32>> {
    let mut points: Vec<Point<i32>> = Vec::with_capacity(polygon.len());
    for [x, y] in polygon {
        let point = Point::new((x / downsample) as i32, (y / downsample) as i32);
        if points.last() != Some(&point) {
            points.push(point);
        }
    }
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}
