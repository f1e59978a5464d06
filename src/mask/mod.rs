//! Mask production.
//!
//! Two binary masks are derived for every slide, both at one pyramid level
//! chosen from a target downsample:
//!
//! - **Specimen**: tissue detected by hue/saturation/value/Laplacian range
//!   selection, smoothed and thresholded ([`build_specimen_mask`]).
//! - **Annotation**: filled human-drawn polygons ([`build_annotation_mask`]).
//!
//! [`process_task`] runs the whole pipeline for one [`MaskTask`] and writes
//! the results under an [`OutputLayout`]; `crate::batch` fans tasks out
//! across workers.

mod annotation;
mod channels;
mod produce;
mod specimen;

pub use annotation::{build_annotation_mask, AnnotationGeometry, Polygon, PolygonGroup};
pub use channels::HsvlChannels;
pub use produce::{
    process_task, produce_masks, save_masks, MaskOutputs, MaskTask, OutputLayout, ProducedMasks,
    DEFAULT_MASK_DOWNSAMPLE,
};
pub use specimen::{
    build_specimen_mask, BlurThreshold, ChannelRange, RangeCriteria, SpecimenOptions,
};
