//! Large-raster persistence: mask TIFFs and preview overlays.

mod mask;
mod preview;

pub use mask::{write_mask_bigtiff, MaskRaster, MASK_FOREGROUND};
pub use preview::{overlay_preview, write_preview, DEFAULT_PREVIEW_RATIO};
