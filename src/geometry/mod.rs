//! Coordinate-system reconciliation.
//!
//! A slide is addressed through three independently sampled rasters: the
//! image pyramid, the specimen mask and the annotation mask. Everything in
//! this module works in one shared space, level-0 pixels of the pyramid
//! measured from the slide bounds origin, and converts into the other grids
//! on demand.
//!
//! ```text
//! microns ──units──▶ level-0 pixels ──level──▶ pyramid level pixels
//!                          │
//!                          └──scale──▶ mask pixels (one scale per mask)
//! ```
//!
//! - [`units`]: microns to pixels through the slide calibration
//! - [`level`]: nearest-ratio decimation level selection
//! - [`scale`]: per-mask scale factors and coordinate mapping
//! - [`sampler`]: shuffled grid of candidate patch coordinates

pub mod level;
pub mod sampler;
pub mod scale;
mod types;
pub mod units;

pub use level::select_level;
pub use sampler::{generate_candidates, CandidateSet};
pub use scale::{register_raster, to_raster_coordinate, MaskScales};
pub use types::{Bounds, Coordinate, MaskType, MicronSize, PixelSize};
pub use units::{to_microns, to_pixels, Calibration};
