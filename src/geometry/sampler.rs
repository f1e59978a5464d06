//! Candidate patch coordinates.
//!
//! The usable bounds are tiled at a fixed interval and the resulting grid is
//! permuted once. The grid is a pure function of bounds and interval; only
//! the enumeration order depends on the random generator, which callers
//! pass in so that runs can be reproduced with a fixed seed.

use rand::seq::SliceRandom;
use rand::Rng;

use super::types::{Bounds, Coordinate, PixelSize};

/// A shuffled tiling of the slide bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet {
    /// Bounds-relative top-left corners, in random order
    pub coordinates: Vec<Coordinate>,

    /// Grid columns before shuffling
    pub count_x: usize,

    /// Grid rows before shuffling
    pub count_y: usize,
}

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// Keep the coordinates whose flag is set, preserving order.
    ///
    /// Flags beyond the coordinate count are ignored; missing flags count as
    /// rejected.
    pub fn retain_flags(&self, flags: &[bool]) -> Vec<Coordinate> {
        self.coordinates
            .iter()
            .zip(flags.iter())
            .filter(|(_, &keep)| keep)
            .map(|(coordinate, _)| *coordinate)
            .collect()
    }
}

/// Grid starts `0, step, 2*step, ...` strictly below `extent - step`.
fn axis_starts(extent: u32, step: u32) -> Vec<u32> {
    let end = extent.saturating_sub(step);
    (0..end).step_by(step as usize).collect()
}

/// Tile `bounds` at `interval` and shuffle the tiling once with `rng`.
///
/// The last interval that would reach the far edge is dropped, so the final
/// patch may stop up to one interval short of the bounds. Returns an empty
/// set for a zero interval.
pub fn generate_candidates<R: Rng + ?Sized>(
    bounds: &Bounds,
    interval: PixelSize,
    rng: &mut R,
) -> CandidateSet {
    if interval.is_empty() {
        return CandidateSet {
            coordinates: Vec::new(),
            count_x: 0,
            count_y: 0,
        };
    }

    let xs = axis_starts(bounds.width, interval.width);
    let ys = axis_starts(bounds.height, interval.height);

    let mut coordinates = Vec::with_capacity(xs.len() * ys.len());
    for &x in &xs {
        for &y in &ys {
            coordinates.push(Coordinate::new(x, y));
        }
    }
    coordinates.shuffle(rng);

    CandidateSet {
        coordinates,
        count_x: xs.len(),
        count_y: ys.len(),
    }
}
