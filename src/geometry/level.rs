//! Decimation level selection.
//!
//! Pyramid downsample factors are roughly geometric (1, 4, 16, ...), so the
//! distance between a requested downsample and a level is measured on a log
//! scale: `|log10(target / downsample)|`. This keeps a target sitting between
//! two levels from being biased toward either the finer or the coarser one.

/// Pick the level whose downsample is closest, in multiplicative terms, to
/// `target_downsample`.
///
/// The scan runs in level order and keeps the first index reaching the
/// minimum, so ties resolve to the finer level.
///
/// Returns `None` for an empty level list or a non-positive target.
pub fn select_level(level_downsamples: &[f64], target_downsample: f64) -> Option<usize> {
    if target_downsample <= 0.0 || !target_downsample.is_finite() {
        return None;
    }

    let mut best: Option<(usize, f64)> = None;
    for (index, &downsample) in level_downsamples.iter().enumerate() {
        if downsample <= 0.0 || !downsample.is_finite() {
            continue;
        }
        let distance = (target_downsample / downsample).log10().abs();
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((index, distance)),
        }
    }

    best.map(|(index, _)| index)
}
