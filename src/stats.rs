// =============================================================================
// Descriptive Statistics
// =============================================================================
//
// Small, pure helpers shared by the forecaster and the projector.  Every
// function returns `Option<f64>` so callers handle the empty / too-short case
// explicitly.
//
//   mean            arithmetic mean
//   population_std  σ with divisor n       (dispersion of a whole sample)
//   sample_std      s with divisor n - 1   (estimate from residuals)
//   percentile      linear interpolation between closest ranks
// =============================================================================

/// Arithmetic mean. `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (divisor `n`). `None` for an empty slice.
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Sample standard deviation (divisor `n - 1`). `None` for fewer than 2 values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance =
        values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// The `pct`-th percentile (0–100) of an ascending-sorted slice, linearly
/// interpolated between the two closest ranks.
///
/// Returns `None` for an empty slice or a `pct` outside [0, 100].
pub fn percentile_sorted(sorted: &[f64], pct: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=100.0).contains(&pct) {
        return None;
    }
    if sorted.len() == 1 {
        return Some(sorted[0]);
    }

    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}
