//! Marker-to-sample alignment.
//!
//! Markers arrive on their own irregular clock; each one is snapped to the
//! index of the closest sample timestamp of the continuous series.
//!
//! For marker time `m` and insertion point `i = #{ s : s < m }`:
//!
//! ```text
//! i == 0          → 0
//! i == N          → N − 1
//! otherwise       → i − 1  if m − s[i−1] <= s[i] − m   (ties go earlier)
//!                   i      otherwise
//! ```
use crate::error::{AnalysisError, Result};

/// Nearest sample index for every marker timestamp.
///
/// `samples` must be non-empty and sorted ascending; this is not checked
/// here (see [`align_markers`]). The output has one index per marker, in
/// marker order, each in `0..samples.len()`.
pub fn nearest_sample_indices(samples: &[f64], markers: &[f64]) -> Vec<usize> {
    debug_assert!(!samples.is_empty());
    let n = samples.len();
    markers
        .iter()
        .map(|&m| {
            let i = samples.partition_point(|&s| s < m);
            if i == 0 {
                0
            } else if i == n {
                n - 1
            } else if m - samples[i - 1] <= samples[i] - m {
                i - 1
            } else {
                i
            }
        })
        .collect()
}

/// Checked alignment: rejects an empty or unsorted sample clock before
/// delegating to [`nearest_sample_indices`].
pub fn align_markers(samples: &[f64], markers: &[f64]) -> Result<Vec<usize>> {
    if samples.is_empty() {
        return Err(AnalysisError::EmptySeries);
    }
    if let Some(index) = samples.windows(2).position(|w| !(w[0] <= w[1])) {
        return Err(AnalysisError::UnsortedTimestamps { index: index + 1 });
    }
    let indices = nearest_sample_indices(samples, markers);
    log::debug!("aligned {} markers onto {} samples", markers.len(), samples.len());
    Ok(indices)
}
