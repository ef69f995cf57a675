//! Epoch baseline correction and stimulus / pre-stimulus power normalisation.
//!
//! `baseline_correct_inplace` — matches `mne.Epochs(..., baseline=(a, b))`:
//!   for each epoch and channel: epoch[e, c, :] -= mean(epoch[e, c, a..b])
//!
//! `normalized_power` — element-wise `stim / prestim` of two spectra that
//! must share one frequency axis.
use std::ops::Range;

use ndarray::{s, Array1, Array3, ArrayD};

use crate::config::Disposition;
use crate::error::{AnalysisError, Result};

/// Per-channel, per-epoch baseline correction over the sample range `baseline`.
/// `epochs`: [E, C, T]
pub fn baseline_correct_inplace(epochs: &mut Array3<f64>, baseline: Range<usize>) {
    let (n_e, n_c, _n_t) = epochs.dim();
    for e in 0..n_e {
        for c in 0..n_c {
            let m = epochs
                .slice(s![e, c, baseline.clone()])
                .mean()
                .unwrap_or(0.0);
            epochs.slice_mut(s![e, c, ..]).mapv_inplace(|v| v - m);
        }
    }
}

/// Stimulus power divided by pre-stimulus power, element by element.
///
/// # Errors
///
/// * [`AnalysisError::FrequencyAxisMismatch`] naming `disposition` when the
///   two frequency axes are not identical element for element.
/// * [`AnalysisError::ShapeMismatch`] when the power arrays differ in shape.
///
/// A zero pre-stimulus bin yields the IEEE result (`inf` or `NaN`) and a
/// warning.
pub fn normalized_power(
    disposition: Disposition,
    stim: &ArrayD<f64>,
    stim_freqs: &Array1<f64>,
    prestim: &ArrayD<f64>,
    prestim_freqs: &Array1<f64>,
) -> Result<ArrayD<f64>> {
    if stim_freqs != prestim_freqs {
        return Err(AnalysisError::FrequencyAxisMismatch { disposition });
    }
    if stim.shape() != prestim.shape() {
        return Err(AnalysisError::ShapeMismatch {
            what: format!("normalized power ({disposition})"),
            left: stim.shape().to_vec(),
            right: prestim.shape().to_vec(),
        });
    }
    let zeros = prestim.iter().filter(|&&v| v == 0.0).count();
    if zeros > 0 {
        log::warn!("normalized power ({disposition}): {zeros} pre-stimulus bins are zero");
    }
    Ok(stim / prestim)
}
