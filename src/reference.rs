//! Average reference: subtract the mean of the good channels at each time point.
//!
//! Matches `raw.set_eeg_reference('average', projection=False)`, which
//! leaves channels in `info['bads']` out of the mean but re-references
//! them too.
//!
//! `data`: [C, T]  →  `data[c, t] -= mean(data[good, t])`
use ndarray::{Array1, Array2, Axis};

use crate::error::{AnalysisError, Result};

pub fn average_reference_inplace(data: &mut Array2<f64>, good: &[usize]) -> Result<()> {
    if good.is_empty() {
        return Err(AnalysisError::NoGoodChannels("average reference"));
    }
    let means: Array1<f64> = data
        .select(Axis(0), good)
        .mean_axis(Axis(0))
        .ok_or(AnalysisError::NoGoodChannels("average reference"))?;
    for mut row in data.rows_mut() {
        row -= &means;
    }
    Ok(())
}
