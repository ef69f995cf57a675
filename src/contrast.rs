//! Cross-condition contrast of time-frequency power.
//!
//! ```text
//! diff     = stim_power − prestim_power
//! avg_neg  = mean(min(diff, 0))            over every element
//! ratio    = avg_neg[trigger] / avg_neg[neutral]
//! ```
use std::collections::BTreeMap;

use ndarray::{Array, Dimension, Zip};

use crate::artifact::{BandTfr, SessionArtifact};
use crate::config::{Disposition, Timing};
use crate::error::{AnalysisError, Result};

/// Mean of the negative part of `stim − prestim`; non-negative entries
/// count as zero.
pub fn average_negative<D: Dimension>(stim: &Array<f64, D>, prestim: &Array<f64, D>) -> Result<f64> {
    if stim.shape() != prestim.shape() {
        return Err(AnalysisError::ShapeMismatch {
            what: "stimulus vs pre-stimulus power".to_string(),
            left: stim.shape().to_vec(),
            right: prestim.shape().to_vec(),
        });
    }
    if stim.is_empty() {
        return Err(AnalysisError::EmptySeries);
    }
    let sum = Zip::from(stim)
        .and(prestim)
        .fold(0.0, |acc, &s, &p| acc + (s - p).min(0.0));
    Ok(sum / stim.len() as f64)
}

/// Average negative deviation of each disposition within one band.
pub fn band_negative_deviation(groups: &BandTfr) -> Result<BTreeMap<Disposition, f64>> {
    Disposition::ALL
        .into_iter()
        .map(|d| {
            let get = |timing| {
                groups
                    .get(&(timing, d))
                    .ok_or(AnalysisError::EmptyEpochGroup { timing, disposition: d })
            };
            let avg = average_negative(&get(Timing::Stim)?.power, &get(Timing::Prestim)?.power)?;
            Ok((d, avg))
        })
        .collect()
}

/// Trigger-over-neutral ratio of the average negative deviation, per band.
///
/// # Errors
///
/// [`AnalysisError::ZeroDenominator`] naming the band whose neutral average
/// is zero; missing groups and shape mismatches as in
/// [`band_negative_deviation`].
pub fn negative_deviation_ratio(artifact: &SessionArtifact) -> Result<BTreeMap<String, f64>> {
    artifact
        .tfr
        .iter()
        .map(|(band, groups)| {
            let avg = band_negative_deviation(groups)?;
            let neutral = avg[&Disposition::Neutral];
            let trigger = avg[&Disposition::Trigger];
            if neutral == 0.0 {
                return Err(AnalysisError::ZeroDenominator { band: band.clone() });
            }
            log::info!("{band}: avg negative trigger {trigger:.4e} / neutral {neutral:.4e}");
            Ok((band.clone(), trigger / neutral))
        })
        .collect()
}
