//! Preprocessing as an ordered chain of named stages.
//!
//! ```text
//! Series ─┬─ rate check     fail fast on nominal-rate mismatch
//!         ├─ Screen         flat channels → series.bads
//!         ├─ Annotate       event records → series.annotations
//!         ├─ Notch          line frequency + harmonics < Nyquist   (optional)
//!         ├─ Bandpass       zero-phase FIR                          (optional)
//!         └─ Reference      mean of good channels removed   (only after Bandpass)
//! ```
//!
//! Each stage consumes the series and returns it, so the only way to run
//! the chain is in [`STAGES`] order.
use ndarray::{Array1, Array2};

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::events::EventRecord;
use crate::filter;
use crate::reference::average_reference_inplace;
use crate::series::{Annotation, Series};
use crate::taxonomy::Taxonomy;

/// Tolerance when comparing the declared rate to the expected one.
const SFREQ_TOLERANCE: f64 = 1e-6;

/// Read-only inputs shared by every stage.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub cfg: &'a AnalysisConfig,
    pub events: &'a [EventRecord],
    pub taxonomy: &'a Taxonomy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Screen,
    Annotate,
    Notch,
    Bandpass,
    Reference,
}

/// The fixed stage order.
pub const STAGES: [Stage; 5] = [
    Stage::Screen,
    Stage::Annotate,
    Stage::Notch,
    Stage::Bandpass,
    Stage::Reference,
];

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Screen => "screen",
            Stage::Annotate => "annotate",
            Stage::Notch => "notch",
            Stage::Bandpass => "bandpass",
            Stage::Reference => "reference",
        }
    }

    pub fn apply(self, mut series: Series, ctx: &StageContext<'_>) -> Result<Series> {
        let cfg = ctx.cfg;
        match self {
            Stage::Screen => {
                if let Some(threshold) = cfg.flat_threshold {
                    series.bads = screen_flat_channels(&series.data, &series.ch_names, threshold);
                    log::info!("bad channels: {:?}", series.bads);
                }
            }
            Stage::Annotate => {
                series.annotations = annotations_from_events(ctx.events, series.sfreq, ctx.taxonomy)?;
            }
            Stage::Notch => {
                if let Some(base) = cfg.notch {
                    for freq in filter::notch_harmonics(base, series.sfreq) {
                        let h = filter::design_notch(freq, series.sfreq);
                        log::debug!("notch at {freq} Hz ({} taps)", h.len());
                        filter::apply_fir_zero_phase(&mut series.data, &h);
                    }
                }
            }
            Stage::Bandpass => {
                if let Some(bp) = cfg.bandpass {
                    let h = filter::design_bandpass(bp.low, bp.high, series.sfreq);
                    log::debug!("bandpass {}–{} Hz ({} taps)", bp.low, bp.high, h.len());
                    filter::apply_fir_zero_phase(&mut series.data, &h);
                }
            }
            Stage::Reference => {
                if cfg.average_reference && cfg.bandpass.is_some() {
                    let good = series.good_channels();
                    average_reference_inplace(&mut series.data, &good)?;
                }
            }
        }
        Ok(series)
    }
}

/// Run the rate check and then every stage in order.
///
/// # Errors
///
/// * [`AnalysisError::SampleRateMismatch`] if `series.sfreq` differs from
///   `cfg.expected_sfreq`.
/// * [`AnalysisError::UnknownLabel`] if an event id has no label.
/// * [`AnalysisError::NoGoodChannels`] if referencing runs (bandpass and
///   `average_reference` both enabled) and every channel was screened out.
pub fn preprocess(series: Series, ctx: &StageContext<'_>) -> Result<Series> {
    check_sampling_rate(series.sfreq, ctx.cfg.expected_sfreq)?;
    STAGES.iter().try_fold(series, |s, stage| {
        log::debug!("stage {}", stage.name());
        stage.apply(s, ctx)
    })
}

pub fn check_sampling_rate(got: f64, expected: f64) -> Result<()> {
    if (got - expected).abs() > SFREQ_TOLERANCE {
        return Err(AnalysisError::SampleRateMismatch { expected, got });
    }
    Ok(())
}

/// Names of channels whose peak-to-peak amplitude over the whole recording
/// is below `threshold`.
pub fn screen_flat_channels(data: &Array2<f64>, ch_names: &[String], threshold: f64) -> Vec<String> {
    data.rows()
        .into_iter()
        .zip(ch_names)
        .filter(|(row, _)| {
            let (lo, hi) = row
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            hi - lo < threshold
        })
        .map(|(_, name)| name.clone())
        .collect()
}

/// One zero-duration annotation per event, onset in seconds.
pub fn annotations_from_events(
    events: &[EventRecord],
    sfreq: f64,
    taxonomy: &Taxonomy,
) -> Result<Vec<Annotation>> {
    events
        .iter()
        .map(|ev| {
            let label = taxonomy
                .label(ev.id)
                .ok_or_else(|| AnalysisError::UnknownLabel(format!("event id {}", ev.id)))?;
            Ok(Annotation {
                onset: ev.sample as f64 / sfreq,
                duration: 0.0,
                description: label.to_string(),
            })
        })
        .collect()
}

/// Replace each bad channel by an inverse-squared-distance weighted sum of
/// the good channels, then clear the bad list.
///
/// `positions` is `[C, 3]`, one row per channel in series order. Not part
/// of [`STAGES`]; callers opt in.
pub fn interpolate_bad_channels(series: &mut Series, positions: &Array2<f64>) -> Result<()> {
    if positions.nrows() != series.n_channels() || positions.ncols() != 3 {
        return Err(AnalysisError::ShapeMismatch {
            what: "channel positions".to_string(),
            left: positions.shape().to_vec(),
            right: vec![series.n_channels(), 3],
        });
    }
    if series.bads.is_empty() {
        return Ok(());
    }
    let good = series.good_channels();
    if good.is_empty() {
        return Err(AnalysisError::NoGoodChannels("interpolation"));
    }

    let bad: Vec<usize> = (0..series.n_channels()).filter(|&c| series.is_bad(c)).collect();
    for b in bad {
        let weights: Vec<f64> = good
            .iter()
            .map(|&g| {
                let d2 = (&positions.row(b) - &positions.row(g)).mapv(|v| v * v).sum();
                1.0 / d2.max(f64::EPSILON)
            })
            .collect();
        let total: f64 = weights.iter().sum();
        let mut estimate = Array1::<f64>::zeros(series.n_times());
        for (&g, &w) in good.iter().zip(&weights) {
            estimate.scaled_add(w / total, &series.data.row(g));
        }
        series.data.row_mut(b).assign(&estimate);
    }
    log::info!("interpolated bad channels {:?}", series.bads);
    series.bads.clear();
    Ok(())
}
