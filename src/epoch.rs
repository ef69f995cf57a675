//! Event-locked epoching.
//!
//! For every event whose id belongs to a label group, cut the samples from
//! `round(onset × sfreq)` to `round((onset + duration) × sfreq)` relative to
//! the event's sample index, both ends included and halves rounded to even,
//! as `mne.Epochs(tmin, tmax)` does. Windows that run off either end of the
//! recording are dropped. Only good channels are kept, unless every channel
//! is bad, in which case all of them are. Baseline correction is applied
//! afterwards when the window configures one.
use ndarray::{s, Array3, Axis};

use crate::config::{AnalysisConfig, Disposition, EpochWindow, Timing};
use crate::error::{AnalysisError, Result};
use crate::events::EventRecord;
use crate::normalize::baseline_correct_inplace;
use crate::series::Series;
use crate::taxonomy::{LabelIds, Taxonomy};

/// Epochs of one (timing, disposition) group.
#[derive(Debug, Clone, PartialEq)]
pub struct Epochs {
    /// [E, C, T]
    pub data: Array3<f64>,
    /// Anchor sample of each kept epoch.
    pub anchors: Vec<usize>,
    /// Names of the C channels.
    pub ch_names: Vec<String>,
    pub sfreq: f64,
    /// Time of the first sample relative to the anchor, in seconds.
    pub tmin: f64,
}

impl Epochs {
    pub fn len(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn n_times(&self) -> usize {
        self.data.len_of(Axis(2))
    }
}

/// Number of samples in `[onset, onset + duration]`, both ends included.
pub fn window_samples(onset: f64, duration: f64, sfreq: f64) -> usize {
    let first = (onset * sfreq).round_ties_even();
    let last = ((onset + duration) * sfreq).round_ties_even();
    (last - first) as usize + 1
}

/// Cut one epoch per matching event. Events whose window falls outside the
/// recording are skipped.
pub fn cut_epochs(
    series: &Series,
    events: &[EventRecord],
    ids: &LabelIds,
    window: &EpochWindow,
) -> Epochs {
    let sfreq = series.sfreq;
    let n_t = window_samples(window.onset, window.duration, sfreq);
    let offset = (window.onset * sfreq).round_ties_even() as i64;
    let mut picks = series.good_channels();
    if picks.is_empty() {
        log::warn!("every channel is marked bad; epoching all {}", series.n_channels());
        picks = (0..series.n_channels()).collect();
    }
    let total = series.n_times() as i64;

    let wanted: Vec<i32> = ids.values().copied().collect();
    let mut anchors = Vec::new();
    let mut starts = Vec::new();
    for ev in events.iter().filter(|ev| wanted.contains(&ev.id)) {
        let start = ev.sample as i64 + offset;
        if start < 0 || start + n_t as i64 > total {
            log::debug!("dropping epoch at sample {}: window outside recording", ev.sample);
            continue;
        }
        anchors.push(ev.sample);
        starts.push(start as usize);
    }

    let mut data = Array3::<f64>::zeros((starts.len(), picks.len(), n_t));
    for (e, &start) in starts.iter().enumerate() {
        for (c, &ch) in picks.iter().enumerate() {
            data.slice_mut(s![e, c, ..])
                .assign(&series.data.slice(s![ch, start..start + n_t]));
        }
    }

    if let Some((b0, b1)) = window.baseline {
        let i0 = ((b0 * sfreq).round_ties_even() as i64 - offset).max(0) as usize;
        let i1 = (((b1 * sfreq).round_ties_even() as i64 - offset + 1).max(0) as usize).min(n_t);
        if i0 < i1 {
            baseline_correct_inplace(&mut data, i0..i1);
        }
    }

    Epochs {
        data,
        anchors,
        ch_names: picks.iter().map(|&c| series.ch_names[c].clone()).collect(),
        sfreq,
        tmin: offset as f64 / sfreq,
    }
}

/// Epochs for one (timing, disposition) pair of the configured analysis
/// phase.
///
/// # Errors
///
/// * [`AnalysisError::InvalidConfig`] if the timing has no window or the
///   window's anchor is not a split sub-phase of the analysis phase.
/// * [`AnalysisError::EmptyEpochGroup`] if no epoch survives.
pub fn epochs_for_group(
    series: &Series,
    events: &[EventRecord],
    taxonomy: &Taxonomy,
    cfg: &AnalysisConfig,
    timing: Timing,
    disposition: Disposition,
) -> Result<Epochs> {
    let window = cfg.window(timing)?;
    let ids = taxonomy
        .split(&cfg.analysis_phase, &window.anchor, disposition)
        .ok_or_else(|| {
            AnalysisError::InvalidConfig(format!(
                "{}_{} is not a split sub-phase",
                cfg.analysis_phase, window.anchor
            ))
        })?;
    let epochs = cut_epochs(series, events, ids, window);
    if epochs.is_empty() {
        return Err(AnalysisError::EmptyEpochGroup { timing, disposition });
    }
    log::info!(
        "{timing}/{disposition}: {} epochs × {} ch × {} samples",
        epochs.len(),
        epochs.ch_names.len(),
        epochs.n_times()
    );
    Ok(epochs)
}
