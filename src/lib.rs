//! # stimspec — condition-wise spectral analysis of stimulus sessions
//!
//! `stimspec` turns one recorded session (a continuous multichannel series
//! plus a sparse stream of text-labelled event markers) into per-condition
//! power spectra, Morlet time-frequency power and inter-trial coherence,
//! and a trigger-versus-neutral contrast statistic.
//!
//! ## Pipeline overview
//!
//! ```text
//! SessionInput { data [C, N], sample_times [N], markers [(t, label)] }
//!   │
//!   ├─ align::align_markers          nearest sample per marker (ties → earlier)
//!   ├─ taxonomy::Taxonomy::build     label ↔ id, phase / sub-phase / disposition
//!   ├─ events::build_event_records   (sample, id) per marker
//!   ├─ preprocess::preprocess        rate check → screen → annotate → notch
//!   │                                → bandpass (→ average reference)
//!   ├─ epoch::epochs_for_group       (timing, disposition) windows [E, C, T]
//!   ├─ spectrum                      Welch PSD, stim / prestim ratio
//!   ├─ tfr::tfr_morlet               per band: power + ITC  [C, F, T']
//!   │
//!   └─→ artifact::SessionArtifact ──→ contrast::negative_deviation_ratio
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use stimspec::{analyze_session, negative_deviation_ratio, AnalysisConfig, Marker, SessionInput};
//! use ndarray::Array2;
//!
//! let sfreq = 125.0;
//! let n = 125 * 60;
//! let input = SessionInput {
//!     data: Array2::from_shape_fn((8, n), |(c, t)| ((t + 7 * c) as f64 * 0.37).sin() * 1e-5),
//!     ch_names: (0..8).map(|i| format!("EEG{i}")).collect(),
//!     sfreq,
//!     sample_times: (0..n).map(|i| i as f64 / sfreq).collect(),
//!     markers: vec![
//!         Marker::new(5.0, "ast_prestim_control_01"),
//!         Marker::new(6.0, "ast_stim_control_01"),
//!         Marker::new(20.0, "ast_prestim_scream_02"),
//!         Marker::new(21.0, "ast_stim_scream_02"),
//!     ],
//!     chan_pos: None,
//! };
//!
//! let artifact = analyze_session(&input, &AnalysisConfig::default()).unwrap();
//! artifact.write(std::path::Path::new("session.safetensors")).unwrap();
//! let ratios = negative_deviation_ratio(&artifact).unwrap();
//! ```
//!
//! Each stage is also exposed on its own; see the module docs.

pub mod align;
pub mod artifact;
pub mod config;
pub mod contrast;
pub mod epoch;
pub mod error;
pub mod events;
pub mod filter;
pub mod normalize;
pub mod preprocess;
pub mod reference;
pub mod series;
pub mod spectrum;
pub mod taxonomy;
pub mod tfr;

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use ndarray::{Array2, Ix2};
use rayon::prelude::*;

// ── Crate-root re-exports ─────────────────────────────────────────────────

pub use align::{align_markers, nearest_sample_indices};
pub use artifact::{BandTfr, GroupKey, PsdArtifact, SessionArtifact, TensorFile, TensorWriter};
pub use config::{AnalysisConfig, BandSpec, Bandpass, Disposition, EpochWindow, PsdConfig, Timing};
pub use contrast::{average_negative, band_negative_deviation, negative_deviation_ratio};
pub use epoch::{cut_epochs, epochs_for_group, Epochs};
pub use error::AnalysisError;
pub use events::{build_event_records, EventRecord, Marker};
pub use normalize::{baseline_correct_inplace, normalized_power};
pub use preprocess::{interpolate_bad_channels, preprocess, Stage, StageContext, STAGES};
pub use reference::average_reference_inplace;
pub use series::{Annotation, Series};
pub use spectrum::{average_power, band_ratios, psd_epochs, Welch};
pub use taxonomy::{common_labels, is_neutral, Taxonomy, TaxonomySpec};
pub use tfr::{morlet, tfr_morlet, TfrResult};

/// One recorded session as handed over by the container loader.
#[derive(Debug, Clone)]
pub struct SessionInput {
    /// `[C, N]` amplitudes in physical units.
    pub data: Array2<f64>,
    pub ch_names: Vec<String>,
    /// Declared sampling rate, Hz.
    pub sfreq: f64,
    /// Timestamp of each of the N samples, ascending.
    pub sample_times: Vec<f64>,
    /// Event markers in the same time base as `sample_times`.
    pub markers: Vec<Marker>,
    /// `[C, 3]` channel positions, needed only for bad-channel interpolation.
    pub chan_pos: Option<Array2<f64>>,
}

/// Run the **full analysis** on one session.
///
/// # Pipeline steps
///
/// 1. Validate `cfg`.
/// 2. Align every marker to its nearest sample.
/// 3. Build the label taxonomy and the event records.
/// 4. Preprocess (rate check, flat-channel screening, annotation, notch,
///    bandpass, then average reference when the bandpass ran), then
///    interpolate bad channels if
///    [`AnalysisConfig::interpolate_bads`] is set and positions are given.
/// 5. For each (timing, disposition): cut epochs, compute the PSD, and the
///    Morlet power / ITC of every configured band.
/// 6. Normalise stimulus PSD by pre-stimulus PSD per disposition.
///
/// # Errors
///
/// Any [`AnalysisError`] raised along the way, wrapped with the stage that
/// raised it. Recover the typed error with
/// `err.downcast_ref::<AnalysisError>()`. No partial artifact is returned.
pub fn analyze_session(input: &SessionInput, cfg: &AnalysisConfig) -> Result<SessionArtifact> {
    cfg.validate().context("invalid analysis configuration")?;
    if input.sample_times.len() != input.data.ncols() {
        return Err(AnalysisError::LengthMismatch {
            what: "sample timestamps vs data columns",
            left: input.sample_times.len(),
            right: input.data.ncols(),
        }
        .into());
    }

    let marker_times: Vec<f64> = input.markers.iter().map(|m| m.time).collect();
    let labels: Vec<&str> = input.markers.iter().map(|m| m.label.as_str()).collect();
    let samples = align_markers(&input.sample_times, &marker_times).context("aligning markers")?;

    let spec = TaxonomySpec {
        phases: &cfg.phases,
        split_phases: &cfg.split_phases,
        sub_phases: &cfg.sub_phases,
        control_marker: &cfg.control_marker,
    };
    let taxonomy = Taxonomy::build(&labels, &spec);
    log::info!("{} markers, {} distinct labels", labels.len(), taxonomy.len());
    let events = build_event_records(&samples, &labels, &taxonomy)?;

    let series = Series::new(input.data.clone(), input.ch_names.clone(), input.sfreq)?;
    let ctx = StageContext { cfg, events: &events, taxonomy: &taxonomy };
    let mut series = preprocess(series, &ctx).context("preprocessing")?;
    let bads = series.bads.clone();
    if cfg.interpolate_bads {
        match &input.chan_pos {
            Some(pos) => interpolate_bad_channels(&mut series, pos).context("interpolating bad channels")?,
            None => log::warn!("interpolate_bads is set but no channel positions were given"),
        }
    }

    let mut artifact = SessionArtifact {
        sfreq: series.sfreq,
        ch_names: series.ch_names.clone(),
        bads,
        ..SessionArtifact::default()
    };

    for timing in Timing::ALL {
        for disposition in Disposition::ALL {
            let key = (timing, disposition);
            let epochs = epochs_for_group(&series, &events, &taxonomy, cfg, timing, disposition)
                .with_context(|| format!("epoching {timing}/{disposition}"))?;

            let (power, freqs) = psd_epochs(&epochs, &cfg.psd)?;
            if cfg.psd.band_normalize {
                let per_channel = average_power(&power, false)?.into_dimensionality::<Ix2>()?;
                let ratios = band_ratios(&per_channel, &freqs, &cfg.frequency_bands)?;
                artifact.psd.band_power.insert(key, ratios);
            }
            artifact.psd.power.insert(key, average_power(&power, cfg.psd.average_channels)?);
            artifact.psd.freqs.insert(key, freqs);

            for (name, band) in &cfg.frequency_bands {
                let freqs = band.freqs();
                let n_cycles: Vec<f64> = freqs.iter().map(|f| f * cfg.cycle_ratio).collect();
                let tfr = tfr_morlet(&epochs, &freqs, &n_cycles, cfg.decim)
                    .with_context(|| format!("tfr {name} {timing}/{disposition}"))?;
                artifact.tfr.entry(name.clone()).or_default().insert(key, tfr);
            }
            artifact.epochs.insert(key, epochs);
        }
    }

    let psd = &artifact.psd;
    let normalized = Disposition::ALL
        .into_iter()
        .map(|d| {
            let stim = (Timing::Stim, d);
            let pre = (Timing::Prestim, d);
            let ratio = normalized_power(d, &psd.power[&stim], &psd.freqs[&stim], &psd.power[&pre], &psd.freqs[&pre])?;
            Ok((d, ratio))
        })
        .collect::<Result<BTreeMap<_, _>>>()?;
    artifact.psd.normalized_power = normalized;

    Ok(artifact)
}

/// Run [`analyze_session`] on every session in parallel. Sessions share
/// nothing but `cfg`; results are returned in input order.
pub fn analyze_sessions(inputs: &[SessionInput], cfg: &AnalysisConfig) -> Vec<Result<SessionArtifact>> {
    inputs.par_iter().map(|input| analyze_session(input, cfg)).collect()
}
