//! Analysis configuration.
//!
//! [`AnalysisConfig`] holds every tunable parameter of the session pipeline.
//! All fields have defaults that match the settings used for the aversive
//! sound test (AST) recordings: 125 Hz OpenBCI data, 2–50 Hz bandpass,
//! 60 Hz notch, −0.5 s … +4 s epochs.
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Coarse phase of an epoch relative to stimulus onset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timing {
    Prestim,
    Stim,
}

impl Timing {
    pub const ALL: [Timing; 2] = [Timing::Prestim, Timing::Stim];

    pub fn as_str(self) -> &'static str {
        match self {
            Timing::Prestim => "prestim",
            Timing::Stim => "stim",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Experimental condition encoded in the marker label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Neutral,
    Trigger,
}

impl Disposition {
    pub const ALL: [Disposition; 2] = [Disposition::Neutral, Disposition::Trigger];

    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Neutral => "neutral",
            Disposition::Trigger => "trigger",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == s)
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bandpass cutoffs in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bandpass {
    pub low: f64,
    pub high: f64,
}

/// Epoch window for one timing, relative to its anchor marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochWindow {
    /// Sub-phase whose markers anchor this window (e.g. `"prestim"`).
    ///
    /// A pre-stimulus window may anchor on `"stim"` markers with a negative
    /// onset when the recording carries no separate pre-stimulus marker.
    pub anchor: String,
    /// Window start relative to the anchor sample, in seconds (may be negative).
    pub onset: f64,
    /// Window length in seconds. The window spans
    /// `round(onset × sfreq) ..= round((onset + duration) × sfreq)` samples.
    pub duration: f64,
    /// Baseline interval `(start, end)` in seconds relative to the anchor.
    /// Each channel's mean over this interval is subtracted from the epoch.
    /// `None` disables baseline correction.
    pub baseline: Option<(f64, f64)>,
}

/// A named frequency band for time-frequency aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandSpec {
    pub low: f64,
    pub high: f64,
    /// Number of log-spaced center frequencies between `low` and `high`.
    pub num_points: usize,
}

impl BandSpec {
    /// Center frequencies, log-spaced from `low` to `high` inclusive.
    ///
    /// Depends only on the three configured numbers, so identical configs
    /// always produce bit-identical frequency vectors.
    pub fn freqs(&self) -> Vec<f64> {
        let (a, b) = (self.low.log10(), self.high.log10());
        match self.num_points {
            0 => vec![],
            1 => vec![self.low],
            n => {
                let step = (b - a) / (n - 1) as f64;
                (0..n).map(|i| 10f64.powf(a + step * i as f64)).collect()
            }
        }
    }

    /// Whether `f` falls in the half-open range `[low, high)`.
    pub fn contains(&self, f: f64) -> bool {
        f >= self.low && f < self.high
    }
}

/// Power spectral density settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsdConfig {
    pub fmin: f64,
    pub fmax: f64,
    /// Welch segment length in samples. Clipped to the epoch length.
    pub n_fft: usize,
    /// Average the spectrum across channels as well as epochs.
    pub average_channels: bool,
    /// Also compute min–max normalised per-channel band power.
    pub band_normalize: bool,
}

impl Default for PsdConfig {
    fn default() -> Self {
        Self {
            fmin: 2.0,
            fmax: 50.0,
            n_fft: 256,
            average_channels: true,
            band_normalize: false,
        }
    }
}

/// Configuration for the full session analysis.
///
/// All fields are `pub`; override a subset with struct-update syntax:
///
/// ```
/// use stimspec::AnalysisConfig;
///
/// let cfg = AnalysisConfig {
///     expected_sfreq: 250.0,
///     notch: Some(50.0),
///     ..AnalysisConfig::default()
/// };
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Nominal sampling rate the recording must declare, in Hz.
    ///
    /// Default: `125.0`.
    pub expected_sfreq: f64,

    /// Peak-to-peak amplitude below which a channel is screened as flat.
    /// Same units as the input data (volts by default). `None` disables
    /// screening.
    ///
    /// Default: `Some(1e-7)` (0.1 µV).
    pub flat_threshold: Option<f64>,

    /// Zero-phase FIR bandpass. `None` disables it.
    ///
    /// Default: 2–50 Hz.
    pub bandpass: Option<Bandpass>,

    /// Line frequency for the notch filter; harmonics up to Nyquist are
    /// removed too. `None` disables it.
    ///
    /// Default: `Some(60.0)`.
    pub notch: Option<f64>,

    /// Subtract the mean of all non-bad channels after the bandpass stage.
    /// Only applies when `bandpass` is set.
    ///
    /// Default: `true`.
    pub average_reference: bool,

    /// Interpolate bad channels from their neighbours when the session
    /// provides channel positions.
    ///
    /// Default: `false`.
    pub interpolate_bads: bool,

    /// Phase prefixes grouped by the taxonomy.
    pub phases: Vec<String>,

    /// Phases whose sub-phases are split into neutral / trigger.
    pub split_phases: Vec<String>,

    /// Sub-phase names of a split phase; a label belongs to sub-phase `s`
    /// of phase `p` when it starts with `"{p}_{s}"`.
    pub sub_phases: Vec<String>,

    /// Substring marking a neutral (control) label. Case-insensitive.
    pub control_marker: String,

    /// Split phase whose epochs are analysed.
    pub analysis_phase: String,

    /// Epoch window for each timing.
    pub epoch_windows: BTreeMap<Timing, EpochWindow>,

    pub psd: PsdConfig,

    /// Named bands for the time-frequency decomposition.
    pub frequency_bands: BTreeMap<String, BandSpec>,

    /// Wavelet cycles per Hz: `n_cycles = freq × cycle_ratio`.
    ///
    /// Default: `0.5`.
    pub cycle_ratio: f64,

    /// Keep every `decim`-th time point of the time-frequency output.
    ///
    /// Default: `3`.
    pub decim: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let window = |anchor: &str| EpochWindow {
            anchor: anchor.to_string(),
            onset: -0.5,
            duration: 4.5,
            baseline: Some((-0.5, 0.0)),
        };
        let band = |low, high| BandSpec { low, high, num_points: 8 };
        let strings = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();

        Self {
            expected_sfreq: 125.0,
            flat_threshold: Some(1e-7),
            bandpass: Some(Bandpass { low: 2.0, high: 50.0 }),
            notch: Some(60.0),
            average_reference: true,
            interpolate_bads: false,
            phases: strings(&["pmt", "hlt", "let", "ast"]),
            split_phases: strings(&["ast"]),
            sub_phases: strings(&["prestim", "stim", "poststim"]),
            control_marker: "control".to_string(),
            analysis_phase: "ast".to_string(),
            epoch_windows: BTreeMap::from([
                (Timing::Prestim, window("prestim")),
                (Timing::Stim, window("stim")),
            ]),
            psd: PsdConfig::default(),
            frequency_bands: BTreeMap::from([
                ("delta".to_string(), band(1.0, 4.0)),
                ("theta".to_string(), band(4.0, 8.0)),
                ("alpha".to_string(), band(8.0, 13.0)),
                ("beta".to_string(), band(13.0, 30.0)),
                ("gamma".to_string(), band(30.0, 50.0)),
            ]),
            cycle_ratio: 0.5,
            decim: 3,
        }
    }
}

impl AnalysisConfig {
    /// Load a configuration from a JSON file. Missing fields take their
    /// defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: Self = serde_json::from_slice(&bytes).context("failed to parse config JSON")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Window for `timing`, or a configuration error if none is set.
    pub fn window(&self, timing: Timing) -> Result<&EpochWindow, AnalysisError> {
        self.epoch_windows
            .get(&timing)
            .ok_or_else(|| AnalysisError::InvalidConfig(format!("no epoch window for {timing}")))
    }

    /// Reject configurations that would produce empty or meaningless
    /// results.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let invalid = |msg: String| Err(AnalysisError::InvalidConfig(msg));
        let nyq = self.expected_sfreq / 2.0;

        if self.expected_sfreq <= 0.0 {
            return invalid(format!("expected_sfreq must be positive, got {}", self.expected_sfreq));
        }
        if let Some(bp) = self.bandpass {
            if !(bp.low > 0.0 && bp.low < bp.high && bp.high < nyq) {
                return invalid(format!(
                    "bandpass {}–{} Hz must satisfy 0 < low < high < {nyq} Hz",
                    bp.low, bp.high
                ));
            }
        }
        if let Some(f) = self.notch {
            if f <= 0.0 {
                return invalid(format!("notch frequency must be positive, got {f}"));
            }
        }
        if let Some(t) = self.flat_threshold {
            if t <= 0.0 {
                return invalid(format!("flat_threshold must be positive, got {t}"));
            }
        }
        if !self.split_phases.contains(&self.analysis_phase) {
            return invalid(format!(
                "analysis_phase {:?} is not one of the split phases",
                self.analysis_phase
            ));
        }
        for timing in Timing::ALL {
            let w = self.window(timing)?;
            if w.duration <= 0.0 {
                return invalid(format!("{timing} window duration must be positive"));
            }
            if !self.sub_phases.contains(&w.anchor) {
                return invalid(format!("{timing} window anchor {:?} is not a sub-phase", w.anchor));
            }
            if let Some((b0, b1)) = w.baseline {
                if b0 >= b1 || b0 < w.onset || b1 > w.onset + w.duration {
                    return invalid(format!(
                        "{timing} baseline ({b0}, {b1}) must be a non-empty interval inside the window"
                    ));
                }
            }
        }
        if self.psd.fmin >= self.psd.fmax || self.psd.n_fft == 0 {
            return invalid("psd needs fmin < fmax and n_fft > 0".to_string());
        }
        if self.frequency_bands.is_empty() {
            return invalid("no frequency bands configured".to_string());
        }
        for (name, band) in &self.frequency_bands {
            if name.is_empty() || name.contains('/') {
                return invalid(format!("band name {name:?} must be non-empty and contain no '/'"));
            }
            if band.num_points == 0 {
                return Err(AnalysisError::EmptyBand {
                    band: name.clone(),
                    context: "configuration",
                });
            }
            if !(band.low > 0.0 && band.low < band.high && band.high < nyq) {
                return invalid(format!(
                    "band {name:?} {}–{} Hz must satisfy 0 < low < high < {nyq} Hz",
                    band.low, band.high
                ));
            }
        }
        if self.cycle_ratio <= 0.0 {
            return invalid(format!("cycle_ratio must be positive, got {}", self.cycle_ratio));
        }
        if self.decim == 0 {
            return invalid("decim must be at least 1".to_string());
        }
        Ok(())
    }
}
