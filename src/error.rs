//! Error taxonomy for the analysis core.
//!
//! Three classes of failure, none of them retried:
//!
//! * **input contract** — the recording or marker stream violates a
//!   precondition (rate mismatch, unsorted timestamps, unknown label);
//! * **statistical precondition** — a ratio or average would be
//!   meaningless (mismatched frequency axes, zero denominator);
//! * **configuration gap** — the configuration would yield an empty result
//!   that could be mistaken for a valid zero.
use thiserror::Error;

use crate::config::{Disposition, Timing};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    // ── input contract ───────────────────────────────────────────────────
    #[error("sampling rate mismatch: expected {expected} Hz, got {got} Hz")]
    SampleRateMismatch { expected: f64, got: f64 },

    #[error("sample timestamps are not sorted ascending (index {index})")]
    UnsortedTimestamps { index: usize },

    #[error("series has no samples")]
    EmptySeries,

    #[error("length mismatch in {what}: {left} vs {right}")]
    LengthMismatch {
        what: &'static str,
        left: usize,
        right: usize,
    },

    #[error("label {0:?} is not present in the taxonomy")]
    UnknownLabel(String),

    #[error("shape mismatch in {what}: {left:?} vs {right:?}")]
    ShapeMismatch {
        what: String,
        left: Vec<usize>,
        right: Vec<usize>,
    },

    // ── statistical preconditions ────────────────────────────────────────
    #[error("normalized power for {disposition}: stimulus and pre-stimulus frequency axes differ")]
    FrequencyAxisMismatch { disposition: Disposition },

    #[error("negative-deviation ratio for band {band:?}: neutral average is zero")]
    ZeroDenominator { band: String },

    #[error("no good channels left for {0}")]
    NoGoodChannels(&'static str),

    // ── configuration gaps ───────────────────────────────────────────────
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("band {band:?} has no frequency points in {context}")]
    EmptyBand { band: String, context: &'static str },

    #[error("no epochs survived for timing {timing}, disposition {disposition}")]
    EmptyEpochGroup {
        timing: Timing,
        disposition: Disposition,
    },

    #[error("wavelet at {freq:.3} Hz spans {wavelet_len} samples, epoch has only {n_times}")]
    WaveletTooLong {
        freq: f64,
        wavelet_len: usize,
        n_times: usize,
    },
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
