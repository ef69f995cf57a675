//! Continuous multichannel series carried through preprocessing.
use ndarray::Array2;

use crate::error::{AnalysisError, Result};

/// A labelled instant on the series, in seconds from the first sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub onset: f64,
    pub duration: f64,
    pub description: String,
}

/// `[C, T]` amplitudes plus channel metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub data: Array2<f64>,
    pub ch_names: Vec<String>,
    pub sfreq: f64,
    /// Channels screened as bad. Kept in the data, excluded from the
    /// reference and the spectral estimates.
    pub bads: Vec<String>,
    pub annotations: Vec<Annotation>,
}

impl Series {
    pub fn new(data: Array2<f64>, ch_names: Vec<String>, sfreq: f64) -> Result<Self> {
        if data.nrows() != ch_names.len() {
            return Err(AnalysisError::LengthMismatch {
                what: "data rows vs channel names",
                left: data.nrows(),
                right: ch_names.len(),
            });
        }
        if data.ncols() == 0 {
            return Err(AnalysisError::EmptySeries);
        }
        Ok(Self {
            data,
            ch_names,
            sfreq,
            bads: Vec::new(),
            annotations: Vec::new(),
        })
    }

    pub fn n_channels(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_bad(&self, ch: usize) -> bool {
        self.bads.iter().any(|b| *b == self.ch_names[ch])
    }

    /// Row indices of channels not marked bad.
    pub fn good_channels(&self) -> Vec<usize> {
        (0..self.n_channels()).filter(|&c| !self.is_bad(c)).collect()
    }
}
