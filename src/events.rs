//! Event records: aligned sample index + integer label, one per marker.
use crate::error::{AnalysisError, Result};
use crate::taxonomy::Taxonomy;

/// A marker as recorded: timestamp on the series clock plus label text.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub time: f64,
    pub label: String,
}

impl Marker {
    pub fn new(time: f64, label: impl Into<String>) -> Self {
        Self { time, label: label.into() }
    }
}

/// One row of the event table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub sample: usize,
    pub id: i32,
}

/// Zip aligned sample indices with taxonomy ids, preserving marker order.
pub fn build_event_records<S: AsRef<str>>(
    samples: &[usize],
    labels: &[S],
    taxonomy: &Taxonomy,
) -> Result<Vec<EventRecord>> {
    if samples.len() != labels.len() {
        return Err(AnalysisError::LengthMismatch {
            what: "event samples vs labels",
            left: samples.len(),
            right: labels.len(),
        });
    }
    samples
        .iter()
        .zip(labels)
        .map(|(&sample, label)| {
            let label = label.as_ref();
            taxonomy
                .id(label)
                .map(|id| EventRecord { sample, id })
                .ok_or_else(|| AnalysisError::UnknownLabel(label.to_string()))
        })
        .collect()
}
