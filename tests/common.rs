/// Shared helpers: synthetic sessions and analysis configurations.
use ndarray::{Array, Array2, Dimension};
use stimspec::{AnalysisConfig, EpochWindow, Marker, SessionInput, Timing};

#[allow(unused)]
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[allow(unused)]
/// A session of `data` sampled at `sfreq` from t = 0, with `markers`.
pub fn session(data: Array2<f64>, sfreq: f64, markers: Vec<Marker>) -> SessionInput {
    let n = data.ncols();
    SessionInput {
        ch_names: (0..data.nrows()).map(|c| format!("EEG{c:02}")).collect(),
        data,
        sfreq,
        sample_times: (0..n).map(|i| i as f64 / sfreq).collect(),
        markers,
        chan_pos: None,
    }
}

#[allow(unused)]
/// Markers every `period` seconds starting at 0, alternating between
/// `labels`.
pub fn alternating_markers(count: usize, period: f64, labels: &[&str]) -> Vec<Marker> {
    (0..count)
        .map(|i| Marker::new(i as f64 * period, labels[i % labels.len()]))
        .collect()
}

#[allow(unused)]
/// Configuration for a single split phase `phase` at `sfreq` with
/// filtering off and default flat-channel screening. Both windows anchor
/// on stimulus markers: stim `[0, duration]`, prestim
/// `[-duration - 0.1, -0.1]`.
pub fn bare_config(phase: &str, sfreq: f64, duration: f64) -> AnalysisConfig {
    let window = |onset| EpochWindow {
        anchor: "stim".into(),
        onset,
        duration,
        baseline: None,
    };
    AnalysisConfig {
        expected_sfreq: sfreq,
        bandpass: None,
        notch: None,
        phases: vec![phase.into()],
        split_phases: vec![phase.into()],
        analysis_phase: phase.into(),
        epoch_windows: [(Timing::Prestim, window(-duration - 0.1)), (Timing::Stim, window(0.0))].into(),
        ..AnalysisConfig::default()
    }
}

#[allow(unused)]
pub fn max_abs_diff<D: Dimension>(a: &Array<f64, D>, b: &Array<f64, D>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0_f64, f64::max)
}
