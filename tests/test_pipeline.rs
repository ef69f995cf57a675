mod common;
use common::{alternating_markers, bare_config, init_logging, max_abs_diff, session};
use ndarray::{s, Array2};
use std::f64::consts::PI;
use stimspec::{
    analyze_session, analyze_sessions, negative_deviation_ratio, AnalysisConfig, AnalysisError, Disposition, Marker,
    SessionInput, Timing,
};

const CONTROL: &str = "phaseA_stim_control_x";
const TRIGGER: &str = "phaseA_stim_trigger_y";

/// 2 channels, 1 kHz, 10 s of zeros, markers every 2 s.
fn zero_session() -> SessionInput {
    session(Array2::zeros((2, 10_000)), 1000.0, alternating_markers(5, 2.0, &[CONTROL, TRIGGER]))
}

/// 10 Hz sine at 250 Hz. Markers every 4 s from t = 2 s; amplitude is 1
/// outside stimulus windows, 0.5 inside neutral ones, 0.25 inside trigger
/// ones. Channel 1 carries the same waveform at −0.5×.
fn modulated_session() -> SessionInput {
    let sfreq = 250.0;
    let n = 7000;
    let win = 376;
    let mut amp = vec![1.0; n];
    let mut markers = vec![Marker::new(0.1, "session_start")];
    for k in 0..6 {
        let start = 500 + k * 1000;
        let (label, a) = if k % 2 == 0 { (CONTROL, 0.5) } else { (TRIGGER, 0.25) };
        amp[start..start + win].iter_mut().for_each(|v| *v = a);
        markers.push(Marker::new(start as f64 / sfreq, label));
    }
    let data = Array2::from_shape_fn((2, n), |(c, t)| {
        let gain = if c == 0 { 1.0 } else { -0.5 };
        gain * amp[t] * (2.0 * PI * 10.0 * t as f64 / sfreq).sin()
    });
    session(data, sfreq, markers)
}

#[test]
fn zero_session_has_zero_spectra_and_undefined_contrast() {
    init_logging();
    let cfg = bare_config("phaseA", 1000.0, 1.5);
    assert_eq!(cfg.flat_threshold, AnalysisConfig::default().flat_threshold);
    let artifact = analyze_session(&zero_session(), &cfg).unwrap();

    // Both channels are flat: marked bad, still epoched.
    assert_eq!(artifact.bads, vec!["EEG00".to_string(), "EEG01".to_string()]);
    assert_eq!(artifact.epochs[&(Timing::Stim, Disposition::Neutral)].ch_names.len(), 2);
    assert_eq!(artifact.epochs[&(Timing::Stim, Disposition::Neutral)].n_times(), 1501);
    assert_eq!(artifact.epochs[&(Timing::Stim, Disposition::Neutral)].len(), 3);
    assert_eq!(artifact.epochs[&(Timing::Stim, Disposition::Trigger)].len(), 2);
    // The prestim window of the first marker starts before the recording.
    assert_eq!(artifact.epochs[&(Timing::Prestim, Disposition::Neutral)].len(), 2);

    for (key, p) in &artifact.psd.power {
        assert!(p.iter().all(|&v| v == 0.0), "{key:?}: non-zero PSD");
    }
    for (band, groups) in &artifact.tfr {
        for (key, r) in groups {
            assert!(r.power.iter().all(|&v| v == 0.0), "{band} {key:?}: non-zero TFR power");
        }
    }

    let err = negative_deviation_ratio(&artifact).unwrap_err();
    assert!(matches!(err, AnalysisError::ZeroDenominator { .. }), "got {err:?}");
}

#[test]
fn modulated_session_contrast_and_normalisation() {
    init_logging();
    let cfg = bare_config("phaseA", 250.0, 1.5);
    let artifact = analyze_session(&modulated_session(), &cfg).unwrap();

    assert!(artifact.bads.is_empty());
    for d in Disposition::ALL {
        assert_eq!(artifact.epochs[&(Timing::Stim, d)].len(), 3);
        assert_eq!(artifact.epochs[&(Timing::Prestim, d)].len(), 3);
        assert_eq!(
            artifact.psd.freqs[&(Timing::Stim, d)],
            artifact.psd.freqs[&(Timing::Prestim, d)]
        );
    }

    // Stimulus epochs are exact scaled copies of the pre-stimulus ones.
    for (d, expected) in [(Disposition::Neutral, 0.25), (Disposition::Trigger, 0.0625)] {
        let np = &artifact.psd.normalized_power[&d];
        assert_eq!(np.ndim(), 1, "channels are averaged by default");
        for &v in np.iter() {
            approx::assert_relative_eq!(v, expected, max_relative = 1e-6);
        }
    }

    let ratios = negative_deviation_ratio(&artifact).unwrap();
    assert_eq!(ratios.len(), cfg.frequency_bands.len());
    for (band, &r) in &ratios {
        assert!((r - 1.25).abs() < 1e-6, "band {band}: ratio {r}");
    }

    // Every epoch starts at the same phase of the 10 Hz carrier.
    let alpha = &artifact.tfr["alpha"][&(Timing::Prestim, Disposition::Neutral)];
    let mid = alpha.times.len() / 2;
    for &v in alpha.itc.slice(s![.., .., mid]).iter() {
        approx::assert_abs_diff_eq!(v, 1.0, epsilon = 1e-9);
    }
    assert_eq!(alpha.freqs.len(), 8);
    approx::assert_abs_diff_eq!(alpha.times[0], -1.6);
}

#[test]
fn rate_mismatch_is_an_input_error() {
    let cfg = bare_config("phaseA", 1000.0, 1.5);
    let mut input = zero_session();
    input.sfreq = 500.0;
    let err = analyze_session(&input, &cfg).unwrap_err();
    assert_eq!(
        err.downcast_ref::<AnalysisError>(),
        Some(&AnalysisError::SampleRateMismatch { expected: 1000.0, got: 500.0 })
    );
}

#[test]
fn unsorted_clock_is_rejected() {
    let cfg = bare_config("phaseA", 1000.0, 1.5);
    let mut input = zero_session();
    input.sample_times.swap(10, 11);
    let err = analyze_session(&input, &cfg).unwrap_err();
    assert_eq!(
        err.downcast_ref::<AnalysisError>(),
        Some(&AnalysisError::UnsortedTimestamps { index: 11 })
    );
}

#[test]
fn missing_disposition_is_a_configuration_gap() {
    let cfg = bare_config("phaseA", 1000.0, 1.5);
    let input = session(Array2::zeros((2, 10_000)), 1000.0, alternating_markers(5, 2.0, &[CONTROL]));
    let err = analyze_session(&input, &cfg).unwrap_err();
    assert_eq!(
        err.downcast_ref::<AnalysisError>(),
        Some(&AnalysisError::EmptyEpochGroup {
            timing: Timing::Prestim,
            disposition: Disposition::Trigger
        })
    );
}

#[test]
fn flat_channel_is_screened_then_interpolated() {
    let mut input = modulated_session();
    let n = input.data.ncols();
    let mut data = Array2::zeros((3, n));
    data.slice_mut(s![..2, ..]).assign(&input.data);
    input.data = data;
    input.ch_names.push("EEG02".into());
    input.chan_pos = Some(ndarray::array![[0.0, 0.0, 0.0], [0.1, 0.0, 0.0], [0.05, 0.0, 0.0]]);

    let mut cfg = bare_config("phaseA", 250.0, 1.5);

    let screened = analyze_session(&input, &cfg).unwrap();
    assert_eq!(screened.bads, vec!["EEG02".to_string()]);
    assert_eq!(screened.epochs[&(Timing::Stim, Disposition::Neutral)].ch_names.len(), 2);

    cfg.interpolate_bads = true;
    let interpolated = analyze_session(&input, &cfg).unwrap();
    assert_eq!(interpolated.bads, vec!["EEG02".to_string()]);
    let ep = &interpolated.epochs[&(Timing::Stim, Disposition::Neutral)];
    assert_eq!(ep.ch_names.len(), 3);
    // Midway between the two good channels: their plain average.
    let mean = (&ep.data.slice(s![.., 0, ..]) + &ep.data.slice(s![.., 1, ..])) * 0.5;
    assert!(max_abs_diff(&ep.data.slice(s![.., 2, ..]).to_owned(), &mean) < 1e-12);
    assert!(mean.iter().any(|v| v.abs() > 0.1));
}

#[test]
fn parallel_sessions_match_sequential_runs() {
    let cfg = bare_config("phaseA", 250.0, 1.5);
    let inputs = vec![modulated_session(), modulated_session()];
    let results = analyze_sessions(&inputs, &cfg);
    assert_eq!(results.len(), 2);
    let sequential = analyze_session(&inputs[0], &cfg).unwrap().to_bytes().unwrap();
    for r in results {
        assert_eq!(r.unwrap().to_bytes().unwrap(), sequential);
    }

    let mut bad = inputs;
    bad[1].sfreq = 125.0;
    let results = analyze_sessions(&bad, &cfg);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
}
