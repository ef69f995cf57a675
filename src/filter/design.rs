//! FIR filter design matching MNE / `scipy.signal.firwin`.
//!
//! Bandpass at `[l_freq, h_freq]` with sampling rate `sfreq`:
//!   • lower transition  = min(max(0.25 * l_freq, 2.0), l_freq)
//!   • upper transition  = min(max(0.25 * h_freq, 2.0), nyq - h_freq)
//!   • filter length N   = ceil(3.3 / min(transitions) * sfreq), rounded to odd
//!   • cutoffs at the transition midpoints, lowpass(hi) − lowpass(lo)
//!
//! Notch at `f`: width f/200, 1 Hz transition, band-stop by spectral
//! inversion of the matching bandpass.
use std::f64::consts::PI;

/// Transition bandwidth of a notch stop band, in Hz.
pub const NOTCH_TRANS_BANDWIDTH: f64 = 1.0;

/// Lower and upper transition bandwidths for an MNE-style bandpass.
pub fn bandpass_transitions(l_freq: f64, h_freq: f64, sfreq: f64) -> (f64, f64) {
    let nyq = sfreq / 2.0;
    let l_tb = (0.25 * l_freq).max(2.0).min(l_freq);
    let h_tb = (0.25 * h_freq).max(2.0).min(nyq - h_freq);
    (l_tb, h_tb)
}

/// Number of FIR taps for a given transition bandwidth.
/// Returns an odd integer (required for zero-phase linear-phase FIR).
///
/// Formula: `ceil(3.3 / trans_bw * sfreq)` rounded up to odd.
pub fn filter_length(trans_bw: f64, sfreq: f64) -> usize {
    let n_raw = (3.3 / trans_bw * sfreq).ceil() as usize;
    if n_raw % 2 == 0 { n_raw + 1 } else { n_raw }
}

/// Design a zero-phase bandpass FIR filter using Hamming-windowed sincs.
///
/// Matches the shape of `mne.filter.create_filter(data, sfreq, l_freq, h_freq,
///   filter_length='auto', fir_window='hamming', phase='zero')`.
pub fn design_bandpass(l_freq: f64, h_freq: f64, sfreq: f64) -> Vec<f64> {
    let (l_tb, h_tb) = bandpass_transitions(l_freq, h_freq, sfreq);
    let n = filter_length(l_tb.min(h_tb), sfreq);

    let hi = firwin(n, h_freq + h_tb / 2.0, sfreq, true);
    let lo = firwin(n, l_freq - l_tb / 2.0, sfreq, true);
    hi.iter().zip(&lo).map(|(a, b)| a - b).collect()
}

/// Design a band-stop FIR filter removing a narrow band around `freq`.
///
/// When the stop band reaches Nyquist the filter degenerates to a lowpass
/// below the stop band.
pub fn design_notch(freq: f64, sfreq: f64) -> Vec<f64> {
    let nyq = sfreq / 2.0;
    let half = freq / 400.0 + NOTCH_TRANS_BANDWIDTH / 2.0;
    let n = filter_length(NOTCH_TRANS_BANDWIDTH, sfreq);
    let (lo_cut, hi_cut) = (freq - half, freq + half);

    let lo = firwin(n, lo_cut, sfreq, true);
    if hi_cut >= nyq {
        return lo;
    }
    // Band-stop = delta − (lowpass(hi) − lowpass(lo)).
    let hi = firwin(n, hi_cut, sfreq, true);
    let mut h: Vec<f64> = hi.iter().zip(&lo).map(|(a, b)| b - a).collect();
    h[n / 2] += 1.0;
    h
}

/// Line frequency and its harmonics strictly below Nyquist.
pub fn notch_harmonics(base: f64, sfreq: f64) -> Vec<f64> {
    let nyq = sfreq / 2.0;
    (1..)
        .map(|k| base * k as f64)
        .take_while(|&f| f < nyq)
        .collect()
}

/// Design a lowpass (or, with `pass_zero = false`, highpass) FIR filter
/// using a Hamming-windowed sinc. `cutoff_hz` is the -6 dB point.
pub fn firwin(n: usize, cutoff_hz: f64, sfreq: f64, pass_zero: bool) -> Vec<f64> {
    assert!(n % 2 == 1, "firwin requires odd N for linear-phase filter");
    let alpha = (n - 1) as f64 / 2.0;
    let nyq = sfreq / 2.0;
    let fc = cutoff_hz / nyq; // normalised [0, 1]

    let win = hamming(n);

    let mut h: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64 - alpha;
            // f(x) = sin(π·fc·x) / (π·x);  lim_{x→0} f(x) = fc
            let sinc = if x == 0.0 { fc } else { (PI * fc * x).sin() / (PI * x) };
            sinc * win[i]
        })
        .collect();

    // Unit DC gain.
    let s: f64 = h.iter().sum();
    h.iter_mut().for_each(|v| *v /= s);

    if !pass_zero {
        h.iter_mut().for_each(|v| *v = -*v);
        h[n / 2] += 1.0;
    }

    h
}

/// Hamming window of length `n`.
pub fn hamming(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

/// Magnitude of the frequency response of `h` at `freq` Hz.
pub fn gain_at(h: &[f64], freq: f64, sfreq: f64) -> f64 {
    let w = 2.0 * PI * freq / sfreq;
    let (re, im) = h.iter().enumerate().fold((0.0, 0.0), |(re, im), (k, &c)| {
        let phi = w * k as f64;
        (re + c * phi.cos(), im - c * phi.sin())
    });
    (re * re + im * im).sqrt()
}
