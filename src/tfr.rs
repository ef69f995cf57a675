//! Morlet time-frequency decomposition with inter-trial coherence.
//!
//! Follows `mne.time_frequency.tfr_morlet(..., average=True, return_itc=True)`:
//!
//! ```text
//! σ_t  = n_cycles / (2π f)
//! t    = −5σ_t … +5σ_t  in steps of 1/sfreq
//! W(t) = (exp(2iπ f t) − exp(−2 (π f σ_t)²)) · exp(−t² / 2σ_t²)
//! W   /= √0.5 · ‖W‖₂
//! tfr  = x ⊛ W   ("same" length as x, every `decim`-th sample kept)
//!
//! power = mean_e |tfr|²
//! itc   = | mean_e tfr / |tfr| |
//! ```
use std::f64::consts::PI;

use ndarray::{s, Array1, Array3};
use rustfft::{num_complex::Complex, FftPlanner};

use crate::epoch::Epochs;
use crate::error::{AnalysisError, Result};

/// Epoch-averaged time-frequency power and ITC, `[C, F, T']`.
#[derive(Debug, Clone, PartialEq)]
pub struct TfrResult {
    pub power: Array3<f64>,
    pub itc: Array3<f64>,
    pub freqs: Array1<f64>,
    /// Seconds relative to the epoch anchor, after decimation.
    pub times: Array1<f64>,
}

/// Complex Morlet wavelet at `freq` Hz with `n_cycles` cycles.
pub fn morlet(sfreq: f64, freq: f64, n_cycles: f64) -> Vec<Complex<f64>> {
    let sigma_t = n_cycles / (2.0 * PI * freq);
    let half = (5.0 * sigma_t * sfreq).ceil() as i64;
    let real_offset = (-2.0 * (PI * freq * sigma_t).powi(2)).exp();

    let mut w: Vec<Complex<f64>> = (1 - half..half)
        .map(|k| {
            let t = k as f64 / sfreq;
            let osc = Complex::new(0.0, 2.0 * PI * freq * t).exp() - real_offset;
            osc * (-t * t / (2.0 * sigma_t * sigma_t)).exp()
        })
        .collect();

    let norm = w.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt() * 0.5_f64.sqrt();
    w.iter_mut().for_each(|c| *c /= norm);
    w
}

/// Time-frequency power and ITC of `epochs` at `freqs`, averaged over epochs.
///
/// # Errors
///
/// * [`AnalysisError::LengthMismatch`] if `freqs` and `n_cycles` differ in length.
/// * [`AnalysisError::WaveletTooLong`] if a wavelet outlasts the epoch.
/// * [`AnalysisError::InvalidConfig`] if `decim` is zero.
pub fn tfr_morlet(epochs: &Epochs, freqs: &[f64], n_cycles: &[f64], decim: usize) -> Result<TfrResult> {
    if freqs.len() != n_cycles.len() {
        return Err(AnalysisError::LengthMismatch {
            what: "freqs vs n_cycles",
            left: freqs.len(),
            right: n_cycles.len(),
        });
    }
    if decim == 0 {
        return Err(AnalysisError::InvalidConfig("decim must be at least 1".to_string()));
    }
    let (n_e, n_c, n_t) = epochs.data.dim();

    let wavelets: Vec<Vec<Complex<f64>>> = freqs
        .iter()
        .zip(n_cycles)
        .map(|(&f, &nc)| morlet(epochs.sfreq, f, nc))
        .collect();
    for (w, &f) in wavelets.iter().zip(freqs) {
        if w.len() > n_t {
            return Err(AnalysisError::WaveletTooLong {
                freq: f,
                wavelet_len: w.len(),
                n_times: n_t,
            });
        }
    }

    let max_w = wavelets.iter().map(Vec::len).max().unwrap_or(1);
    let n_fft = (n_t + max_w - 1).next_power_of_two();
    let mut planner: FftPlanner<f64> = FftPlanner::new();
    let fwd = planner.plan_fft_forward(n_fft);
    let inv = planner.plan_fft_inverse(n_fft);
    let inv_scale = 1.0 / n_fft as f64;

    let wavelet_ffts: Vec<Vec<Complex<f64>>> = wavelets
        .iter()
        .map(|w| {
            let mut buf = w.clone();
            buf.resize(n_fft, Complex::default());
            fwd.process(&mut buf);
            buf
        })
        .collect();

    let kept: Vec<usize> = (0..n_t).step_by(decim).collect();
    let n_f = freqs.len();
    let mut power = Array3::<f64>::zeros((n_c, n_f, kept.len()));
    let mut phase_sum = Array3::<Complex<f64>>::zeros((n_c, n_f, kept.len()));

    let mut x_fft = vec![Complex::default(); n_fft];
    let mut y = vec![Complex::default(); n_fft];
    for e in 0..n_e {
        for c in 0..n_c {
            for (slot, &v) in x_fft.iter_mut().zip(epochs.data.slice(s![e, c, ..]).iter()) {
                *slot = Complex::new(v, 0.0);
            }
            x_fft[n_t..].iter_mut().for_each(|v| *v = Complex::default());
            fwd.process(&mut x_fft);

            for (fi, (w_fft, w)) in wavelet_ffts.iter().zip(&wavelets).enumerate() {
                for ((out, &a), &b) in y.iter_mut().zip(&x_fft).zip(w_fft) {
                    *out = a * b;
                }
                inv.process(&mut y);
                let start = (w.len() - 1) / 2;
                for (ti, &t) in kept.iter().enumerate() {
                    let z = y[start + t] * inv_scale;
                    let mag = z.norm();
                    power[[c, fi, ti]] += mag * mag;
                    if mag > 0.0 {
                        phase_sum[[c, fi, ti]] += z / mag;
                    }
                }
            }
        }
    }

    let n = n_e.max(1) as f64;
    power.mapv_inplace(|v| v / n);
    let itc = phase_sum.mapv(|z| z.norm() / n);

    Ok(TfrResult {
        power,
        itc,
        freqs: Array1::from(freqs.to_vec()),
        times: kept.iter().map(|&t| epochs.tmin + t as f64 / epochs.sfreq).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn phased_epochs(freq: f64, phases: &[f64], sfreq: f64, n_t: usize) -> Epochs {
        let data = Array3::from_shape_fn((phases.len(), 1, n_t), |(e, _, t)| {
            (2.0 * PI * freq * t as f64 / sfreq + phases[e]).sin()
        });
        Epochs {
            data,
            anchors: vec![0; phases.len()],
            ch_names: vec!["a".into()],
            sfreq,
            tmin: -0.5,
        }
    }

    #[test]
    fn wavelet_is_odd_length_and_normalised() {
        let w = morlet(125.0, 10.0, 5.0);
        assert_eq!(w.len() % 2, 1);
        let energy: f64 = w.iter().map(|c| c.norm_sqr()).sum();
        approx::assert_abs_diff_eq!(energy, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn phase_locked_epochs_have_unit_itc() {
        let ep = phased_epochs(10.0, &[0.0, 0.0, 0.0], 250.0, 500);
        let tfr = tfr_morlet(&ep, &[10.0], &[5.0], 1).unwrap();
        let mid = tfr.times.len() / 2;
        approx::assert_abs_diff_eq!(tfr.itc[[0, 0, mid]], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn opposed_phases_cancel_itc_but_not_power() {
        let ep = phased_epochs(10.0, &[0.0, PI / 2.0, PI, 1.5 * PI], 250.0, 500);
        let tfr = tfr_morlet(&ep, &[10.0], &[5.0], 1).unwrap();
        let mid = tfr.times.len() / 2;
        assert!(tfr.itc[[0, 0, mid]] < 1e-6);
        assert!(tfr.power[[0, 0, mid]] > 0.1);
    }

    #[test]
    fn power_peaks_at_signal_frequency() {
        let ep = phased_epochs(10.0, &[0.0, 1.0], 250.0, 500);
        let tfr = tfr_morlet(&ep, &[5.0, 10.0, 20.0], &[2.5, 5.0, 10.0], 1).unwrap();
        let mid = tfr.times.len() / 2;
        assert!(tfr.power[[0, 1, mid]] > 10.0 * tfr.power[[0, 0, mid]]);
        assert!(tfr.power[[0, 1, mid]] > 10.0 * tfr.power[[0, 2, mid]]);
    }

    #[test]
    fn decimation_keeps_every_nth_sample() {
        let ep = phased_epochs(10.0, &[0.0], 250.0, 500);
        let tfr = tfr_morlet(&ep, &[10.0], &[5.0], 3).unwrap();
        assert_eq!(tfr.times.len(), 167);
        assert_eq!(tfr.power.dim(), (1, 1, 167));
        approx::assert_abs_diff_eq!(tfr.times[0], -0.5);
        approx::assert_abs_diff_eq!(tfr.times[1], -0.5 + 3.0 / 250.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_signal_has_zero_power_and_itc() {
        let mut ep = phased_epochs(10.0, &[0.0, 0.0], 250.0, 500);
        ep.data.fill(0.0);
        let tfr = tfr_morlet(&ep, &[10.0], &[5.0], 1).unwrap();
        assert!(tfr.power.iter().all(|&v| v == 0.0));
        assert!(tfr.itc.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn wavelet_longer_than_epoch_is_rejected() {
        let ep = phased_epochs(2.0, &[0.0], 125.0, 100);
        let err = tfr_morlet(&ep, &[2.0], &[7.0], 1).unwrap_err();
        assert!(matches!(err, AnalysisError::WaveletTooLong { .. }));
    }
}
