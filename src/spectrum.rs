//! Power spectral density of epochs.
//!
//! Welch's method with a periodic Hamming window, `n_fft`-sample segments,
//! no overlap, constant detrend and one-sided density scaling
//! (`|X|² / (sfreq · Σw²)`, doubled except at DC and Nyquist). Matches
//! `scipy.signal.welch(..., window='hamming', noverlap=0)`.
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::sync::Arc;

use ndarray::{s, Array1, Array2, Array3, ArrayD, Axis};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::config::{BandSpec, PsdConfig};
use crate::epoch::Epochs;
use crate::error::{AnalysisError, Result};

/// Reusable Welch estimator for one segment length.
pub struct Welch {
    n_fft: usize,
    sfreq: f64,
    window: Vec<f64>,
    scale: f64,
    fft: Arc<dyn Fft<f64>>,
    buffer: Vec<Complex<f64>>,
}

impl Welch {
    pub fn new(n_fft: usize, sfreq: f64) -> Self {
        let window = periodic_hamming(n_fft);
        let scale = 1.0 / (sfreq * window.iter().map(|w| w * w).sum::<f64>());
        let fft = FftPlanner::new().plan_fft_forward(n_fft);
        Self {
            n_fft,
            sfreq,
            window,
            scale,
            fft,
            buffer: vec![Complex::default(); n_fft],
        }
    }

    /// Frequencies of the one-sided spectrum, `k · sfreq / n_fft`.
    pub fn freqs(&self) -> Vec<f64> {
        (0..=self.n_fft / 2)
            .map(|k| k as f64 * self.sfreq / self.n_fft as f64)
            .collect()
    }

    /// One-sided PSD of `x`, averaged over whole `n_fft` segments.
    /// `x` must hold at least `n_fft` samples.
    pub fn psd(&mut self, x: &[f64]) -> Vec<f64> {
        let n_freqs = self.n_fft / 2 + 1;
        let mut acc = vec![0.0; n_freqs];
        let segments: Vec<&[f64]> = x.chunks_exact(self.n_fft).collect();

        for seg in &segments {
            let mean = seg.iter().sum::<f64>() / self.n_fft as f64;
            for (b, (&v, &w)) in self.buffer.iter_mut().zip(seg.iter().zip(&self.window)) {
                *b = Complex::new((v - mean) * w, 0.0);
            }
            self.fft.process(&mut self.buffer);
            for (k, a) in acc.iter_mut().enumerate() {
                let onesided = if k == 0 || (self.n_fft % 2 == 0 && k == self.n_fft / 2) {
                    1.0
                } else {
                    2.0
                };
                *a += self.buffer[k].norm_sqr() * self.scale * onesided;
            }
        }

        let n_seg = segments.len().max(1) as f64;
        acc.iter_mut().for_each(|a| *a /= n_seg);
        acc
    }
}

/// Hamming window of period `n` (`scipy.signal.get_window("hamming", n)`).
/// The FIR designer uses the symmetric form instead.
pub fn periodic_hamming(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}

/// PSD of every epoch and channel, restricted to `[fmin, fmax]`.
///
/// Returns `[E, C, F]` power and the `F` frequencies.
pub fn psd_epochs(epochs: &Epochs, cfg: &PsdConfig) -> Result<(Array3<f64>, Array1<f64>)> {
    let n_times = epochs.n_times();
    let n_fft = if cfg.n_fft > n_times {
        log::warn!("n_fft {} exceeds epoch length {n_times}; using {n_times}", cfg.n_fft);
        n_times
    } else {
        cfg.n_fft
    };
    let mut welch = Welch::new(n_fft, epochs.sfreq);

    let keep: Vec<usize> = welch
        .freqs()
        .iter()
        .enumerate()
        .filter(|(_, &f)| f >= cfg.fmin && f <= cfg.fmax)
        .map(|(k, _)| k)
        .collect();
    if keep.is_empty() {
        return Err(AnalysisError::EmptyBand {
            band: format!("{}–{} Hz", cfg.fmin, cfg.fmax),
            context: "psd frequency axis",
        });
    }
    let all_freqs = welch.freqs();
    let freqs: Array1<f64> = keep.iter().map(|&k| all_freqs[k]).collect();

    let (n_e, n_c, _) = epochs.data.dim();
    let mut power = Array3::<f64>::zeros((n_e, n_c, keep.len()));
    for e in 0..n_e {
        for c in 0..n_c {
            let x = epochs.data.slice(s![e, c, ..]).to_vec();
            let p = welch.psd(&x);
            for (j, &k) in keep.iter().enumerate() {
                power[[e, c, j]] = p[k];
            }
        }
    }
    Ok((power, freqs))
}

/// Average `[E, C, F]` power over epochs, and over channels as well when
/// `average_channels` is set. Result is `[F]` or `[C, F]`.
pub fn average_power(power: &Array3<f64>, average_channels: bool) -> Result<ArrayD<f64>> {
    let per_channel = power
        .mean_axis(Axis(0))
        .ok_or(AnalysisError::NoGoodChannels("psd average"))?;
    if average_channels {
        let avg = per_channel
            .mean_axis(Axis(0))
            .ok_or(AnalysisError::NoGoodChannels("psd average"))?;
        Ok(avg.into_dyn())
    } else {
        Ok(per_channel.into_dyn())
    }
}

/// Min–max normalised band power per channel.
///
/// For each channel the epoch-averaged PSD is scaled to `[0, 1]`
/// (`(p − min) / (max − min + 1e-12)`) and averaged over the frequencies
/// in each band's `[low, high)`. `power` is `[C, F]`.
pub fn band_ratios(
    power: &Array2<f64>,
    freqs: &Array1<f64>,
    bands: &BTreeMap<String, BandSpec>,
) -> Result<BTreeMap<String, Array1<f64>>> {
    let normalized: Vec<Array1<f64>> = power
        .outer_iter()
        .map(|row| {
            let lo = row.fold(f64::INFINITY, |a, &b| a.min(b));
            let hi = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            row.mapv(|v| (v - lo) / (hi - lo + 1e-12))
        })
        .collect();

    bands
        .iter()
        .map(|(name, band)| {
            let idx: Vec<usize> = freqs
                .iter()
                .enumerate()
                .filter(|(_, &f)| band.contains(f))
                .map(|(i, _)| i)
                .collect();
            if idx.is_empty() {
                return Err(AnalysisError::EmptyBand {
                    band: name.clone(),
                    context: "psd band normalisation",
                });
            }
            let per_ch: Array1<f64> = normalized
                .iter()
                .map(|row| idx.iter().map(|&i| row[i]).sum::<f64>() / idx.len() as f64)
                .collect();
            Ok((name.clone(), per_ch))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn sine_epochs(freq: f64, amp: f64, sfreq: f64, n_t: usize) -> Epochs {
        let data = Array3::from_shape_fn((2, 2, n_t), |(_, _, t)| {
            amp * (2.0 * PI * freq * t as f64 / sfreq).sin()
        });
        Epochs {
            data,
            anchors: vec![0, 0],
            ch_names: vec!["a".into(), "b".into()],
            sfreq,
            tmin: 0.0,
        }
    }

    fn cfg(fmin: f64, fmax: f64, n_fft: usize) -> PsdConfig {
        PsdConfig { fmin, fmax, n_fft, ..PsdConfig::default() }
    }

    #[test]
    fn welch_window_is_periodic() {
        let w = periodic_hamming(8);
        approx::assert_abs_diff_eq!(w[0], 0.08, epsilon = 1e-15);
        approx::assert_abs_diff_eq!(w[4], 1.0, epsilon = 1e-15);
        for k in 1..4 {
            approx::assert_abs_diff_eq!(w[k], w[8 - k], epsilon = 1e-15);
        }
        // The last sample is not the repeated endpoint of a symmetric window.
        assert!(w[7] > 0.2);
    }

    #[test]
    fn peak_at_signal_frequency() {
        let ep = sine_epochs(10.0, 1.0, 250.0, 1000);
        let (power, freqs) = psd_epochs(&ep, &cfg(2.0, 50.0, 250)).unwrap();
        let avg = average_power(&power, true).unwrap();
        let peak = avg
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        approx::assert_abs_diff_eq!(freqs[peak.0], 10.0);
    }

    #[test]
    fn density_integrates_to_signal_power() {
        let ep = sine_epochs(20.0, 2.0, 250.0, 1000);
        let (power, freqs) = psd_epochs(&ep, &cfg(0.0, 125.0, 250)).unwrap();
        let avg = average_power(&power, true).unwrap();
        let df = freqs[1] - freqs[0];
        let total: f64 = avg.sum() * df;
        approx::assert_abs_diff_eq!(total, 2.0, epsilon = 0.04); // A²/2
    }

    #[test]
    fn frequency_axis_respects_limits() {
        let ep = sine_epochs(10.0, 1.0, 125.0, 563);
        let (power, freqs) = psd_epochs(&ep, &cfg(2.0, 50.0, 256)).unwrap();
        assert!(freqs.iter().all(|&f| (2.0..=50.0).contains(&f)));
        assert_eq!(power.dim(), (2, 2, freqs.len()));
    }

    #[test]
    fn zero_signal_gives_zero_power() {
        let ep = sine_epochs(10.0, 0.0, 1000.0, 1500);
        let (power, _) = psd_epochs(&ep, &cfg(2.0, 50.0, 256)).unwrap();
        assert!(power.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn empty_frequency_range_is_an_error() {
        let ep = sine_epochs(10.0, 1.0, 100.0, 100);
        assert!(matches!(
            psd_epochs(&ep, &cfg(10.2, 10.8, 100)),
            Err(AnalysisError::EmptyBand { .. })
        ));
    }

    #[test]
    fn band_ratio_of_peaked_spectrum() {
        let power = ndarray::array![[0.0, 1.0, 0.5, 0.0]];
        let freqs = ndarray::array![2.0, 5.0, 9.0, 20.0];
        let bands = BTreeMap::from([
            ("theta".to_string(), BandSpec { low: 4.0, high: 8.0, num_points: 8 }),
            ("alpha".to_string(), BandSpec { low: 8.0, high: 13.0, num_points: 8 }),
        ]);
        let r = band_ratios(&power, &freqs, &bands).unwrap();
        approx::assert_abs_diff_eq!(r["theta"][0], 1.0, epsilon = 1e-9);
        approx::assert_abs_diff_eq!(r["alpha"][0], 0.5, epsilon = 1e-9);

        let gamma = BTreeMap::from([("gamma".to_string(), BandSpec { low: 30.0, high: 50.0, num_points: 8 })]);
        assert!(band_ratios(&power, &freqs, &gamma).is_err());
    }

}
