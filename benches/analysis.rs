use std::f64::consts::PI;
use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use ndarray::Array3;
use stimspec::{nearest_sample_indices, tfr_morlet, BandSpec, Epochs};

fn bench_alignment(c: &mut Criterion) {
    let sfreq = 125.0;
    let samples: Vec<f64> = (0..125 * 3600).map(|i| i as f64 / sfreq).collect();
    let markers: Vec<f64> = (0..2000).map(|i| i as f64 * 1.7 + 0.003).collect();
    c.bench_function("nearest_sample_indices 2000 markers × 1 h @ 125 Hz", |b| {
        b.iter(|| black_box(nearest_sample_indices(black_box(&samples), black_box(&markers))))
    });
}

fn bench_tfr(c: &mut Criterion) {
    let sfreq = 125.0;
    let data = Array3::from_shape_fn((20, 8, 563), |(e, ch, t)| {
        (2.0 * PI * 10.0 * t as f64 / sfreq + e as f64 * 0.3 + ch as f64).sin()
    });
    let epochs = Epochs {
        data,
        anchors: vec![0; 20],
        ch_names: (0..8).map(|i| format!("EEG{i}")).collect(),
        sfreq,
        tmin: -0.5,
    };
    let freqs = BandSpec { low: 8.0, high: 13.0, num_points: 8 }.freqs();
    let n_cycles: Vec<f64> = freqs.iter().map(|f| f * 0.5).collect();
    c.bench_function("tfr_morlet alpha [20 × 8 × 563]", |b| {
        b.iter(|| black_box(tfr_morlet(black_box(&epochs), &freqs, &n_cycles, 3).unwrap()))
    });
}

criterion_group!(benches, bench_alignment, bench_tfr);
criterion_main!(benches);
