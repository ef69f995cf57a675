//! FIR filter design and application.
//!
//! - [`design`]: Hamming-windowed sinc bandpass and notch design, following
//!   `mne.filter.create_filter(fir_window='hamming', phase='zero')`.
//! - [`apply`]: Overlap-add zero-phase convolution, matching MNE's
//!   `_overlap_add_filter` / `_1d_overlap_filter`.

pub mod apply;
pub mod design;

pub use apply::{apply_fir_zero_phase, filter_1d};
pub use design::{
    bandpass_transitions, design_bandpass, design_notch, filter_length, firwin, gain_at, hamming,
    notch_harmonics,
};
