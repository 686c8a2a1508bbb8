//! Per-channel numeric processing for polyrec recordings.
//!
//! All functions here are sample-count preserving: they take one channel
//! of samples and return the same number of samples. Filtering works in
//! the frequency domain with raised-cosine transition bands; the analytic
//! signal is computed with the standard FFT construction.

pub mod error;
pub mod filter;
pub mod hilbert;

pub use error::{Error, Result};
pub use filter::{band_pass, high_pass, low_pass};
pub use hilbert::{envelope, hilbert};

/// Complex sample type used for analytic signals.
pub use rustfft::num_complex::Complex64;
