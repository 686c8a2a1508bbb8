//! Zero-phase band filters built from a frequency-domain gain mask.
//!
//! The mask is 1 in the pass band, 0 in the stop band, and follows a
//! raised cosine across the transition band, applied symmetrically to the
//! positive and negative frequencies so the output stays real.

use crate::error::{Error, Result};
use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;

/// Low-pass filter: pass below `cutoff`, stop above `cutoff + trans`.
pub fn low_pass(x: &[f64], sfreq: f64, cutoff: f64, trans: f64) -> Result<Vec<f64>> {
    check_cutoff(sfreq, cutoff, trans)?;
    apply_mask(x, sfreq, |f| lp_gain(f, cutoff, trans))
}

/// High-pass filter: stop below `cutoff - trans`, pass above `cutoff`.
pub fn high_pass(x: &[f64], sfreq: f64, cutoff: f64, trans: f64) -> Result<Vec<f64>> {
    check_cutoff(sfreq, cutoff, trans)?;
    apply_mask(x, sfreq, |f| hp_gain(f, cutoff, trans))
}

/// Band-pass filter between `lo` and `hi`.
pub fn band_pass(
    x: &[f64],
    sfreq: f64,
    lo: f64,
    hi: f64,
    trans: f64,
) -> Result<Vec<f64>> {
    check_cutoff(sfreq, lo, trans)?;
    check_cutoff(sfreq, hi, trans)?;
    if lo >= hi {
        return Err(Error::InvalidParameter(format!(
            "band edges out of order: {lo} Hz >= {hi} Hz"
        )));
    }
    apply_mask(x, sfreq, |f| hp_gain(f, lo, trans) * lp_gain(f, hi, trans))
}

fn lp_gain(f: f64, cutoff: f64, trans: f64) -> f64 {
    if f <= cutoff {
        1.0
    } else if f < cutoff + trans {
        0.5 * (1.0 + (PI * (f - cutoff) / trans).cos())
    } else {
        0.0
    }
}

fn hp_gain(f: f64, cutoff: f64, trans: f64) -> f64 {
    if f >= cutoff {
        1.0
    } else if f > cutoff - trans {
        0.5 * (1.0 + (PI * (cutoff - f) / trans).cos())
    } else {
        0.0
    }
}

fn check_cutoff(sfreq: f64, cutoff: f64, trans: f64) -> Result<()> {
    if !(sfreq.is_finite() && sfreq > 0.0) {
        return Err(Error::InvalidParameter(format!(
            "sampling rate must be positive, got {sfreq}"
        )));
    }
    let nyquist = sfreq / 2.0;
    if !(cutoff.is_finite() && cutoff > 0.0 && cutoff < nyquist) {
        return Err(Error::InvalidParameter(format!(
            "cutoff {cutoff} Hz outside (0, {nyquist}) Hz"
        )));
    }
    if !(trans.is_finite() && trans > 0.0) {
        return Err(Error::InvalidParameter(format!(
            "transition bandwidth must be positive, got {trans}"
        )));
    }
    Ok(())
}

fn apply_mask<G: Fn(f64) -> f64>(x: &[f64], sfreq: f64, gain: G) -> Result<Vec<f64>> {
    let n = x.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let ifft = planner.plan_fft_inverse(n);

    let mut buffer: Vec<Complex<f64>> = x.iter().map(|&s| Complex::new(s, 0.0)).collect();
    fft.process(&mut buffer);

    for (k, v) in buffer.iter_mut().enumerate() {
        // Bin k and bin n-k carry the same absolute frequency.
        let bin = k.min(n - k);
        let freq = bin as f64 * sfreq / n as f64;
        *v *= gain(freq);
    }

    ifft.process(&mut buffer);
    let scale = 1.0 / n as f64;
    Ok(buffer.iter().map(|v| v.re * scale).collect())
}
