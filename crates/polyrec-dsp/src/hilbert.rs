//! Analytic signal and envelope via the FFT construction.

use rustfft::{num_complex::Complex, FftPlanner};

/// Analytic signal of `x`: the real part is `x` itself, the imaginary
/// part its Hilbert transform. Returns one complex sample per input
/// sample.
pub fn hilbert(x: &[f64]) -> Vec<Complex<f64>> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let ifft = planner.plan_fft_inverse(n);

    let mut buffer: Vec<Complex<f64>> = x.iter().map(|&s| Complex::new(s, 0.0)).collect();
    fft.process(&mut buffer);

    // Double the positive frequencies, zero the negative ones; DC and
    // (for even n) the Nyquist bin keep unit weight.
    let half = n / 2;
    for (k, v) in buffer.iter_mut().enumerate() {
        if k == 0 || (n % 2 == 0 && k == half) {
            continue;
        } else if k < half || (n % 2 == 1 && k == half) {
            *v *= 2.0;
        } else {
            *v = Complex::new(0.0, 0.0);
        }
    }

    ifft.process(&mut buffer);
    let scale = 1.0 / n as f64;
    buffer.iter_mut().for_each(|v| *v *= scale);
    buffer
}

/// Envelope of `x`: magnitude of the analytic signal, one real sample
/// per input sample.
pub fn envelope(x: &[f64]) -> Vec<f64> {
    hilbert(x).iter().map(|v| v.norm()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_real_part_is_input() {
        let x: Vec<f64> = (0..512)
            .map(|i| (2.0 * PI * 8.0 * i as f64 / 512.0).sin())
            .collect();
        let a = hilbert(&x);
        assert_eq!(a.len(), x.len());
        for (ai, xi) in a.iter().zip(&x) {
            assert_abs_diff_eq!(ai.re, *xi, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_envelope_of_sine_is_amplitude() {
        let n = 1024;
        let amp = 0.75;
        let x: Vec<f64> = (0..n)
            .map(|i| amp * (2.0 * PI * 32.0 * i as f64 / n as f64).sin())
            .collect();
        let env = envelope(&x);
        assert_eq!(env.len(), n);
        // Whole periods fit exactly, so the envelope is flat everywhere.
        for &e in &env {
            assert_abs_diff_eq!(e, amp, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(hilbert(&[]).is_empty());
        assert!(envelope(&[]).is_empty());
    }
}
