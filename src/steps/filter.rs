//! Zero-phase FIR filtering.
//!
//! Windowed-sinc kernels (Hamming window) with an automatically chosen
//! transition bandwidth and tap count, applied by direct convolution with
//! edge reflection so the output has no phase shift and no startup
//! transient at the boundaries.

use std::f64::consts::PI;
use std::fmt;

use ndarray::Array2;

#[derive(Debug)]
pub enum FilterError {
    CutoffOutOfRange { cutoff_hz: f64, nyquist_hz: f64 },
    EmptyData,
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::CutoffOutOfRange { cutoff_hz, nyquist_hz } => write!(
                f,
                "cutoff {cutoff_hz} Hz outside (0, {nyquist_hz}) Hz"
            ),
            FilterError::EmptyData => write!(f, "cannot filter an empty recording"),
        }
    }
}

impl std::error::Error for FilterError {}

/// Hamming window of length `n`.
pub fn hamming(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Transition bandwidth in Hz for a given cutoff:
/// `min(max(0.25 * cutoff, 2.0), cutoff)`.
pub fn transition_bandwidth(cutoff_hz: f64) -> f64 {
    (0.25 * cutoff_hz).max(2.0).min(cutoff_hz)
}

/// Kernel length for a transition bandwidth: `ceil(3.3 / bw * sfreq)`,
/// rounded up to odd so the kernel has a centre tap.
pub fn filter_length(trans_bw_hz: f64, sfreq: f64) -> usize {
    let n = (3.3 / trans_bw_hz * sfreq).ceil() as usize;
    if n % 2 == 0 {
        n + 1
    } else {
        n.max(3)
    }
}

/// Windowed-sinc lowpass kernel with unit DC gain.
pub fn design_lowpass(cutoff_hz: f64, sfreq: f64) -> Vec<f64> {
    let n = filter_length(transition_bandwidth(cutoff_hz), sfreq);
    let m = (n - 1) / 2;
    let fc = cutoff_hz / sfreq; // cycles per sample
    let window = hamming(n);
    let mut h: Vec<f64> = (0..n)
        .map(|i| 2.0 * fc * sinc(2.0 * fc * (i as f64 - m as f64)) * window[i])
        .collect();
    let sum: f64 = h.iter().sum();
    for tap in h.iter_mut() {
        *tap /= sum;
    }
    h
}

/// Highpass kernel by spectral inversion of the matching lowpass.
pub fn design_highpass(cutoff_hz: f64, sfreq: f64) -> Vec<f64> {
    let mut h = design_lowpass(cutoff_hz, sfreq);
    let m = (h.len() - 1) / 2;
    for tap in h.iter_mut() {
        *tap = -*tap;
    }
    h[m] += 1.0;
    h
}

/// Convolve each channel with the symmetric kernel `h`, reflecting the
/// signal at both edges. With an odd, symmetric kernel this is zero-phase.
pub fn apply_zero_phase(data: &mut Array2<f64>, h: &[f64]) -> Result<(), FilterError> {
    let (n_ch, n_t) = data.dim();
    if n_ch == 0 || n_t == 0 {
        return Err(FilterError::EmptyData);
    }
    let m = (h.len() - 1) / 2;

    let mut padded = vec![0.0_f64; n_t + 2 * m];
    let mut out = vec![0.0_f64; n_t];
    for mut row in data.rows_mut() {
        // Reflect: x[-k] = x[k], x[T-1+k] = x[T-1-k].
        for k in 0..m {
            padded[k] = row[(m - k).min(n_t - 1)];
            padded[n_t + m + k] = row[n_t - 1 - (k + 1).min(n_t - 1)];
        }
        for t in 0..n_t {
            padded[m + t] = row[t];
        }
        for t in 0..n_t {
            let mut acc = 0.0;
            for (k, &tap) in h.iter().enumerate() {
                acc += tap * padded[t + k];
            }
            out[t] = acc;
        }
        for t in 0..n_t {
            row[t] = out[t];
        }
    }
    Ok(())
}

/// Apply the configured highpass and/or lowpass to `data` in place.
pub fn apply_filters(
    data: &mut Array2<f64>,
    sfreq: f64,
    highpass_hz: Option<f64>,
    lowpass_hz: Option<f64>,
) -> Result<(), FilterError> {
    let nyquist = sfreq / 2.0;
    for cutoff in [highpass_hz, lowpass_hz].into_iter().flatten() {
        if !(cutoff > 0.0 && cutoff < nyquist) {
            return Err(FilterError::CutoffOutOfRange {
                cutoff_hz: cutoff,
                nyquist_hz: nyquist,
            });
        }
    }
    if let Some(cutoff) = highpass_hz {
        let h = design_highpass(cutoff, sfreq);
        apply_zero_phase(data, &h)?;
    }
    if let Some(cutoff) = lowpass_hz {
        let h = design_lowpass(cutoff, sfreq);
        apply_zero_phase(data, &h)?;
    }
    Ok(())
}
