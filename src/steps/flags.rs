//! Robust-statistic flagging of noisy channels and noisy time windows.
//!
//! Spread is the per-channel standard deviation; outliers are found with a
//! robust z-score (median and MAD) so that one broken channel or one burst
//! does not drag the detection threshold along with it.

use ndarray::{s, Array2};

/// Robust z-scores: `0.6745 * (x - median) / MAD`. A zero MAD (all values
/// identical) yields all-zero scores.
pub fn robust_zscores(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let med = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    let mad = median(&deviations);
    if mad == 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| 0.6745 * (v - med) / mad).collect()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Standard deviation of each channel (population, ddof 0).
pub fn channel_spreads(data: &Array2<f64>) -> Vec<f64> {
    data.rows()
        .into_iter()
        .map(|row| {
            let n = row.len() as f64;
            let mean = row.sum() / n;
            (row.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
        })
        .collect()
}

/// Indices of channels whose spread is a robust-z outlier above `threshold`.
pub fn flag_noisy_channels(data: &Array2<f64>, threshold: f64) -> Vec<usize> {
    let spreads = channel_spreads(data);
    robust_zscores(&spreads)
        .into_iter()
        .enumerate()
        .filter(|(_, z)| *z > threshold)
        .map(|(i, _)| i)
        .collect()
}

/// Indices of fixed windows whose cross-channel mean spread is a robust-z
/// outlier above `threshold`. Windows are non-overlapping runs of
/// `window_samples`; a trailing partial window is ignored.
pub fn flag_noisy_windows(data: &Array2<f64>, window_samples: usize, threshold: f64) -> Vec<usize> {
    let (n_ch, n_t) = data.dim();
    if window_samples == 0 || n_ch == 0 {
        return Vec::new();
    }
    let n_windows = n_t / window_samples;
    let spreads: Vec<f64> = (0..n_windows)
        .map(|w| {
            let window = data.slice(s![.., w * window_samples..(w + 1) * window_samples]);
            let per_channel = channel_spreads(&window.to_owned());
            per_channel.iter().sum::<f64>() / n_ch as f64
        })
        .collect();
    robust_zscores(&spreads)
        .into_iter()
        .enumerate()
        .filter(|(_, z)| *z > threshold)
        .map(|(w, _)| w)
        .collect()
}
