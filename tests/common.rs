#![allow(dead_code)]

use eeg_prep::raw::{ChannelInfo, Raw};
use ndarray::Array2;
use std::f64::consts::PI;

/// Deterministic multi-channel test signal: per-channel sine amplitudes in
/// a microvolt-ish range plus a pseudo-noise floor, optionally with a
/// stimulus channel carrying three pulses (codes 2, 2 and 7).
pub fn make_recording(n_eeg: usize, n_samples: usize, sfreq: f64, with_stim: bool) -> Raw {
    let n_ch = n_eeg + usize::from(with_stim);
    let mut state = 0x853c49e6748fea9b_u64;
    let mut data = Array2::from_shape_fn((n_ch, n_samples), |(c, t)| {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let noise = ((state >> 33) as f64 / (1u64 << 31) as f64) - 0.5;
        (20.0 + 2.0 * c as f64) * (2.0 * PI * 10.0 * t as f64 / sfreq).sin() + 5.0 * noise
    });

    let mut channels: Vec<ChannelInfo> =
        (0..n_eeg).map(|i| ChannelInfo::eeg(&format!("E{i}"))).collect();
    if with_stim {
        let stim_row = n_ch - 1;
        for v in data.row_mut(stim_row).iter_mut() {
            *v = 0.0;
        }
        for (sample, code) in [(100, 2.0), (300, 2.0), (500, 7.0)] {
            if sample < n_samples {
                data[[stim_row, sample]] = code;
            }
        }
        channels.push(ChannelInfo::stim("STI 014"));
    }

    Raw::new(data, sfreq, channels).unwrap()
}

/// A pipeline configuration whose lowpass stays below Nyquist for the
/// 128 Hz recordings the tests use.
pub fn test_config() -> eeg_prep::config::Config {
    let mut config = eeg_prep::config::Config::default();
    config.filter.lowpass_hz = Some(40.0);
    config
}
