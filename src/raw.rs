//! In-memory representation of a continuous recording.
//!
//! A [`Raw`] holds channel-major samples (`[channels, samples]`), the
//! sampling rate, per-channel metadata, and the additive annotation and
//! event lists that the rest of the crate attaches to it. The sample data
//! itself is never mutated by the pipeline; flags are expressed as
//! annotations.

use std::fmt;

use ndarray::{Array2, Axis};

/// What a channel carries. Parsed from and rendered into recording labels
/// (`"EEG Cz"`, `"STIM Trigger"`) and BIDS `channels.tsv` type columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Eeg,
    Stim,
    Misc,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Eeg => "EEG",
            ChannelKind::Stim => "STIM",
            ChannelKind::Misc => "MISC",
        }
    }

    /// Split a recording label of the form `"<TYPE> <name>"` into kind and
    /// name. Labels without a recognised type prefix are `Misc`.
    pub fn split_label(label: &str) -> (ChannelKind, String) {
        match label.split_once(' ') {
            Some(("EEG", name)) => (ChannelKind::Eeg, name.to_string()),
            Some(("STIM", name)) | Some(("TRIG", name)) => (ChannelKind::Stim, name.to_string()),
            Some(("MISC", name)) => (ChannelKind::Misc, name.to_string()),
            _ => (ChannelKind::Misc, label.to_string()),
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub name: String,
    pub kind: ChannelKind,
}

impl ChannelInfo {
    pub fn eeg(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ChannelKind::Eeg,
        }
    }

    pub fn stim(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ChannelKind::Stim,
        }
    }

    /// Recording label: `"EEG Cz"`.
    pub fn label(&self) -> String {
        format!("{} {}", self.kind, self.name)
    }
}

/// A time-anchored marker on a recording. Onset and duration in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub onset: f64,
    pub duration: f64,
    pub description: String,
}

/// A discrete event: the sample index it occurred at and its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub sample: usize,
    pub code: i32,
}

#[derive(Debug)]
pub enum RawError {
    ShapeMismatch { rows: usize, channels: usize },
    InvalidSamplingRate(f64),
    UnknownChannel(String),
    DuplicateChannel(String),
}

impl fmt::Display for RawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawError::ShapeMismatch { rows, channels } => write!(
                f,
                "data has {rows} rows but {channels} channel descriptions"
            ),
            RawError::InvalidSamplingRate(sfreq) => {
                write!(f, "sampling rate must be positive, got {sfreq}")
            }
            RawError::UnknownChannel(name) => write!(f, "no channel named {name:?}"),
            RawError::DuplicateChannel(name) => write!(f, "channel {name:?} already exists"),
        }
    }
}

impl std::error::Error for RawError {}

/// A continuous multi-channel recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Raw {
    data: Array2<f64>,
    sfreq: f64,
    channels: Vec<ChannelInfo>,
    pub annotations: Vec<Annotation>,
    pub events: Vec<Event>,
}

impl Raw {
    pub fn new(data: Array2<f64>, sfreq: f64, channels: Vec<ChannelInfo>) -> Result<Self, RawError> {
        if data.nrows() != channels.len() {
            return Err(RawError::ShapeMismatch {
                rows: data.nrows(),
                channels: channels.len(),
            });
        }
        if !(sfreq > 0.0) {
            return Err(RawError::InvalidSamplingRate(sfreq));
        }
        Ok(Self {
            data,
            sfreq,
            channels,
            annotations: Vec::new(),
            events: Vec::new(),
        })
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn sfreq(&self) -> f64 {
        self.sfreq
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    pub fn duration_secs(&self) -> f64 {
        self.n_samples() as f64 / self.sfreq
    }

    pub fn channels(&self) -> &[ChannelInfo] {
        &self.channels
    }

    pub fn ch_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.name == name)
    }

    pub fn rename_channel(&mut self, from: &str, to: &str) -> Result<(), RawError> {
        if self.position(to).is_some() {
            return Err(RawError::DuplicateChannel(to.to_string()));
        }
        let idx = self
            .position(from)
            .ok_or_else(|| RawError::UnknownChannel(from.to_string()))?;
        self.channels[idx].name = to.to_string();
        Ok(())
    }

    /// Return a copy containing only channels of the given kinds.
    /// Annotations and events carry over unchanged.
    pub fn pick(&self, kinds: &[ChannelKind]) -> Raw {
        let indices: Vec<usize> = self
            .channels
            .iter()
            .enumerate()
            .filter(|(_, c)| kinds.contains(&c.kind))
            .map(|(i, _)| i)
            .collect();
        let channels = indices.iter().map(|&i| self.channels[i].clone()).collect();
        Raw {
            data: self.data.select(Axis(0), &indices),
            sfreq: self.sfreq,
            channels,
            annotations: self.annotations.clone(),
            events: self.events.clone(),
        }
    }

    pub fn annotate(&mut self, onset: f64, duration: f64, description: &str) {
        self.annotations.push(Annotation {
            onset,
            duration,
            description: description.to_string(),
        });
    }

    /// Detect events on a stimulus channel: every sample where the value
    /// steps from zero to non-zero yields an event whose code is the
    /// rounded channel value at that sample.
    pub fn find_events(&self, stim_channel: &str) -> Result<Vec<Event>, RawError> {
        let idx = self
            .position(stim_channel)
            .ok_or_else(|| RawError::UnknownChannel(stim_channel.to_string()))?;
        let row = self.data.row(idx);
        let mut events = Vec::new();
        let mut prev = 0.0_f64;
        for (sample, &v) in row.iter().enumerate() {
            if v != 0.0 && prev == 0.0 {
                events.push(Event {
                    sample,
                    code: v.round() as i32,
                });
            }
            prev = v;
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn two_channel_raw() -> Raw {
        let data = Array2::from_shape_fn((2, 10), |(c, t)| (c * 10 + t) as f64);
        Raw::new(
            data,
            100.0,
            vec![ChannelInfo::eeg("Fp1"), ChannelInfo::eeg("Cz")],
        )
        .unwrap()
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let data = Array2::zeros((3, 5));
        let err = Raw::new(data, 100.0, vec![ChannelInfo::eeg("Fp1")]).unwrap_err();
        assert!(matches!(err, RawError::ShapeMismatch { rows: 3, channels: 1 }));
    }

    #[test]
    fn rename_rejects_duplicates_and_unknowns() {
        let mut raw = two_channel_raw();
        assert!(matches!(
            raw.rename_channel("Fp1", "Cz"),
            Err(RawError::DuplicateChannel(_))
        ));
        assert!(matches!(
            raw.rename_channel("nope", "X"),
            Err(RawError::UnknownChannel(_))
        ));
        raw.rename_channel("Fp1", "E1").unwrap();
        assert_eq!(raw.ch_names(), vec!["E1", "Cz"]);
    }

    #[test]
    fn pick_keeps_only_requested_kinds() {
        let data = Array2::from_shape_fn((3, 4), |(c, _)| c as f64);
        let mut raw = Raw::new(
            data,
            10.0,
            vec![
                ChannelInfo::eeg("Fp1"),
                ChannelInfo::stim("Trigger"),
                ChannelInfo::eeg("Cz"),
            ],
        )
        .unwrap();
        raw.annotate(0.5, 0.0, "marker");
        let picked = raw.pick(&[ChannelKind::Eeg]);
        assert_eq!(picked.ch_names(), vec!["Fp1", "Cz"]);
        assert_eq!(picked.data().row(1)[0], 2.0);
        assert_eq!(picked.annotations.len(), 1);
    }

    #[test]
    fn find_events_detects_rising_edges() {
        let mut data = Array2::zeros((2, 12));
        // stim pulses: code 2 at sample 3..5, code 7 at sample 8
        data[[1, 3]] = 2.0;
        data[[1, 4]] = 2.0;
        data[[1, 8]] = 7.0;
        let raw = Raw::new(
            data,
            100.0,
            vec![ChannelInfo::eeg("Cz"), ChannelInfo::stim("STI 014")],
        )
        .unwrap();
        let events = raw.find_events("STI 014").unwrap();
        assert_eq!(
            events,
            vec![Event { sample: 3, code: 2 }, Event { sample: 8, code: 7 }]
        );
    }
}
