//! The preprocessing pipeline: construct from a configuration file, run
//! over one recording or a whole dataset, and write derivative outputs.
//!
//! Running is lossless with respect to the input: the sample data is
//! filtered and re-referenced only on a working copy used for detection,
//! and the outcome is purely additive: flagged channel names and
//! `BAD_noisy` window annotations on a copy of the recording.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::{error, info};

use crate::bids::{read_recording, RecordingPath};
use crate::config::{Config, ReferenceKind};
use crate::raw::Raw;
use crate::steps::{apply_filters, average_reference_inplace, flag_noisy_channels, flag_noisy_windows, FilterError};

/// Annotation description attached to flagged channels and windows.
pub const FLAG_DESCRIPTION: &str = "BAD_noisy";

const DERIVATIVE_NAME: &str = "eeg-prep";

#[derive(Debug)]
pub enum PipelineError {
    Filter(FilterError),
    WindowTooShort { window_secs: f64 },
    Io(std::io::Error),
    Csv(csv::Error),
    Yaml(serde_yaml::Error),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Filter(e) => write!(f, "filter stage failed: {e}"),
            PipelineError::WindowTooShort { window_secs } => {
                write!(f, "window of {window_secs} s is shorter than one sample")
            }
            PipelineError::Io(e) => write!(f, "io error: {e}"),
            PipelineError::Csv(e) => write!(f, "derivative table error: {e}"),
            PipelineError::Yaml(e) => write!(f, "config snapshot error: {e}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<FilterError> for PipelineError {
    fn from(e: FilterError) -> Self {
        PipelineError::Filter(e)
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Io(e)
    }
}

impl From<csv::Error> for PipelineError {
    fn from(e: csv::Error) -> Self {
        PipelineError::Csv(e)
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(e: serde_yaml::Error) -> Self {
        PipelineError::Yaml(e)
    }
}

/// Outcome of running the pipeline on one recording.
#[derive(Debug, Clone)]
pub struct RunRecord {
    /// Copy of the input with flag annotations appended.
    pub raw: Raw,
    /// Names of channels flagged as noisy.
    pub flagged_channels: Vec<String>,
    /// Indices of fixed windows flagged as noisy.
    pub flagged_windows: Vec<usize>,
}

/// Aggregated outcome of a dataset run.
#[derive(Debug)]
pub struct RunReport {
    pub recordings: Vec<RecordingSummary>,
}

#[derive(Debug)]
pub struct RecordingSummary {
    pub basename: String,
    pub flagged_channels: usize,
    pub flagged_windows: usize,
}

pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    /// Construct a pipeline from a configuration file path.
    pub fn new<P: AsRef<Path>>(config_path: P) -> anyhow::Result<Self> {
        Ok(Self {
            config: Config::load(config_path)?,
        })
    }

    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the pipeline on one recording.
    pub fn run(&self, raw: &Raw) -> Result<RunRecord, PipelineError> {
        let window_samples = (self.config.epoching.window_secs * raw.sfreq()) as usize;
        if window_samples == 0 {
            return Err(PipelineError::WindowTooShort {
                window_secs: self.config.epoching.window_secs,
            });
        }

        info!(
            channels = raw.n_channels(),
            samples = raw.n_samples(),
            sfreq = raw.sfreq(),
            "Running pipeline on recording"
        );

        // Detection works on a copy; the input signal is left untouched.
        let mut working = raw.data().clone();
        apply_filters(
            &mut working,
            raw.sfreq(),
            self.config.filter.highpass_hz,
            self.config.filter.lowpass_hz,
        )?;
        info!(
            highpass = ?self.config.filter.highpass_hz,
            lowpass = ?self.config.filter.lowpass_hz,
            "Filter stage complete"
        );

        if self.config.reference.kind == ReferenceKind::Average {
            average_reference_inplace(&mut working);
            info!("Applied average reference");
        }

        let channel_indices =
            flag_noisy_channels(&working, self.config.flagging.channel_threshold);
        let flagged_channels: Vec<String> = channel_indices
            .iter()
            .map(|&i| raw.channels()[i].name.clone())
            .collect();

        let flagged_windows =
            flag_noisy_windows(&working, window_samples, self.config.flagging.window_threshold);

        let mut annotated = raw.clone();
        for &window in &flagged_windows {
            let onset = (window * window_samples) as f64 / raw.sfreq();
            annotated.annotate(onset, self.config.epoching.window_secs, FLAG_DESCRIPTION);
        }

        info!(
            flagged_channels = flagged_channels.len(),
            flagged_windows = flagged_windows.len(),
            "Flagging complete"
        );
        Ok(RunRecord {
            raw: annotated,
            flagged_channels,
            flagged_windows,
        })
    }

    /// Run the pipeline over every recording path, writing derivatives
    /// under `<root>/derivatives/eeg-prep/`. The first failing recording
    /// aborts the run.
    pub fn run_dataset(&self, paths: &[RecordingPath]) -> anyhow::Result<RunReport> {
        info!(recordings = paths.len(), "Starting dataset run");
        let mut recordings = Vec::with_capacity(paths.len());
        for path in paths {
            let basename = path.basename();
            info!(recording = %basename, "Loading recording");
            let raw = read_recording(path)
                .with_context(|| format!("failed to load recording {basename}"))?;
            let record = self.run(&raw).map_err(|e| {
                error!(recording = %basename, error = %e, "Pipeline run failed");
                anyhow::anyhow!("pipeline failed on {basename}: {e}")
            })?;
            self.save_derivatives(&record, path)
                .with_context(|| format!("failed to write derivatives for {basename}"))?;
            recordings.push(RecordingSummary {
                basename,
                flagged_channels: record.flagged_channels.len(),
                flagged_windows: record.flagged_windows.len(),
            });
        }
        info!(recordings = recordings.len(), "Dataset run complete");
        Ok(RunReport { recordings })
    }

    /// Write the flag outputs for one recording into the derivatives tree:
    /// a channel-status table, an events table with the flag annotations,
    /// and a snapshot of the configuration that produced them.
    pub fn save_derivatives(
        &self,
        record: &RunRecord,
        recording: &RecordingPath,
    ) -> Result<(), PipelineError> {
        let derivative_root = recording
            .root
            .join("derivatives")
            .join(DERIVATIVE_NAME);
        let derivative = recording.with_root(&derivative_root);
        fs::create_dir_all(derivative.dir())?;

        // Channel status table.
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(derivative.sidecar_path("desc-flags_channels.tsv"))?;
        writer.write_record(["name", "status", "status_description"])?;
        for channel in record.raw.channels() {
            let flagged = record.flagged_channels.iter().any(|n| n == &channel.name);
            writer.write_record([
                channel.name.as_str(),
                if flagged { "bad" } else { "good" },
                if flagged { "noisy" } else { "n/a" },
            ])?;
        }
        writer.flush()?;

        // Annotations, including the flags just added.
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(derivative.sidecar_path("events.tsv"))?;
        writer.write_record(["onset", "duration", "trial_type"])?;
        let mut annotations = record.raw.annotations.clone();
        annotations.sort_by(|a, b| a.onset.total_cmp(&b.onset));
        for annotation in &annotations {
            writer.write_record([
                annotation.onset.to_string().as_str(),
                annotation.duration.to_string().as_str(),
                annotation.description.as_str(),
            ])?;
        }
        writer.flush()?;

        // Configuration snapshot, once per derivatives tree.
        let snapshot = derivative_root.join(format!("{DERIVATIVE_NAME}_config.yaml"));
        if !snapshot.exists() {
            fs::write(&snapshot, serde_yaml::to_string(&self.config)?)?;
        }

        info!(
            recording = %recording.basename(),
            dir = %derivative.dir().display(),
            "Wrote derivatives"
        );
        Ok(())
    }
}
