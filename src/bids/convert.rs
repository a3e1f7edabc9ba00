//! Conversion of arbitrary-format recordings into a BIDS tree.
//!
//! The code that loads recordings in project-specific formats varies too
//! much to ship here, so the caller supplies an implementation of
//! [`Import`]: given one row of import arguments it returns a recording
//! plus its events and event-name map. [`convert_dataset_to_bids`] drives
//! one import per row of the parameter tables and writes the data file and
//! every sidecar into the layout that [`super::path::RecordingPath`]
//! describes.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde_json::json;
use tracing::{error, info};

use crate::edf::{read_edf, write_edf, EdfError};
use crate::raw::{ChannelKind, Event, Raw, RawError};
use crate::records::{ParamRecord, ParamTable};

use super::path::{BidsPathError, RecordingPath};

/// What an importer hands back for one recording: the raw data, the event
/// list, and the map from event name to event code used in the events
/// sidecar.
#[derive(Debug, Clone)]
pub struct ImportedRecording {
    pub raw: Raw,
    pub events: Vec<Event>,
    pub event_id: BTreeMap<String, i32>,
}

#[derive(Debug)]
pub enum ImportError {
    Io(std::io::Error),
    MissingArgument(String),
    Recording(EdfError),
    Raw(RawError),
    Other(String),
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::Io(e) => write!(f, "io error: {e}"),
            ImportError::MissingArgument(key) => write!(f, "missing import argument {key:?}"),
            ImportError::Recording(e) => write!(f, "cannot read recording: {e}"),
            ImportError::Raw(e) => write!(f, "invalid recording: {e}"),
            ImportError::Other(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ImportError {}

impl From<std::io::Error> for ImportError {
    fn from(e: std::io::Error) -> Self {
        ImportError::Io(e)
    }
}

impl From<EdfError> for ImportError {
    fn from(e: EdfError) -> Self {
        ImportError::Recording(e)
    }
}

impl From<RawError> for ImportError {
    fn from(e: RawError) -> Self {
        ImportError::Raw(e)
    }
}

/// User-supplied recording loader. One call per row of the import-argument
/// table.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Import: Send + Sync {
    async fn import(&self, args: &ParamRecord) -> Result<ImportedRecording, ImportError>;
}

/// Built-in importer for recordings already stored as EDF. Reads the file
/// named by the `path_in` argument; when a `stim_channel` argument is
/// present, events are detected on it and only EEG channels are kept.
pub struct EdfImport;

#[async_trait]
impl Import for EdfImport {
    async fn import(&self, args: &ParamRecord) -> Result<ImportedRecording, ImportError> {
        let path_in = args
            .get("path_in")
            .ok_or_else(|| ImportError::MissingArgument("path_in".to_string()))?;
        let raw = read_edf(path_in)?;

        let (raw, events) = match args.get("stim_channel") {
            Some(stim) => {
                let events = raw.find_events(stim)?;
                (raw.pick(&[ChannelKind::Eeg]), events)
            }
            None => (raw, Vec::new()),
        };

        let mut event_id = BTreeMap::new();
        for event in &events {
            event_id
                .entry(format!("event_{}", event.code))
                .or_insert(event.code);
        }
        Ok(ImportedRecording {
            raw,
            events,
            event_id,
        })
    }
}

#[derive(Debug)]
pub enum ConvertError {
    LengthMismatch { imports: usize, paths: usize },
    MissingColumn { row: usize, column: String },
    BadValue { row: usize, column: String, value: String },
    Exists(PathBuf),
    Import(ImportError),
    Recording(EdfError),
    Path(BidsPathError),
    Io(std::io::Error),
    Csv(csv::Error),
    Json(serde_json::Error),
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvertError::LengthMismatch { imports, paths } => write!(
                f,
                "import arguments have {imports} rows but path arguments have {paths}"
            ),
            ConvertError::MissingColumn { row, column } => {
                write!(f, "row {row} is missing required column {column:?}")
            }
            ConvertError::BadValue { row, column, value } => {
                write!(f, "row {row} column {column:?} has unusable value {value:?}")
            }
            ConvertError::Exists(path) => write!(
                f,
                "{} already exists and overwrite is disabled",
                path.display()
            ),
            ConvertError::Import(e) => write!(f, "import failed: {e}"),
            ConvertError::Recording(e) => write!(f, "recording io failed: {e}"),
            ConvertError::Path(e) => write!(f, "bids path error: {e}"),
            ConvertError::Io(e) => write!(f, "io error: {e}"),
            ConvertError::Csv(e) => write!(f, "sidecar table error: {e}"),
            ConvertError::Json(e) => write!(f, "sidecar json error: {e}"),
        }
    }
}

impl std::error::Error for ConvertError {}

impl From<ImportError> for ConvertError {
    fn from(e: ImportError) -> Self {
        ConvertError::Import(e)
    }
}

impl From<EdfError> for ConvertError {
    fn from(e: EdfError) -> Self {
        ConvertError::Recording(e)
    }
}

impl From<BidsPathError> for ConvertError {
    fn from(e: BidsPathError) -> Self {
        ConvertError::Path(e)
    }
}

impl From<std::io::Error> for ConvertError {
    fn from(e: std::io::Error) -> Self {
        ConvertError::Io(e)
    }
}

impl From<csv::Error> for ConvertError {
    fn from(e: csv::Error) -> Self {
        ConvertError::Csv(e)
    }
}

impl From<serde_json::Error> for ConvertError {
    fn from(e: serde_json::Error) -> Self {
        ConvertError::Json(e)
    }
}

/// Convert a whole set of recordings into a BIDS tree.
///
/// `import_args` and `bids_path_args` must have the same number of rows;
/// row *i* of each describes recording *i*. Returns the created recording
/// paths in input order. The first failing row aborts the conversion.
pub async fn convert_dataset_to_bids<I: Import>(
    importer: &I,
    import_args: &ParamTable,
    bids_path_args: &ParamTable,
    root: &Path,
    overwrite: bool,
) -> Result<Vec<RecordingPath>, ConvertError> {
    if import_args.len() != bids_path_args.len() {
        return Err(ConvertError::LengthMismatch {
            imports: import_args.len(),
            paths: bids_path_args.len(),
        });
    }
    info!(
        recordings = import_args.len(),
        root = %root.display(),
        overwrite,
        "Converting dataset to BIDS"
    );

    let mut created = Vec::with_capacity(import_args.len());
    for (row, (import_record, path_record)) in import_args
        .rows()
        .iter()
        .zip(bids_path_args.rows())
        .enumerate()
    {
        let recording_path = recording_path_from_args(root, path_record, row)?;
        info!(row, basename = %recording_path.basename(), "Importing recording");
        let imported = match importer.import(import_record).await {
            Ok(imported) => imported,
            Err(e) => {
                error!(row, error = %e, "Import callback failed");
                return Err(e.into());
            }
        };
        write_recording(&recording_path, &imported, overwrite)?;
        created.push(recording_path);
    }
    ensure_dataset_description(root)?;
    info!(recordings = created.len(), "Dataset conversion complete");
    Ok(created)
}

fn recording_path_from_args(
    root: &Path,
    args: &ParamRecord,
    row: usize,
) -> Result<RecordingPath, ConvertError> {
    let subject = args.get("subject").ok_or_else(|| ConvertError::MissingColumn {
        row,
        column: "subject".to_string(),
    })?;
    let mut path = RecordingPath::new(root, subject);
    if let Some(session) = args.get("session") {
        path = path.session(session);
    }
    if let Some(task) = args.get("task") {
        path = path.task(task);
    }
    if let Some(run) = args.get("run") {
        let run_idx = run.parse::<u32>().map_err(|_| ConvertError::BadValue {
            row,
            column: "run".to_string(),
            value: run.to_string(),
        })?;
        path = path.run(run_idx);
    }
    Ok(path)
}

/// Write one imported recording and its sidecars into the BIDS tree.
pub fn write_recording(
    path: &RecordingPath,
    imported: &ImportedRecording,
    overwrite: bool,
) -> Result<(), ConvertError> {
    let data_path = path.fpath();
    if data_path.exists() && !overwrite {
        return Err(ConvertError::Exists(data_path));
    }
    fs::create_dir_all(path.dir())?;

    write_edf(&data_path, &imported.raw)?;
    write_channels_sidecar(path, &imported.raw)?;
    write_events_sidecar(path, imported)?;
    write_recording_sidecar(path, &imported.raw)?;
    info!(path = %data_path.display(), "Wrote BIDS recording");
    Ok(())
}

fn write_channels_sidecar(path: &RecordingPath, raw: &Raw) -> Result<(), ConvertError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path.sidecar_path("channels.tsv"))?;
    writer.write_record(["name", "type", "units", "status"])?;
    for channel in raw.channels() {
        let units = if channel.kind == ChannelKind::Eeg { "uV" } else { "n/a" };
        writer.write_record([channel.name.as_str(), channel.kind.as_str(), units, "good"])?;
    }
    writer.flush().map_err(ConvertError::Io)?;
    Ok(())
}

fn write_events_sidecar(path: &RecordingPath, imported: &ImportedRecording) -> Result<(), ConvertError> {
    let code_names: BTreeMap<i32, &str> = imported
        .event_id
        .iter()
        .map(|(name, code)| (*code, name.as_str()))
        .collect();
    let sfreq = imported.raw.sfreq();

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path.sidecar_path("events.tsv"))?;
    writer.write_record(["onset", "duration", "sample", "trial_type", "value"])?;
    for event in &imported.events {
        let onset = event.sample as f64 / sfreq;
        writer.write_record([
            onset.to_string().as_str(),
            "0",
            event.sample.to_string().as_str(),
            code_names.get(&event.code).copied().unwrap_or("n/a"),
            event.code.to_string().as_str(),
        ])?;
    }
    writer.flush().map_err(ConvertError::Io)?;
    Ok(())
}

fn write_recording_sidecar(path: &RecordingPath, raw: &Raw) -> Result<(), ConvertError> {
    let n_eeg = raw
        .channels()
        .iter()
        .filter(|c| c.kind == ChannelKind::Eeg)
        .count();
    let sidecar = json!({
        "TaskName": path.task.as_deref().unwrap_or("n/a"),
        "SamplingFrequency": raw.sfreq(),
        "RecordingDuration": raw.duration_secs(),
        "EEGChannelCount": n_eeg,
    });
    let fname = path.sidecar_fname(&format!("{}.json", path.suffix));
    fs::write(path.dir().join(fname), serde_json::to_string_pretty(&sidecar)?)?;
    Ok(())
}

fn ensure_dataset_description(root: &Path) -> Result<(), ConvertError> {
    let description_path = root.join("dataset_description.json");
    if description_path.exists() {
        return Ok(());
    }
    let description = json!({
        "Name": "eeg-prep dataset",
        "BIDSVersion": "1.8.0",
        "DatasetType": "raw",
        "GeneratedBy": [{
            "Name": env!("CARGO_PKG_NAME"),
            "Version": env!("CARGO_PKG_VERSION"),
        }],
    });
    fs::create_dir_all(root)?;
    fs::write(&description_path, serde_json::to_string_pretty(&description)?)?;
    info!(path = %description_path.display(), "Wrote dataset description");
    Ok(())
}

/// Load a recording from its BIDS location: the EDF payload plus, when an
/// events sidecar is present, its rows as events and annotations.
pub fn read_recording(path: &RecordingPath) -> Result<Raw, ConvertError> {
    let mut raw = read_edf(path.fpath())?;

    let events_path = path.sidecar_path("events.tsv");
    if events_path.exists() {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_path(&events_path)?;
        let headers = reader.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h == name);
        let (onset_at, duration_at, sample_at, trial_type_at, value_at) = (
            column("onset"),
            column("duration"),
            column("sample"),
            column("trial_type"),
            column("value"),
        );
        for result in reader.records() {
            let record = result?;
            let field = |at: Option<usize>| at.and_then(|i| record.get(i)).filter(|v| *v != "n/a");

            if let (Some(sample), Some(value)) = (field(sample_at), field(value_at)) {
                if let (Ok(sample), Ok(code)) = (sample.parse::<usize>(), value.parse::<i32>()) {
                    raw.events.push(Event { sample, code });
                }
            }
            if let Some(onset) = field(onset_at).and_then(|v| v.parse::<f64>().ok()) {
                let duration = field(duration_at)
                    .and_then(|v| v.parse::<f64>().ok())
                    .unwrap_or(0.0);
                let description = field(trial_type_at).unwrap_or("event");
                raw.annotate(onset, duration, description);
            }
        }
    }
    Ok(raw)
}
