mod common;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use common::{make_recording, test_config};
use eeg_prep::bids::{
    convert_dataset_to_bids, read_recording, ConvertError, Import, ImportError, ImportedRecording,
    MockImport,
};
use eeg_prep::edf::{read_edf, write_edf};
use eeg_prep::pipeline::Pipeline;
use eeg_prep::raw::ChannelKind;
use eeg_prep::records::{ParamRecord, ParamTable};
use tempfile::tempdir;

/// A project-specific loader in the shape users write them: read the
/// source file, round-trip it through a volatile intermediate copy in a
/// temporary directory, detect events on the stimulus channel, and keep
/// only the EEG channels for the sidecars.
struct MmnImport;

#[async_trait]
impl Import for MmnImport {
    async fn import(&self, args: &ParamRecord) -> Result<ImportedRecording, ImportError> {
        let path_in = args
            .get("path_in")
            .ok_or_else(|| ImportError::MissingArgument("path_in".to_string()))?;
        let stim = args
            .get("stim_channel")
            .ok_or_else(|| ImportError::MissingArgument("stim_channel".to_string()))?;

        let raw = read_edf(path_in)?;

        // The source file is volatile; work from a private copy.
        let temp_dir = tempfile::tempdir()?;
        let temp_path = temp_dir.path().join("tmp_raw.edf");
        write_edf(&temp_path, &raw)?;
        let raw = read_edf(&temp_path)?;

        let events = raw.find_events(stim)?;
        let mut raw = raw.pick(&[ChannelKind::Eeg]);
        raw.rename_channel("E0", "Cz")?;

        let event_id = BTreeMap::from([("standard".to_string(), 2), ("deviant".to_string(), 7)]);
        Ok(ImportedRecording {
            raw,
            events,
            event_id,
        })
    }
}

fn source_recording(dir: &Path) -> String {
    let path = dir.join("sub-s004_task-MMN.edf");
    write_edf(&path, &make_recording(4, 2560, 128.0, true)).expect("source should write");
    path.to_string_lossy().into_owned()
}

fn tables(source: &str) -> (ParamTable, ParamTable) {
    let import_args = ParamTable::from_records(vec![
        ParamRecord::new().with("stim_channel", "STI 014").with("path_in", source),
        ParamRecord::new().with("stim_channel", "STI 014").with("path_in", source),
    ]);
    let bids_path_args = ParamTable::from_records(vec![
        ParamRecord::new()
            .with("subject", "001")
            .with("run", "01")
            .with("session", "01")
            .with("task", "mmn"),
        ParamRecord::new()
            .with("subject", "002")
            .with("run", "01")
            .with("session", "01")
            .with("task", "mmn"),
    ]);
    (import_args, bids_path_args)
}

#[tokio::test]
async fn conversion_builds_a_complete_bids_tree() {
    let dir = tempdir().expect("temp dir");
    let source = source_recording(dir.path());
    let root = dir.path().join("bids");
    let (import_args, bids_path_args) = tables(&source);

    let created = convert_dataset_to_bids(&MmnImport, &import_args, &bids_path_args, &root, true)
        .await
        .expect("conversion should succeed");

    assert_eq!(created.len(), 2);
    assert_eq!(
        created[0].fpath(),
        root.join("sub-001/ses-01/eeg/sub-001_ses-01_task-mmn_run-01_eeg.edf")
    );
    assert!(created[0].fpath().exists());
    assert!(root.join("dataset_description.json").exists());

    // Channels sidecar carries EEG channels only, with the rename applied.
    let channels = fs::read_to_string(created[0].sidecar_path("channels.tsv")).unwrap();
    assert!(channels.contains("Cz\tEEG\tuV\tgood"));
    assert!(!channels.contains("STIM"));

    // Events sidecar names the event codes through the event_id map.
    let events = fs::read_to_string(created[0].sidecar_path("events.tsv")).unwrap();
    assert!(events.contains("standard"));
    assert!(events.contains("deviant"));

    // The recording reads back with its events and annotations attached.
    let raw = read_recording(&created[0]).unwrap();
    assert_eq!(raw.ch_names()[0], "Cz");
    assert_eq!(raw.events.len(), 3);
    assert_eq!(raw.annotations.len(), 3);
}

#[tokio::test]
async fn existing_recordings_are_protected_without_overwrite() {
    let dir = tempdir().expect("temp dir");
    let source = source_recording(dir.path());
    let root = dir.path().join("bids");
    let (import_args, bids_path_args) = tables(&source);

    convert_dataset_to_bids(&MmnImport, &import_args, &bids_path_args, &root, true)
        .await
        .unwrap();
    let err = convert_dataset_to_bids(&MmnImport, &import_args, &bids_path_args, &root, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::Exists(_)));

    // With overwrite the same rows convert again.
    convert_dataset_to_bids(&MmnImport, &import_args, &bids_path_args, &root, true)
        .await
        .expect("overwrite should succeed");
}

#[tokio::test]
async fn converted_recordings_run_through_the_pipeline() {
    let dir = tempdir().expect("temp dir");
    let source = source_recording(dir.path());
    let root = dir.path().join("bids");
    let (import_args, bids_path_args) = tables(&source);

    let created = convert_dataset_to_bids(&MmnImport, &import_args, &bids_path_args, &root, true)
        .await
        .unwrap();

    let pipeline = Pipeline::from_config(test_config());
    let report = pipeline.run_dataset(&created).expect("dataset run should succeed");
    assert_eq!(report.recordings.len(), 2);

    let derivative_dir = root.join("derivatives/eeg-prep");
    assert!(derivative_dir
        .join("sub-001/ses-01/eeg/sub-001_ses-01_task-mmn_run-01_desc-flags_channels.tsv")
        .exists());
    assert!(derivative_dir
        .join("sub-001/ses-01/eeg/sub-001_ses-01_task-mmn_run-01_events.tsv")
        .exists());
    assert!(derivative_dir.join("eeg-prep_config.yaml").exists());
}

#[tokio::test]
async fn mismatched_tables_are_rejected() {
    let dir = tempdir().expect("temp dir");
    let import_args =
        ParamTable::from_records(vec![ParamRecord::new().with("path_in", "whatever")]);
    let bids_path_args = ParamTable::new();
    let err = convert_dataset_to_bids(&MmnImport, &import_args, &bids_path_args, dir.path(), true)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConvertError::LengthMismatch { imports: 1, paths: 0 }
    ));
}

#[tokio::test]
async fn missing_subject_column_is_rejected() {
    let dir = tempdir().expect("temp dir");
    let import_args =
        ParamTable::from_records(vec![ParamRecord::new().with("path_in", "whatever")]);
    let bids_path_args = ParamTable::from_records(vec![ParamRecord::new().with("task", "mmn")]);
    let err = convert_dataset_to_bids(&MmnImport, &import_args, &bids_path_args, dir.path(), true)
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::MissingColumn { row: 0, .. }));
}

#[tokio::test]
async fn import_failure_aborts_the_conversion() {
    let dir = tempdir().expect("temp dir");
    let mut importer = MockImport::new();
    importer
        .expect_import()
        .returning(|_| Err(ImportError::Other("broken project reader".to_string())));

    let import_args = ParamTable::from_records(vec![ParamRecord::new().with("path_in", "x")]);
    let bids_path_args = ParamTable::from_records(vec![ParamRecord::new().with("subject", "001")]);
    let err = convert_dataset_to_bids(&importer, &import_args, &bids_path_args, dir.path(), true)
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::Import(ImportError::Other(_))));
}
