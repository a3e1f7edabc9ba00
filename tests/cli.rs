mod common;

use assert_cmd::Command;
use common::make_recording;
use eeg_prep::edf::write_edf;
use eeg_prep::records::{ParamRecord, ParamTable};
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn init_config_writes_the_template() {
    let dir = tempdir().expect("temp dir");
    let out = dir.path().join("project_config.yaml");

    Command::cargo_bin("eeg-prep")
        .expect("binary should exist")
        .args(["init-config", "--out"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote default configuration"));

    let config = eeg_prep::config::Config::load(&out).expect("template should load");
    assert_eq!(config, eeg_prep::config::Config::default());
}

#[test]
fn run_with_a_missing_config_fails() {
    let dir = tempdir().expect("temp dir");
    Command::cargo_bin("eeg-prep")
        .expect("binary should exist")
        .args(["run", "--config"])
        .arg(dir.path().join("absent.yaml"))
        .arg("--bids-root")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("[ERROR]"));
}

/// End-to-end through the binary: CSV-driven conversion with the built-in
/// EDF importer, then a pipeline run over the created dataset.
#[test]
fn convert_then_run_via_the_cli() {
    let dir = tempdir().expect("temp dir");
    let source = dir.path().join("source.edf");
    write_edf(&source, &make_recording(4, 2560, 128.0, true)).unwrap();

    let import_csv = dir.path().join("import_args.csv");
    ParamTable::from_records(vec![ParamRecord::new()
        .with("path_in", source.to_string_lossy().as_ref())
        .with("stim_channel", "STI 014")])
    .write_csv(&import_csv)
    .unwrap();

    let paths_csv = dir.path().join("bids_path_args.csv");
    ParamTable::from_records(vec![ParamRecord::new()
        .with("subject", "001")
        .with("task", "mmn")
        .with("run", "01")])
    .write_csv(&paths_csv)
    .unwrap();

    let root = dir.path().join("bids");
    Command::cargo_bin("eeg-prep")
        .expect("binary should exist")
        .args(["convert", "--import-args"])
        .arg(&import_csv)
        .arg("--bids-path-args")
        .arg(&paths_csv)
        .arg("--root")
        .arg(&root)
        .arg("--overwrite")
        .assert()
        .success()
        .stdout(predicate::str::contains("Converted 1 recording(s)"));

    assert!(root.join("sub-001/eeg/sub-001_task-mmn_run-01_eeg.edf").exists());

    let config_path = dir.path().join("config.yaml");
    common::test_config().save(&config_path).unwrap();

    Command::cargo_bin("eeg-prep")
        .expect("binary should exist")
        .args(["run", "--config"])
        .arg(&config_path)
        .arg("--bids-root")
        .arg(&root)
        .args(["--subject", "001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dataset run complete"));

    assert!(root
        .join("derivatives/eeg-prep/sub-001/eeg/sub-001_task-mmn_run-01_desc-flags_channels.tsv")
        .exists());
}
