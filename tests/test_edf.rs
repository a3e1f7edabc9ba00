mod common;

use common::make_recording;
use eeg_prep::edf::{read_edf, write_edf, EdfError};
use eeg_prep::raw::ChannelKind;
use tempfile::tempdir;

#[test]
fn recording_round_trips_within_quantisation_error() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("sub-01_task-rest_eeg.edf");

    let raw = make_recording(8, 2560, 128.0, false);
    write_edf(&path, &raw).expect("recording should write");
    let back = read_edf(&path).expect("recording should read");

    assert_eq!(back.n_channels(), raw.n_channels());
    assert_eq!(back.n_samples(), raw.n_samples());
    assert_eq!(back.ch_names(), raw.ch_names());
    assert!((back.sfreq() - raw.sfreq()).abs() < 1e-9);

    // 16-bit quantisation over a ~±30 uV span stays well under 0.01 uV.
    let mut max_err = 0.0_f64;
    for (a, b) in raw.data().iter().zip(back.data().iter()) {
        max_err = max_err.max((a - b).abs());
    }
    assert!(max_err < 0.01, "max round-trip error {max_err}");
}

#[test]
fn channel_kinds_survive_the_label_prefix() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("stim.edf");

    let raw = make_recording(2, 600, 128.0, true);
    write_edf(&path, &raw).unwrap();
    let back = read_edf(&path).unwrap();

    assert_eq!(back.channels()[0].kind, ChannelKind::Eeg);
    assert_eq!(back.channels()[2].kind, ChannelKind::Stim);
    assert_eq!(back.channels()[2].name, "STI 014");
    // Stim pulses survive scaling exactly enough to re-detect events.
    assert_eq!(back.find_events("STI 014").unwrap().len(), 3);
}

#[test]
fn flat_channels_are_written_with_a_unit_span() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("flat.edf");

    // A constant channel exercises the degenerate-range guard on the
    // writer side.
    let raw = make_recording(1, 100, 100.0, false);
    let mut data = raw.data().clone();
    for v in data.row_mut(0).iter_mut() {
        *v = 4.25;
    }
    let flat = eeg_prep::raw::Raw::new(data, 100.0, raw.channels().to_vec()).unwrap();
    write_edf(&path, &flat).unwrap();
    let back = read_edf(&path).unwrap();
    for &v in back.data().iter() {
        assert!((v - 4.25).abs() < 1e-3);
    }
}

#[test]
fn empty_recordings_are_rejected() {
    let dir = tempdir().expect("temp dir");
    let raw = make_recording(2, 600, 128.0, false);
    let err = write_edf(dir.path().join("x.edf"), &raw.pick(&[])).unwrap_err();
    assert!(matches!(err, EdfError::Signal(_)));
}
