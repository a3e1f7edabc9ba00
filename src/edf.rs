//! Compact reader/writer for 16-bit EDF recordings.
//!
//! EDF is the on-disk recording format this crate reads from and writes
//! into BIDS datasets: a fixed 256-byte ASCII header, one 256-byte header
//! block per signal (field-major), then data records of little-endian
//! `i16` samples scaled between a physical and a digital range per signal.
//!
//! The writer emits a single data record spanning the whole recording, so
//! any sample count round-trips without padding. The reader accepts any
//! record layout as long as every signal has the same per-record sample
//! count. Annotations are not part of the payload; they live in BIDS
//! sidecar files.

use std::fmt;
use std::fs;
use std::path::Path;

use ndarray::Array2;
use tracing::{debug, info};

use crate::raw::{ChannelInfo, ChannelKind, Raw};

const HEADER_LEN: usize = 256;
const SIGNAL_HEADER_LEN: usize = 256;
const DIG_MIN: f64 = -32768.0;
const DIG_MAX: f64 = 32767.0;

#[derive(Debug)]
pub enum EdfError {
    Io(std::io::Error),
    Header(String),
    Signal(String),
    Raw(crate::raw::RawError),
}

impl fmt::Display for EdfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdfError::Io(e) => write!(f, "io error: {e}"),
            EdfError::Header(msg) => write!(f, "malformed header: {msg}"),
            EdfError::Signal(msg) => write!(f, "malformed signal: {msg}"),
            EdfError::Raw(e) => write!(f, "invalid recording: {e}"),
        }
    }
}

impl std::error::Error for EdfError {}

impl From<std::io::Error> for EdfError {
    fn from(e: std::io::Error) -> Self {
        EdfError::Io(e)
    }
}

impl From<crate::raw::RawError> for EdfError {
    fn from(e: crate::raw::RawError) -> Self {
        EdfError::Raw(e)
    }
}

// ── Writing ───────────────────────────────────────────────────────────────

/// Write `raw` as a 16-bit EDF file at `path`.
pub fn write_edf<P: AsRef<Path>>(path: P, raw: &Raw) -> Result<(), EdfError> {
    let path = path.as_ref();
    let n_ch = raw.n_channels();
    let n_samples = raw.n_samples();
    if n_ch == 0 || n_samples == 0 {
        return Err(EdfError::Signal("empty recording".to_string()));
    }

    // Per-signal physical range; flat channels get a unit span so the
    // scaling stays invertible.
    let mut phys_min = vec![f64::INFINITY; n_ch];
    let mut phys_max = vec![f64::NEG_INFINITY; n_ch];
    for (c, row) in raw.data().rows().into_iter().enumerate() {
        for &v in row.iter() {
            phys_min[c] = phys_min[c].min(v);
            phys_max[c] = phys_max[c].max(v);
        }
        if phys_max[c] <= phys_min[c] {
            phys_max[c] = phys_min[c] + 1.0;
        }
    }

    let record_duration = n_samples as f64 / raw.sfreq();
    let mut buf = Vec::with_capacity(HEADER_LEN + n_ch * SIGNAL_HEADER_LEN + n_ch * n_samples * 2);

    // Fixed header.
    push_field(&mut buf, "0", 8);
    push_field(&mut buf, "X", 80);
    push_field(&mut buf, "X", 80);
    push_field(&mut buf, "01.01.00", 8);
    push_field(&mut buf, "00.00.00", 8);
    push_field(&mut buf, &(HEADER_LEN + n_ch * SIGNAL_HEADER_LEN).to_string(), 8);
    push_field(&mut buf, "", 44);
    push_field(&mut buf, "1", 8);
    push_field(&mut buf, &format_number(record_duration, 8), 8);
    push_field(&mut buf, &n_ch.to_string(), 4);

    // Signal headers, field-major.
    for ch in raw.channels() {
        push_field(&mut buf, &ch.label(), 16);
    }
    for _ in 0..n_ch {
        push_field(&mut buf, "", 80); // transducer
    }
    for ch in raw.channels() {
        let dim = if ch.kind == ChannelKind::Eeg { "uV" } else { "" };
        push_field(&mut buf, dim, 8);
    }
    for c in 0..n_ch {
        push_field(&mut buf, &format_number(phys_min[c], 8), 8);
    }
    for c in 0..n_ch {
        push_field(&mut buf, &format_number(phys_max[c], 8), 8);
    }
    for _ in 0..n_ch {
        push_field(&mut buf, "-32768", 8);
    }
    for _ in 0..n_ch {
        push_field(&mut buf, "32767", 8);
    }
    for _ in 0..n_ch {
        push_field(&mut buf, "", 80); // prefiltering
    }
    for _ in 0..n_ch {
        push_field(&mut buf, &n_samples.to_string(), 8);
    }
    for _ in 0..n_ch {
        push_field(&mut buf, "", 32);
    }

    // One data record with every sample, signal by signal.
    for (c, row) in raw.data().rows().into_iter().enumerate() {
        let span = phys_max[c] - phys_min[c];
        for &v in row.iter() {
            let d = (v - phys_min[c]) / span * (DIG_MAX - DIG_MIN) + DIG_MIN;
            let d = d.round().clamp(DIG_MIN, DIG_MAX) as i16;
            buf.extend_from_slice(&d.to_le_bytes());
        }
    }

    fs::write(path, &buf)?;
    info!(
        path = %path.display(),
        channels = n_ch,
        samples = n_samples,
        "Wrote EDF recording"
    );
    Ok(())
}

// ── Reading ───────────────────────────────────────────────────────────────

/// Read an EDF file into a [`Raw`]. All signals must share one sampling
/// rate; a degenerate physical range is rejected as malformed.
pub fn read_edf<P: AsRef<Path>>(path: P) -> Result<Raw, EdfError> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    if bytes.len() < HEADER_LEN {
        return Err(EdfError::Header("file shorter than fixed header".to_string()));
    }

    let n_records = parse_int(&bytes, 236, 8, "record count")?;
    if n_records < 1 {
        return Err(EdfError::Header(format!("record count {n_records} not usable")));
    }
    let record_duration = parse_float(&bytes, 244, 8, "record duration")?;
    if !(record_duration > 0.0) {
        return Err(EdfError::Header(format!(
            "record duration {record_duration} not positive"
        )));
    }
    let n_ch = parse_int(&bytes, 252, 4, "signal count")? as usize;
    if n_ch == 0 {
        return Err(EdfError::Header("zero signals".to_string()));
    }

    let sig_headers_end = HEADER_LEN + n_ch * SIGNAL_HEADER_LEN;
    if bytes.len() < sig_headers_end {
        return Err(EdfError::Header("file shorter than signal headers".to_string()));
    }

    // Field-major signal header blocks.
    let labels_at = HEADER_LEN;
    let phys_min_at = labels_at + n_ch * (16 + 80 + 8);
    let phys_max_at = phys_min_at + n_ch * 8;
    let spr_at = phys_max_at + n_ch * (8 + 8 + 8 + 80);

    let mut channels = Vec::with_capacity(n_ch);
    let mut phys_min = Vec::with_capacity(n_ch);
    let mut phys_max = Vec::with_capacity(n_ch);
    let mut samples_per_record = Vec::with_capacity(n_ch);
    for c in 0..n_ch {
        let label = parse_str(&bytes, labels_at + c * 16, 16)?;
        let (kind, name) = ChannelKind::split_label(label.trim());
        channels.push(ChannelInfo {
            name,
            kind,
        });

        let pmin = parse_float(&bytes, phys_min_at + c * 8, 8, "physical minimum")?;
        let pmax = parse_float(&bytes, phys_max_at + c * 8, 8, "physical maximum")?;
        if pmax <= pmin {
            return Err(EdfError::Signal(format!(
                "signal {c} has degenerate physical range [{pmin}, {pmax}]"
            )));
        }
        phys_min.push(pmin);
        phys_max.push(pmax);

        let spr = parse_int(&bytes, spr_at + c * 8, 8, "samples per record")?;
        if spr < 1 {
            return Err(EdfError::Signal(format!("signal {c} has {spr} samples per record")));
        }
        samples_per_record.push(spr as usize);
    }

    let spr = samples_per_record[0];
    if samples_per_record.iter().any(|&s| s != spr) {
        return Err(EdfError::Signal(
            "signals have differing samples per record".to_string(),
        ));
    }

    let n_records = n_records as usize;
    let n_samples = n_records * spr;
    let data_len = n_records * n_ch * spr * 2;
    if bytes.len() < sig_headers_end + data_len {
        return Err(EdfError::Signal("file shorter than declared data".to_string()));
    }

    let sfreq = spr as f64 / record_duration;
    let mut data = Array2::<f64>::zeros((n_ch, n_samples));
    let mut at = sig_headers_end;
    for record in 0..n_records {
        for c in 0..n_ch {
            let span = phys_max[c] - phys_min[c];
            for s in 0..spr {
                let d = i16::from_le_bytes([bytes[at], bytes[at + 1]]) as f64;
                at += 2;
                data[[c, record * spr + s]] = (d - DIG_MIN) / (DIG_MAX - DIG_MIN) * span + phys_min[c];
            }
        }
    }
    debug!(
        path = %path.display(),
        channels = n_ch,
        samples = n_samples,
        sfreq = sfreq,
        "Read EDF recording"
    );

    Ok(Raw::new(data, sfreq, channels)?)
}

// ── Field helpers ─────────────────────────────────────────────────────────

fn push_field(buf: &mut Vec<u8>, value: &str, width: usize) {
    let mut field: Vec<u8> = value
        .bytes()
        .map(|b| if b.is_ascii() && b >= 0x20 { b } else { b'_' })
        .take(width)
        .collect();
    field.resize(width, b' ');
    buf.extend_from_slice(&field);
}

/// Render a number into at most `width` ASCII characters, trading decimal
/// places for fit.
fn format_number(x: f64, width: usize) -> String {
    if x == x.trunc() && x.abs() < 1e8 {
        let s = format!("{}", x as i64);
        if s.len() <= width {
            return s;
        }
    }
    for precision in (0..=7).rev() {
        let s = format!("{x:.precision$}");
        if s.len() <= width {
            return s;
        }
    }
    "0".to_string()
}

fn parse_str(bytes: &[u8], at: usize, width: usize) -> Result<&str, EdfError> {
    std::str::from_utf8(&bytes[at..at + width])
        .map_err(|_| EdfError::Header(format!("non-ASCII field at byte {at}")))
}

fn parse_float(bytes: &[u8], at: usize, width: usize, what: &str) -> Result<f64, EdfError> {
    let s = parse_str(bytes, at, width)?.trim();
    s.parse::<f64>()
        .map_err(|_| EdfError::Header(format!("{what} {s:?} is not a number")))
}

fn parse_int(bytes: &[u8], at: usize, width: usize, what: &str) -> Result<i64, EdfError> {
    let s = parse_str(bytes, at, width)?.trim();
    s.parse::<i64>()
        .map_err(|_| EdfError::Header(format!("{what} {s:?} is not an integer")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_fits_width() {
        assert_eq!(format_number(10.0, 8), "10");
        assert_eq!(format_number(0.5, 8), "0.5");
        assert!(format_number(12.333333333, 8).len() <= 8);
        assert!(format_number(-1234.5678999, 8).len() <= 8);
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.edf");
        fs::write(&path, b"0       ").unwrap();
        assert!(matches!(read_edf(&path), Err(EdfError::Header(_))));
    }
}
