//! BIDS recording-path descriptors.
//!
//! A [`RecordingPath`] names one recording inside a BIDS tree by its
//! entities (subject, optional session/task/run), datatype and suffix, and
//! knows how to render the canonical file name and directory layout, parse
//! them back, and discover every matching recording under a root.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

pub const DATA_EXTENSION: &str = "edf";

#[derive(Debug)]
pub enum BidsPathError {
    Io(std::io::Error),
    Parse { path: PathBuf, reason: String },
}

impl fmt::Display for BidsPathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BidsPathError::Io(e) => write!(f, "io error: {e}"),
            BidsPathError::Parse { path, reason } => {
                write!(f, "cannot parse {} as a BIDS name: {reason}", path.display())
            }
        }
    }
}

impl std::error::Error for BidsPathError {}

impl From<std::io::Error> for BidsPathError {
    fn from(e: std::io::Error) -> Self {
        BidsPathError::Io(e)
    }
}

/// Descriptor for one recording in a BIDS dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingPath {
    pub root: PathBuf,
    pub subject: String,
    pub session: Option<String>,
    pub task: Option<String>,
    pub run: Option<u32>,
    pub datatype: String,
    pub suffix: String,
}

impl RecordingPath {
    pub fn new(root: &Path, subject: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            subject: subject.to_string(),
            session: None,
            task: None,
            run: None,
            datatype: "eeg".to_string(),
            suffix: "eeg".to_string(),
        }
    }

    pub fn session(mut self, session: &str) -> Self {
        self.session = Some(session.to_string());
        self
    }

    pub fn task(mut self, task: &str) -> Self {
        self.task = Some(task.to_string());
        self
    }

    pub fn run(mut self, run: u32) -> Self {
        self.run = Some(run);
        self
    }

    pub fn datatype(mut self, datatype: &str) -> Self {
        self.datatype = datatype.to_string();
        self
    }

    pub fn suffix(mut self, suffix: &str) -> Self {
        self.suffix = suffix.to_string();
        self
    }

    /// Entity prefix: `sub-01[_ses-a][_task-b][_run-01]`.
    pub fn entity_label(&self) -> String {
        let mut label = format!("sub-{}", self.subject);
        if let Some(session) = &self.session {
            label.push_str(&format!("_ses-{session}"));
        }
        if let Some(task) = &self.task {
            label.push_str(&format!("_task-{task}"));
        }
        if let Some(run) = self.run {
            label.push_str(&format!("_run-{run:02}"));
        }
        label
    }

    /// Canonical file stem: entity label plus suffix.
    pub fn basename(&self) -> String {
        format!("{}_{}", self.entity_label(), self.suffix)
    }

    /// File name of a sidecar sharing this recording's entities, e.g.
    /// `sidecar_fname("channels.tsv")` → `sub-01_..._channels.tsv`.
    pub fn sidecar_fname(&self, sidecar: &str) -> String {
        format!("{}_{}", self.entity_label(), sidecar)
    }

    /// Directory that holds the recording:
    /// `<root>/sub-XX[/ses-YY]/<datatype>`.
    pub fn dir(&self) -> PathBuf {
        let mut dir = self.root.join(format!("sub-{}", self.subject));
        if let Some(session) = &self.session {
            dir.push(format!("ses-{session}"));
        }
        dir.push(&self.datatype);
        dir
    }

    /// Full path of the recording data file.
    pub fn fpath(&self) -> PathBuf {
        self.dir().join(format!("{}.{}", self.basename(), DATA_EXTENSION))
    }

    /// Path of a sidecar next to the data file.
    pub fn sidecar_path(&self, sidecar: &str) -> PathBuf {
        self.dir().join(self.sidecar_fname(sidecar))
    }

    /// Re-root the descriptor, e.g. into a derivatives tree.
    pub fn with_root(&self, root: &Path) -> Self {
        let mut path = self.clone();
        path.root = root.to_path_buf();
        path
    }

    /// Parse a data file path back into a descriptor. The datatype is taken
    /// from the parent directory name.
    pub fn parse(root: &Path, file_path: &Path) -> Result<Self, BidsPathError> {
        static NAME: OnceLock<Regex> = OnceLock::new();
        let name = NAME.get_or_init(|| {
            Regex::new(
                r"^sub-([A-Za-z0-9]+)(?:_ses-([A-Za-z0-9]+))?(?:_task-([A-Za-z0-9]+))?(?:_run-([0-9]+))?_([a-z0-9]+)$",
            )
            .expect("entity pattern is valid")
        });

        let parse_err = |reason: &str| BidsPathError::Parse {
            path: file_path.to_path_buf(),
            reason: reason.to_string(),
        };

        let stem = file_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| parse_err("no file stem"))?;
        let captures = name
            .captures(stem)
            .ok_or_else(|| parse_err("entities do not match sub-/ses-/task-/run- layout"))?;
        let datatype = file_path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .ok_or_else(|| parse_err("no datatype directory"))?;

        let run = match captures.get(4) {
            Some(m) => Some(
                m.as_str()
                    .parse::<u32>()
                    .map_err(|_| parse_err("run index is not a number"))?,
            ),
            None => None,
        };

        Ok(Self {
            root: root.to_path_buf(),
            subject: captures[1].to_string(),
            session: captures.get(2).map(|m| m.as_str().to_string()),
            task: captures.get(3).map(|m| m.as_str().to_string()),
            run,
            datatype: datatype.to_string(),
            suffix: captures[5].to_string(),
        })
    }

    /// Walk a BIDS root and return every recording with the given datatype
    /// and suffix, sorted by subject, session and run.
    pub fn discover(root: &Path, datatype: &str, suffix: &str) -> Result<Vec<Self>, BidsPathError> {
        let mut found = Vec::new();
        if !root.exists() {
            return Ok(found);
        }
        for subject_dir in name_matching_dirs(root, "sub-")? {
            let mut datatype_dirs = vec![subject_dir.join(datatype)];
            for session_dir in name_matching_dirs(&subject_dir, "ses-")? {
                datatype_dirs.push(session_dir.join(datatype));
            }
            for dir in datatype_dirs {
                if !dir.is_dir() {
                    continue;
                }
                for entry in fs::read_dir(&dir)? {
                    let path = entry?.path();
                    let is_data = path.extension().and_then(|e| e.to_str()) == Some(DATA_EXTENSION);
                    if !is_data {
                        continue;
                    }
                    match Self::parse(root, &path) {
                        Ok(recording) if recording.suffix == suffix => found.push(recording),
                        Ok(_) => {}
                        Err(e) => debug!(path = %path.display(), error = %e, "Skipping non-BIDS file"),
                    }
                }
            }
        }
        found.sort_by(|a, b| {
            (&a.subject, &a.session, &a.run, &a.task).cmp(&(&b.subject, &b.session, &b.run, &b.task))
        });
        Ok(found)
    }
}

fn name_matching_dirs(parent: &Path, prefix: &str) -> Result<Vec<PathBuf>, BidsPathError> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(parent)? {
        let path = entry?.path();
        let starts = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(prefix));
        if path.is_dir() && starts {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_includes_only_present_entities() {
        let path = RecordingPath::new(Path::new("/data"), "pd6").session("off").task("rest");
        assert_eq!(path.basename(), "sub-pd6_ses-off_task-rest_eeg");
        assert_eq!(
            path.fpath(),
            PathBuf::from("/data/sub-pd6/ses-off/eeg/sub-pd6_ses-off_task-rest_eeg.edf")
        );
    }

    #[test]
    fn run_is_zero_padded() {
        let path = RecordingPath::new(Path::new("/data"), "001").task("mmn").run(1);
        assert_eq!(path.basename(), "sub-001_task-mmn_run-01_eeg");
    }

    #[test]
    fn parse_inverts_fpath() {
        let original = RecordingPath::new(Path::new("/data"), "001")
            .session("01")
            .task("mmn")
            .run(3);
        let parsed = RecordingPath::parse(Path::new("/data"), &original.fpath()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn parse_rejects_foreign_names() {
        let err = RecordingPath::parse(Path::new("/data"), Path::new("/data/eeg/notes.edf"));
        assert!(matches!(err, Err(BidsPathError::Parse { .. })));
    }
}
