//! Dataset archive client.
//!
//! Public EEG datasets are fetched by identifier from a remote archive
//! that serves, per dataset, a `manifest.json` listing files with sizes
//! and SHA-256 digests, and the files themselves at the same
//! relative paths. [`HttpArchive`] downloads a dataset (optionally
//! filtered to one subject prefix) into a local BIDS root, verifying every
//! body against its manifest digest and skipping files that are already
//! present and intact.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};

/// One file in a dataset manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub size: u64,
    pub sha256: String,
}

/// What to fetch and where to put it.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Dataset identifier, e.g. `ds002778`.
    pub dataset: String,
    /// Restrict to manifest entries under this path prefix, e.g. `sub-pd6`.
    pub include: Option<String>,
    /// Local directory the dataset lands in.
    pub target_dir: PathBuf,
}

/// Outcome of a fetch: which files were written and how many were already
/// present with a matching digest.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub downloaded: Vec<PathBuf>,
    pub skipped: usize,
}

#[derive(Debug)]
pub enum ArchiveError {
    Http(reqwest::Error),
    Status { url: String, status: u16 },
    DigestMismatch { path: String, expected: String, actual: String },
    Io(std::io::Error),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::Http(e) => write!(f, "http error: {e}"),
            ArchiveError::Status { url, status } => write!(f, "{url} returned status {status}"),
            ArchiveError::DigestMismatch { path, expected, actual } => write!(
                f,
                "digest mismatch for {path}: manifest {expected}, body {actual}"
            ),
            ArchiveError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for ArchiveError {}

impl From<reqwest::Error> for ArchiveError {
    fn from(e: reqwest::Error) -> Self {
        ArchiveError::Http(e)
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(e: std::io::Error) -> Self {
        ArchiveError::Io(e)
    }
}

/// A remote store of datasets addressable by identifier.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Archive: Send + Sync {
    /// Download the requested dataset files, returning what was fetched.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchReport, ArchiveError>;
}

/// Fetch a dataset through any [`Archive`] implementation.
pub async fn fetch_dataset<A: Archive>(
    archive: &A,
    request: &FetchRequest,
) -> Result<FetchReport, ArchiveError> {
    info!(
        dataset = %request.dataset,
        target = %request.target_dir.display(),
        include = request.include.as_deref().unwrap_or("*"),
        "Fetching dataset"
    );
    let report = archive.fetch(request).await?;
    info!(
        downloaded = report.downloaded.len(),
        skipped = report.skipped,
        "Fetch complete"
    );
    Ok(report)
}

/// Archive over plain HTTP: `<base>/<dataset>/manifest.json` plus one URL
/// per manifest path.
pub struct HttpArchive {
    base_url: String,
    client: reqwest::Client,
}

impl HttpArchive {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_manifest(&self, dataset: &str) -> Result<Vec<ManifestEntry>, ArchiveError> {
        let url = format!("{}/{}/manifest.json", self.base_url, dataset);
        info!(url = %url, "Fetching dataset manifest");
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            error!(url = %url, status = %status, "Manifest request failed");
            return Err(ArchiveError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(response.json::<Vec<ManifestEntry>>().await?)
    }
}

#[async_trait]
impl Archive for HttpArchive {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchReport, ArchiveError> {
        let manifest = self.fetch_manifest(&request.dataset).await?;
        let wanted = filter_manifest(&manifest, request.include.as_deref());
        info!(
            dataset = %request.dataset,
            files = wanted.len(),
            total = manifest.len(),
            "Fetching dataset files"
        );

        let mut report = FetchReport::default();
        for entry in wanted {
            let target = request.target_dir.join(&entry.path);
            if target.exists() {
                let existing = fs::read(&target)?;
                if sha256_hex(&existing) == entry.sha256 {
                    debug!(path = %target.display(), "File present with matching digest, skipping");
                    report.skipped += 1;
                    continue;
                }
            }

            let url = format!("{}/{}/{}", self.base_url, request.dataset, entry.path);
            let response = self.client.get(&url).send().await?;
            let status = response.status();
            if !status.is_success() {
                error!(url = %url, status = %status, "File request failed");
                return Err(ArchiveError::Status {
                    url,
                    status: status.as_u16(),
                });
            }
            let body = response.bytes().await?;

            let actual = sha256_hex(&body);
            if actual != entry.sha256 {
                error!(path = %entry.path, expected = %entry.sha256, actual = %actual, "Digest mismatch");
                return Err(ArchiveError::DigestMismatch {
                    path: entry.path.clone(),
                    expected: entry.sha256.clone(),
                    actual,
                });
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &body)?;
            info!(path = %target.display(), bytes = body.len(), "Downloaded file");
            report.downloaded.push(target);
        }
        Ok(report)
    }
}

/// Entries whose path starts with the include prefix; everything when no
/// prefix is given.
pub fn filter_manifest<'a>(
    manifest: &'a [ManifestEntry],
    include: Option<&str>,
) -> Vec<&'a ManifestEntry> {
    manifest
        .iter()
        .filter(|entry| include.map_or(true, |prefix| entry.path.starts_with(prefix)))
        .collect()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
