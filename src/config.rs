//! Pipeline configuration: a YAML file describing the preprocessing
//! parameters for a project.
//!
//! [`Config::default`] is the built-in template; projects start from it,
//! adjust, and persist with [`Config::save`]. Saving and re-loading yields
//! an equal configuration.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{error, info};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub filter: FilterSettings,
    #[serde(default)]
    pub reference: ReferenceSettings,
    #[serde(default)]
    pub epoching: EpochSettings,
    #[serde(default)]
    pub flagging: FlagSettings,
}

/// FIR filter cutoffs in Hz. `None` disables that side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub highpass_hz: Option<f64>,
    pub lowpass_hz: Option<f64>,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            highpass_hz: Some(1.0),
            lowpass_hz: Some(100.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceSettings {
    pub kind: ReferenceKind,
}

impl Default for ReferenceSettings {
    fn default() -> Self {
        Self {
            kind: ReferenceKind::Average,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Average,
    None,
}

/// Fixed-window segmentation used by the noisy-window flagger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpochSettings {
    pub window_secs: f64,
}

impl Default for EpochSettings {
    fn default() -> Self {
        Self { window_secs: 1.0 }
    }
}

/// Robust z-score thresholds for flagging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagSettings {
    pub channel_threshold: f64,
    pub window_threshold: f64,
}

impl Default for FlagSettings {
    fn default() -> Self {
        Self {
            channel_threshold: 5.0,
            window_threshold: 5.0,
        }
    }
}

impl Config {
    /// Load a configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(config_path = ?path, "Loading configuration from file");
        let content = fs::read_to_string(path).with_context(|| {
            error!(config_path = ?path, "Failed to read config file");
            format!("failed to read config file {path:?}")
        })?;
        let config: Config = serde_yaml::from_str(&content).with_context(|| {
            error!(config_path = ?path, "Failed to parse config YAML");
            format!("failed to parse config YAML at {path:?}")
        })?;
        info!(config_path = ?path, "Config loaded");
        Ok(config)
    }

    /// Persist the configuration as YAML. The file is staged in the target
    /// directory and moved into place, so a failed save never leaves a
    /// half-written config behind.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let yaml = self.to_yaml()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to stage config file in {dir:?}"))?;
        staged
            .write_all(yaml.as_bytes())
            .context("failed to write staged config file")?;
        staged
            .persist(path)
            .with_context(|| format!("failed to persist config file {path:?}"))?;
        info!(config_path = ?path, "Config saved");
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("failed to serialise config as YAML")
    }

    /// Print the configuration as YAML to stdout.
    pub fn print(&self) -> Result<()> {
        println!("{}", self.to_yaml()?);
        Ok(())
    }
}
