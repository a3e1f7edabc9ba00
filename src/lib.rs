//! # eeg-prep: BIDS EEG dataset preparation and lossless preprocessing
//!
//! Running the pipeline always requires a BIDS dataset and a YAML
//! configuration describing the preprocessing parameters. This crate
//! covers the whole path to both: fetch a public dataset from an archive,
//! convert foreign recordings into BIDS layout, then run the pipeline over
//! one recording or the whole dataset, writing additive flag derivatives.
//!
//! ```no_run
//! use eeg_prep::config::Config;
//! use eeg_prep::bids::RecordingPath;
//! use eeg_prep::pipeline::Pipeline;
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! // A default configuration template, adjusted and persisted per project.
//! let config = Config::default();
//! config.print()?;
//! config.save("my_project_config.yaml")?;
//!
//! // One recording of a local BIDS dataset.
//! let bids_root = Path::new("data/ds002778");
//! let recording = RecordingPath::new(bids_root, "pd6").session("off").task("rest");
//!
//! // Run the pipeline on it, or on every discovered recording.
//! let pipeline = Pipeline::new("my_project_config.yaml")?;
//! let record = pipeline.run(&eeg_prep::bids::read_recording(&recording)?)?;
//! println!("flagged channels: {:?}", record.flagged_channels);
//!
//! let recordings = RecordingPath::discover(bids_root, "eeg", "eeg")?;
//! let report = pipeline.run_dataset(&recordings)?;
//! println!("{report:#?}");
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod bids;
pub mod config;
pub mod edf;
pub mod pipeline;
pub mod raw;
pub mod records;
pub mod steps;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use archive::{fetch_dataset, FetchRequest, HttpArchive};
use bids::{convert_dataset_to_bids, EdfImport, RecordingPath};
use config::Config;
use pipeline::Pipeline;
use records::ParamTable;

#[derive(Parser)]
#[clap(
    name = "eeg-prep",
    version,
    about = "Fetch, convert and losslessly preprocess BIDS EEG datasets"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write the default configuration template to a YAML file
    InitConfig {
        /// Where to write the template
        #[clap(long, default_value = "eeg_prep_config.yaml")]
        out: PathBuf,
    },
    /// Download a dataset from an archive into a local BIDS root
    Fetch {
        /// Base URL of the dataset archive
        #[clap(long)]
        base_url: String,
        /// Dataset identifier, e.g. ds002778
        #[clap(long)]
        dataset: String,
        /// Only fetch manifest entries under this prefix, e.g. sub-pd6
        #[clap(long)]
        include: Option<String>,
        /// Target directory for the downloaded dataset
        #[clap(long)]
        target: PathBuf,
    },
    /// Run the pipeline over the recordings of a BIDS dataset
    Run {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Root of the BIDS dataset
        #[clap(long)]
        bids_root: PathBuf,
        /// Restrict the run to these subjects (repeatable)
        #[clap(long)]
        subject: Vec<String>,
    },
    /// Convert recordings into BIDS layout, driven by CSV parameter tables
    Convert {
        /// CSV of per-recording import arguments (path_in, stim_channel, ...)
        #[clap(long)]
        import_args: PathBuf,
        /// CSV of per-recording path entities (subject, session, task, run)
        #[clap(long)]
        bids_path_args: PathBuf,
        /// Root of the BIDS dataset to create
        #[clap(long)]
        root: PathBuf,
        /// Replace recordings that already exist
        #[clap(long)]
        overwrite: bool,
    },
}

/// Async CLI entrypoint, shared by `main` and the integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::InitConfig { out } => {
            let config = Config::default();
            config.save(&out)?;
            println!("Wrote default configuration to {}", out.display());
            Ok(())
        }
        Commands::Fetch {
            base_url,
            dataset,
            include,
            target,
        } => {
            let archive = HttpArchive::new(&base_url);
            let request = FetchRequest {
                dataset: dataset.clone(),
                include,
                target_dir: target.clone(),
            };
            let report = fetch_dataset(&archive, &request)
                .await
                .with_context(|| format!("failed to fetch dataset {dataset}"))?;
            println!(
                "Fetched {} file(s) into {} ({} already present)",
                report.downloaded.len(),
                target.display(),
                report.skipped
            );
            Ok(())
        }
        Commands::Run {
            config,
            bids_root,
            subject,
        } => {
            let pipeline = Pipeline::new(&config)?;
            let mut recordings = RecordingPath::discover(&bids_root, "eeg", "eeg")?;
            if !subject.is_empty() {
                recordings.retain(|r| subject.iter().any(|s| s == &r.subject));
            }
            if recordings.is_empty() {
                anyhow::bail!("no recordings found under {}", bids_root.display());
            }
            let report = pipeline.run_dataset(&recordings)?;
            println!("Dataset run complete.\nReport:");
            println!("{report:#?}");
            Ok(())
        }
        Commands::Convert {
            import_args,
            bids_path_args,
            root,
            overwrite,
        } => {
            let imports = ParamTable::read_csv(&import_args)
                .with_context(|| format!("failed to read {}", import_args.display()))?;
            let paths = ParamTable::read_csv(&bids_path_args)
                .with_context(|| format!("failed to read {}", bids_path_args.display()))?;
            let created =
                convert_dataset_to_bids(&EdfImport, &imports, &paths, &root, overwrite).await?;
            println!("Converted {} recording(s) into {}", created.len(), root.display());
            for path in &created {
                println!("  {}", path.fpath().display());
            }
            Ok(())
        }
    }
}
