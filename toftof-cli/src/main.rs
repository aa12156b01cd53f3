//! toftof CLI - Load MLZ time-of-flight runs.
//!
//! Reads a TOFTOF/DNS NeXus file, calibrates the time-of-flight axis and
//! writes the workspace as HDF5 and/or a JSON summary.
#![allow(clippy::uninlined_format_args)]

use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use toftof_core::{
    DataSource, InstrumentDefinition, LoadConfig, LogProgress, ReferencePolicy, TubeInstrument,
};
use toftof_io::{
    read_workspace_hdf5, write_workspace_hdf5, HistogramWriteOptions, MlzLoader, NexusFile,
    Reference,
};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    ToftofIo(#[from] toftof_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] toftof_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What to do with a vanadium run recorded under other conditions.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Policy {
    /// Fail the load
    Abort,
    /// Warn and keep the data run's own elastic peak
    Skip,
}

impl From<Policy> for ReferencePolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Abort => ReferencePolicy::Abort,
            Policy::Skip => ReferencePolicy::Skip,
        }
    }
}

/// Time-of-flight loader for MLZ NeXus files.
#[derive(Parser)]
#[command(name = "toftof")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a run and calibrate its time-of-flight axis
    Load {
        /// Input NeXus file
        input: PathBuf,

        /// Vanadium NeXus file used to locate the elastic peak
        #[arg(long)]
        vanadium: Option<PathBuf>,

        /// Previously written workspace whose EPP property is reused
        #[arg(long)]
        vanadium_workspace: Option<PathBuf>,

        /// Instrument definition (JSON)
        #[arg(long)]
        instrument: Option<PathBuf>,

        /// Loader configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the reference policy of the configuration
        #[arg(long, value_enum)]
        reference_policy: Option<Policy>,

        /// Source to sample distance without an instrument definition (m)
        #[arg(long, default_value = "10.0")]
        l1: f64,

        /// Sample to detector distance without an instrument definition (m)
        #[arg(long, default_value = "4.0")]
        l2: f64,

        /// Output workspace (HDF5)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output summary (JSON)
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Show information about a NeXus file
    Info {
        /// Input NeXus file
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Load {
            input,
            vanadium,
            vanadium_workspace,
            instrument,
            config,
            reference_policy,
            l1,
            l2,
            output,
            summary,
        } => {
            let mut config = match config {
                Some(path) => LoadConfig::from_file(path)?,
                None => LoadConfig::default(),
            };
            if let Some(policy) = reference_policy {
                config.reference_policy = policy.into();
            }
            let loader = MlzLoader::new(config);

            let start = Instant::now();
            let source = NexusFile::open(&input)?;
            if MlzLoader::confidence(&source) == 0 {
                warn!("{} does not look like an MLZ file", input.display());
            }

            let mut geometry = match instrument {
                Some(path) => {
                    TubeInstrument::from_definition(InstrumentDefinition::from_file(path)?)?
                }
                None => {
                    let name = loader.instrument_name(&source)?;
                    let shape = loader.counts_shape(&source)?;
                    TubeInstrument::cylindrical(&name, l1, l2, shape.tubes, shape.pixels_per_tube)?
                }
            };

            let vanadium_source = vanadium.as_deref().map(NexusFile::open).transpose()?;
            let vanadium_ws = vanadium_workspace
                .as_deref()
                .map(read_workspace_hdf5)
                .transpose()?;

            let mut reference = Reference::none();
            if let Some(ws) = &vanadium_ws {
                reference = Reference::workspace(ws);
            }
            if let Some(src) = &vanadium_source {
                reference = reference.with_source(src);
            }

            let progress = LogProgress::new("populating spectra", 10);
            let run = loader.load(&source, &mut geometry, reference, &progress)?;
            info!("loaded {} in {:.2?}", input.display(), start.elapsed());

            println!("File: {}", input.display());
            println!("Instrument: {}", run.workspace.instrument_name);
            println!("Title: {}", run.workspace.title);
            println!(
                "Shape: {} tubes x {} pixels x {} channels",
                run.shape.tubes, run.shape.pixels_per_tube, run.shape.channels
            );
            println!(
                "Elastic peak: {} ({}), declared {}",
                run.peak.channel(),
                run.peak.source(),
                run.declared_peak
            );
            println!(
                "Elastic TOF: {:.3} us, channel width {:.3} us",
                run.kinematics.elastic_tof_us(),
                run.kinematics.channel_width
            );
            println!("Masked spectra: {}", run.workspace.masked_indices().len());
            for warning in &run.warnings {
                println!("Warning: {}", warning);
            }

            if let Some(path) = output {
                write_workspace_hdf5(&path, &run.workspace, &HistogramWriteOptions::default())?;
                println!("Workspace written to: {}", path.display());
            }
            if let Some(path) = summary {
                write_summary(&path, &run.summary())?;
                println!("Summary written to: {}", path.display());
            }
        }

        Commands::Info { input } => {
            let source = NexusFile::open(&input)?;
            let loader = MlzLoader::default();

            println!("File: {}", input.display());
            println!("Entry: {}", source.entry_name());
            println!("Confidence: {}", MlzLoader::confidence(&source));

            match loader.instrument_name(&source) {
                Ok(name) => println!("Instrument: {}", name),
                Err(err) => println!("Instrument: {}", err),
            }
            if let Ok(shape) = loader.counts_shape(&source) {
                println!(
                    "Counts: {} tubes x {} pixels x {} channels",
                    shape.tubes, shape.pixels_per_tube, shape.channels
                );
            }
            for field in ["title", "experiment_title", "mode", "start_time", "end_time"] {
                if let Ok(value) = source.read_string(field) {
                    println!("{}: {}", field, value);
                }
            }
            if let Ok(wavelength) = source.read_float("wavelength") {
                println!("wavelength: {} A", wavelength);
            }
        }
    }

    Ok(())
}

fn write_summary(path: &Path, summary: &toftof_io::RunSummary) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, summary)?;
    Ok(())
}
