//! # Planset CLI
//!
//! Command-line front end for `cd_core`: parse a room program, generate a
//! drawing set into an output directory, or run the built-in demo.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cd_core::config::{ExportFormat, GenerationConfig};
use cd_core::errors::CdResult;
use cd_core::file_io::{load_config, load_requirements, write_artifacts, write_bundle, OutputLock};
use cd_core::export::bundle;
use cd_core::pipeline::{run_pipeline, PipelineRun};
use cd_core::qc::Severity;
use cd_core::requirements::{interpret, RequirementsInput};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEMO_PROGRAM: &str = "\
# Demo House
Living: 25 m2 [adj: Kitchen]
Kitchen: 15 m2
2x Bedroom: 16 m2 [adj: Living]
Bathroom: 6 m2
";

/// Planset - room program to construction drawings
#[derive(Parser)]
#[command(name = "planset")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interpret a requirements file and print the normalized program
    Parse {
        /// Requirements file (.json for structured requests, anything else is text)
        input: PathBuf,
    },

    /// Generate a drawing set
    Generate {
        /// Requirements file
        input: PathBuf,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Generate the built-in sample house
    Demo {
        #[command(flatten)]
        options: RunOptions,
    },
}

#[derive(clap::Args)]
struct RunOptions {
    /// Generation config (JSON); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "planset-out")]
    output: PathBuf,

    /// Comma-separated formats (cad, bim, page, raster); overrides the config
    #[arg(short, long, value_delimiter = ',', value_parser = parse_format)]
    formats: Vec<ExportFormat>,

    /// RNG seed; overrides the config
    #[arg(short, long)]
    seed: Option<u64>,

    /// Project id used for file names and revision ids
    #[arg(long, default_value = "project")]
    project: String,

    /// Also write a .tar.gz bundle of the whole revision
    #[arg(long)]
    bundle: bool,
}

fn parse_format(s: &str) -> Result<ExportFormat, String> {
    ExportFormat::parse(s).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Parse { input } => parse(&input),
        Commands::Generate { input, options } => load_requirements(&input).and_then(|req| generate(&req, &options)),
        Commands::Demo { options } => generate(&RequirementsInput::Text(DEMO_PROGRAM.to_string()), &options),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(code = e.error_code(), "{}", e);
            if let Ok(json) = serde_json::to_string_pretty(&e) {
                eprintln!("{}", json);
            }
            ExitCode::FAILURE
        }
    }
}

fn parse(input: &Path) -> CdResult<ExitCode> {
    let program = interpret(&load_requirements(input)?)?;
    println!("{}", serde_json::to_string_pretty(&program)?);
    Ok(ExitCode::SUCCESS)
}

fn build_config(options: &RunOptions) -> CdResult<GenerationConfig> {
    let mut config = match &options.config {
        Some(path) => load_config(path)?,
        None => GenerationConfig::default(),
    };
    if !options.formats.is_empty() {
        config = config.with_formats(&options.formats);
    }
    if let Some(seed) = options.seed {
        config.seed = seed;
    }
    config.validate()?;
    Ok(config)
}

fn generate(input: &RequirementsInput, options: &RunOptions) -> CdResult<ExitCode> {
    let config = build_config(options)?;
    let run = run_pipeline(&options.project, input, &config, None)?;

    let lock = lock_output(&options.output)?;
    let written = write_artifacts(&lock, &run.export.artifacts)?;
    for path in &written {
        info!(path = %path.display(), "wrote");
    }
    if options.bundle {
        let issues = config.include_qc.then_some(run.issues.as_slice());
        let packed = bundle::pack(&run.model, &run.export.artifacts, issues)?;
        let path = write_bundle(&lock, &packed)?;
        info!(path = %path.display(), bytes = packed.bytes.len(), "bundle written");
    }

    report(&run);
    Ok(if run.error_count() > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Lock the output directory in the name of the current OS user
fn lock_output(dir: &Path) -> CdResult<OutputLock> {
    OutputLock::acquire(dir, whoami::username())
}

fn report(run: &PipelineRun) {
    println!(
        "Revision {}  {} rooms  {} sheets  {} artifacts",
        run.model.revision_id,
        run.model.plan.rooms.len(),
        run.model.sheet_count(),
        run.export.artifacts.len()
    );
    for issue in &run.issues {
        let tag = match issue.severity {
            Severity::Error => "[ERROR]",
            Severity::Warning => "[WARN] ",
            Severity::Info => "[INFO] ",
        };
        println!("  {} {}", tag, issue);
    }
}
