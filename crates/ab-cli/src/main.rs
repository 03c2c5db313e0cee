//! addbranch CLI
//!
//! Appends model outputs stored in a prediction file as new columns of an
//! analysis skim, one column per generated branch name.

use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser};

use ab_core::ScalarType;
use ab_merge::{generate_names, run_batch, BatchReport};
use ab_store::TableFile;

mod config;

use config::RunConfig;

/// Exit status when at least one merge of the batch failed.
const EXIT_BATCH_FAILED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "addbranch")]
#[command(about = "Add prediction branches from an input table to a target table")]
#[command(version)]
pub(crate) struct Cli {
    /// Input file containing the predictions
    #[arg(short = 'i', value_name = "PATH", required_unless_present = "dry_run")]
    pub input: Option<PathBuf>,

    /// Target file receiving the new branches
    #[arg(short = 't', value_name = "PATH", required_unless_present = "dry_run")]
    pub target: Option<PathBuf>,

    /// Model name, used as base of generated branch names
    #[arg(short = 'n', value_name = "NAME", default_value = "hbtresdnn")]
    pub name: String,

    /// Text file with one branch name per line (replaces the generated names)
    #[arg(long = "branches", value_name = "PATH")]
    pub branches: Option<PathBuf>,

    /// Table name inside the input file
    #[arg(long = "input_tree", default_value = "hbtres")]
    pub input_tree: String,

    /// Table name inside the target file
    #[arg(long = "target_tree", default_value = "HTauTauTree")]
    pub target_tree: String,

    /// Multiclass model: one branch per mass, spin and class
    #[arg(
        short = 'm',
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true"
    )]
    pub multiclass: bool,

    /// Parametrized model: one branch per mass and spin
    #[arg(
        short = 'p',
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true"
    )]
    pub parametrized: bool,

    /// Match rows on (run, event, lumi) instead of row order
    #[arg(long)]
    pub keyed: bool,

    /// Run-number field (keyed mode)
    #[arg(long = "run_field", default_value = "RunNumber")]
    pub run_field: String,

    /// Event-number field (keyed mode)
    #[arg(long = "event_field", default_value = "EventNumber")]
    pub event_field: String,

    /// Lumi-block field (keyed mode)
    #[arg(long = "lumi_field", default_value = "lumi")]
    pub lumi_field: String,

    /// Type of the new branches (f32, f64, i32, i64, u32, u64)
    #[arg(long = "value_type", default_value = "f32")]
    pub value_type: ScalarType,

    /// Prefix prepended to every new branch name in the target
    #[arg(long = "target_prefix", default_value = "")]
    pub target_prefix: String,

    /// YAML file overriding the mass/spin/class grid
    #[arg(long, value_name = "PATH")]
    pub grid: Option<PathBuf>,

    /// Commit the target after every branch instead of once at the end
    #[arg(long = "commit_each")]
    pub commit_each: bool,

    /// Print the branch names and exit without opening any table
    #[arg(long = "dry_run")]
    pub dry_run: bool,

    /// Write the batch report (pretty JSON) to this file
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long = "log_level", default_value = "info")]
    pub log_level: tracing::Level,
}

fn main() -> ExitCode {
    let args: Vec<OsString> = std::env::args_os().collect();

    // Help short-circuits everything, wherever it appears.
    if args.iter().skip(1).any(|a| a == "-h" || a == "--help") {
        let _ = Cli::command().print_help();
        println!();
        return ExitCode::from(1);
    }

    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(e) if e.kind() == ErrorKind::DisplayVersion => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = RunConfig::from_cli(cli)?;
    config.log();

    if config.dry_run {
        return cmd_list_names(&config);
    }

    let report = cmd_merge(&config)?;

    if let Some(path) = &config.report {
        write_report(path, &report)?;
    }

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        for failed in &report.failed {
            eprintln!("failed: {}: {}", failed.name, failed.error);
        }
        Ok(ExitCode::from(EXIT_BATCH_FAILED))
    }
}

fn cmd_list_names(config: &RunConfig) -> Result<ExitCode> {
    for name in generate_names(&config.base_name, &config.names)? {
        println!("{}", config.merge.target_column(&name?));
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_merge(config: &RunConfig) -> Result<BatchReport> {
    // Resolve names before touching any table so configuration errors do no I/O.
    let names = generate_names(&config.base_name, &config.names)?;

    let source = TableFile::open_for_read(&config.input)
        .and_then(|f| f.table(&config.input_tree))
        .with_context(|| format!("failed to open input table '{}'", config.input_tree))?;

    let mut target = TableFile::open_for_update(&config.target)
        .and_then(|f| f.table(&config.target_tree))
        .with_context(|| format!("failed to open target table '{}'", config.target_tree))?;

    let report = run_batch(&mut target, &source, names, &config.merge)
        .with_context(|| format!("merge into {} aborted", config.target.display()))?;

    eprintln!(
        "Added {} branches to {} ({} failed{})",
        report.merged.len(),
        config.target.display(),
        report.failed.len(),
        if !report.unmatched.is_empty() {
            format!(", {} rows without a source key", report.unmatched.len())
        } else {
            String::new()
        },
    );
    Ok(report)
}

fn write_report(path: &std::path::Path, report: &BatchReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write report {}", path.display()))?;
    Ok(())
}
