//! Labelvault: dataset format detection and incremental persistence.
//!
//! Labelvault recognizes which labeled-dataset format a directory tree is
//! in, loads it into a uniform in-memory model, and saves it back. Saving to
//! the store a dataset was loaded from rewrites only the subsets that
//! changed.
//!
//! # Modules
//!
//! - [`detect`]: Parallel format detection with confidence ranking
//! - [`dataset`]: Dataset model with per-subset change tracking
//! - [`format`]: Format plugin contracts and the bundled formats
//! - [`env`]: The format registry
//! - [`transform`]: Whole-dataset transforms
//! - [`compare`]: Dataset comparison
//! - [`error`]: Error types for labelvault operations

pub mod compare;
pub mod dataset;
pub mod detect;
pub mod env;
pub mod error;
pub mod format;
pub mod transform;

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

pub use dataset::Dataset;
pub use env::Environment;
pub use error::{ImportError, LabelvaultError};

/// The labelvault CLI application.
#[derive(Parser)]
#[command(name = "labelvault")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Detect the format of a dataset directory.
    Detect(DetectArgs),
    /// Convert a dataset from one format to another.
    Convert(ConvertArgs),
    /// Show a summary of a dataset.
    Info(InfoArgs),
    /// Compare two datasets.
    Compare(CompareArgs),
}

#[derive(clap::Args)]
struct DetectArgs {
    /// Dataset root directory.
    path: PathBuf,

    /// How many directory levels below the root to search.
    #[arg(long, env = "LABELVAULT_DETECT_DEPTH", default_value_t = detect::DEFAULT_DETECT_DEPTH)]
    depth: usize,

    /// List every rejected format with the reason.
    #[arg(long)]
    show_rejections: bool,

    /// Write the full detection report as JSON to this file.
    #[arg(long, value_name = "FILE")]
    json_report: Option<PathBuf>,
}

#[derive(clap::Args)]
struct ConvertArgs {
    /// Source dataset directory.
    input: PathBuf,

    /// Target directory.
    output: PathBuf,

    /// Source format (detected when omitted).
    #[arg(long)]
    from: Option<String>,

    /// Target format.
    #[arg(long, default_value = format::native::FORMAT_NAME)]
    to: String,

    /// Copy media files into the target.
    #[arg(long)]
    save_media: bool,

    /// Write annotation containers chunk by chunk.
    #[arg(long)]
    stream: bool,
}

#[derive(clap::Args)]
struct InfoArgs {
    /// Dataset directory.
    path: PathBuf,

    /// Dataset format (detected when omitted).
    #[arg(long)]
    format: Option<String>,
}

#[derive(clap::Args)]
struct CompareArgs {
    /// First dataset directory.
    a: PathBuf,

    /// Second dataset directory.
    b: PathBuf,

    /// Format of both datasets (detected when omitted).
    #[arg(long)]
    format: Option<String>,

    /// Also compare media file contents.
    #[arg(long)]
    media: bool,

    /// List the items behind the counts.
    #[arg(long)]
    detail: bool,

    /// Output format for the report ('text' or 'json').
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    output: String,
}

/// Run the labelvault CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), LabelvaultError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let env = Environment::with_builtin_formats();
    match cli.command {
        Some(Commands::Detect(args)) => run_detect(&env, args),
        Some(Commands::Convert(args)) => run_convert(&env, args),
        Some(Commands::Info(args)) => run_info(&env, args),
        Some(Commands::Compare(args)) => run_compare(&env, args),
        None => {
            println!("labelvault {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Dataset format detection and incremental persistence.");
            println!();
            println!("Run 'labelvault --help' for usage information.");
            Ok(())
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second initialization (e.g. in tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run_detect(env: &Environment, args: DetectArgs) -> Result<(), LabelvaultError> {
    let options = detect::DetectOptions {
        depth: args.depth,
        report_all_rejections: args.show_rejections || args.json_report.is_some(),
    };
    let report = env.detect(&args.path, &options)?;

    print!("{}", report);
    if args.show_rejections {
        print!("{}", report.rejections());
    }

    if let Some(path) = args.json_report {
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, &report)
            .map_err(|source| LabelvaultError::ReportWrite { path, source })?;
    }
    Ok(())
}

fn run_convert(env: &Environment, args: ConvertArgs) -> Result<(), LabelvaultError> {
    let mut dataset = Dataset::import_from(
        env,
        &args.input,
        args.from.as_deref(),
        &format::ImportOptions::default(),
    )?;
    let source_format = dataset
        .source()
        .map(|source| source.format.clone())
        .unwrap_or_default();

    let options = format::ExportOptions {
        save_media: args.save_media,
        stream: args.stream,
        ..Default::default()
    };
    let stats = dataset.export(env, &args.output, &args.to, &options)?;

    println!(
        "Converted {} item(s) from {} to {}: {} container(s) written, {} media file(s) copied, {} linked",
        dataset.len(),
        source_format,
        args.to,
        stats.containers_written,
        stats.media_copied,
        stats.media_linked
    );
    Ok(())
}

fn run_info(env: &Environment, args: InfoArgs) -> Result<(), LabelvaultError> {
    let dataset = Dataset::import_from(
        env,
        &args.path,
        args.format.as_deref(),
        &format::ImportOptions::default(),
    )?;

    if let Some(source) = dataset.source() {
        println!("Format:      {}", source.format);
    }
    println!("Items:       {}", dataset.len());
    println!("Media type:  {:?}", dataset.media_type());
    println!("Categories:  {}", dataset.categories().len());
    println!("Subsets:");
    for subset in dataset.subsets() {
        println!("  - {}: {} item(s)", subset, dataset.subset_len(&subset));
    }
    Ok(())
}

fn run_compare(env: &Environment, args: CompareArgs) -> Result<(), LabelvaultError> {
    let import = |path: &PathBuf| {
        Dataset::import_from(
            env,
            path,
            args.format.as_deref(),
            &format::ImportOptions::default(),
        )
    };
    let a = import(&args.a)?;
    let b = import(&args.b)?;

    let options = compare::CompareOptions {
        compare_media: args.media,
        detail: args.detail,
        ..Default::default()
    };
    let report = compare::compare_datasets(&a, &b, &options);

    if args.output == "json" {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|err| LabelvaultError::Io(err.into()))?;
        println!("{json}");
    } else {
        print!("{}", report);
    }
    Ok(())
}
