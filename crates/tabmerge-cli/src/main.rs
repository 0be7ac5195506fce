//! tabmerge CLI
//!
//! Command-line tool for merging CSV files into one.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tabmerge_core::progress::display_name;
use tabmerge_core::{
    collect_inputs, read_first_row, Error, HeaderConflict, HeaderPolicy, MergeEvent,
    MergeOptions, MergePipeline, MergeRequest, RunState,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tabmerge")]
#[command(about = "Merge CSV files into one, in order", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge files and directories into a single output next to the first input
    Merge {
        /// Files or directories, in merge order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Options file (JSON), see `init-config`
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        overrides: OptionOverrides,

        /// What to do when a file's first row differs from the first file's
        #[arg(long, value_enum, default_value_t = OnConflict::Ask)]
        on_conflict: OnConflict,

        /// Write a JSON run report to this path
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Write the default options to a JSON file
    InitConfig {
        /// Output path for the options file
        file: PathBuf,
    },

    /// Print the first row of each input
    FirstRows {
        /// Files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Cell delimiter
        #[arg(short, long, default_value_t = ',')]
        delimiter: char,
    },
}

/// Flags that take precedence over the options file
#[derive(Args, Debug, Default)]
struct OptionOverrides {
    /// Keep the first row of every file instead of only the first file's
    #[arg(long)]
    keep_all_first_rows: bool,

    /// Read files larger than this many bytes in batches
    #[arg(long, value_name = "BYTES")]
    chunk_threshold: Option<u64>,

    /// Rows per batch when reading in batches
    #[arg(long, value_name = "ROWS")]
    batch_rows: Option<usize>,

    /// Base name of the merged file, without extension
    #[arg(long, value_name = "NAME")]
    output_name: Option<String>,

    /// Cell delimiter for input and output
    #[arg(short, long)]
    delimiter: Option<char>,
}

impl OptionOverrides {
    fn apply(&self, options: &mut MergeOptions) {
        if self.keep_all_first_rows {
            options.header_policy = HeaderPolicy::KeepAllFirstRows;
        }
        if let Some(bytes) = self.chunk_threshold {
            options.chunk_threshold_bytes = bytes;
        }
        if let Some(rows) = self.batch_rows {
            options.batch_rows = rows;
        }
        if let Some(name) = &self.output_name {
            options.output_base_name = name.clone();
        }
        if let Some(delimiter) = self.delimiter {
            options.delimiter = delimiter;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OnConflict {
    /// Prompt on stdin
    Ask,
    /// Merge anyway
    Continue,
    /// Stop without writing anything
    Abort,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::Cancelled) => {
            eprintln!("Merge cancelled, no output written");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr; `RUST_LOG` overrides the verbosity flag
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(command: Commands) -> tabmerge_core::Result<()> {
    match command {
        Commands::Merge {
            inputs,
            config,
            overrides,
            on_conflict,
            report,
        } => cmd_merge(
            &inputs,
            config.as_deref(),
            &overrides,
            on_conflict,
            report.as_deref(),
        ),
        Commands::InitConfig { file } => cmd_init_config(&file),
        Commands::FirstRows { inputs, delimiter } => cmd_first_rows(&inputs, delimiter),
    }
}

fn cmd_merge(
    inputs: &[PathBuf],
    config: Option<&Path>,
    overrides: &OptionOverrides,
    on_conflict: OnConflict,
    report_path: Option<&Path>,
) -> tabmerge_core::Result<()> {
    let mut options = match config {
        Some(path) => MergeOptions::load(path)?,
        None => MergeOptions::default(),
    };
    overrides.apply(&mut options);

    let files = collect_inputs(inputs)?;
    if files.is_empty() {
        return Err(Error::NoInputs);
    }
    debug!(?files, "collected inputs");
    eprintln!(
        "Merging {} file(s), header policy: {}",
        files.len(),
        options.header_policy
    );

    let handle = MergePipeline::spawn(MergeRequest::new(files, options))?;
    let mut state = RunState::default();

    for event in handle.events().iter() {
        state.apply(&event);
        match &event {
            MergeEvent::Progress { .. } | MergeEvent::Memory(_) => render_status(&state),
            MergeEvent::FileSkipped { path, message } => {
                eprintln!("Warning: skipped {}: {}", display_name(path), message)
            }
            MergeEvent::Conflict(conflict) => {
                let proceed = decide_conflict(conflict, on_conflict)?;
                handle.resolve_conflict(proceed);
                state.conflict_answered();
            }
            MergeEvent::Completed { output_path } => {
                println!("{}", output_path.display());
            }
            MergeEvent::Cancelled | MergeEvent::Failed { .. } => {}
        }
    }

    let report = handle.join()?;
    if let Some(path) = report_path {
        report.save(path)?;
        eprintln!("Report written to {}", path.display());
    }
    eprintln!(
        "Merged {} rows from {} file(s), {} skipped, in {:.1}s",
        report.rows_written,
        report.files_merged,
        report.skipped_files.len(),
        report.duration().num_milliseconds() as f64 / 1000.0
    );

    Ok(())
}

fn render_status(state: &RunState) {
    match (state.memory_usage_bytes, state.memory_tier) {
        (Some(bytes), Some(tier)) => eprintln!(
            "[{:>3}%] memory {:.2} GB ({})",
            state.progress_percent,
            bytes as f64 / (1024.0 * 1024.0 * 1024.0),
            tier
        ),
        _ => eprintln!("[{:>3}%]", state.progress_percent),
    }
}

fn decide_conflict(conflict: &HeaderConflict, on_conflict: OnConflict) -> tabmerge_core::Result<bool> {
    eprintln!("Warning: {}", conflict.message());
    match on_conflict {
        OnConflict::Continue => Ok(true),
        OnConflict::Abort => Ok(false),
        OnConflict::Ask => {
            eprint!("Continue merging? [y/N] ");
            io::stderr().flush()?;
            let mut answer = String::new();
            io::stdin().lock().read_line(&mut answer)?;
            Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
        }
    }
}

fn cmd_init_config(file: &Path) -> tabmerge_core::Result<()> {
    MergeOptions::default().save(file)?;
    println!("Created options file: {}", file.display());
    println!();
    println!("Edit the file, then run:");
    println!("  tabmerge merge --config {} <inputs>...", file.display());

    Ok(())
}

fn cmd_first_rows(inputs: &[PathBuf], delimiter: char) -> tabmerge_core::Result<()> {
    let files = collect_inputs(inputs)?;
    let mut options = MergeOptions::default();
    options.delimiter = delimiter;
    let delimiter = options.delimiter_byte();

    let mut reference = None;
    for (i, path) in files.iter().enumerate() {
        match read_first_row(path, delimiter) {
            Ok(Some(row)) => {
                let marker = match &reference {
                    None => "",
                    Some(first) if *first == row => "",
                    Some(_) => "  <-- differs",
                };
                println!("{}. {}: {}{}", i + 1, display_name(path), row, marker);
                if i == 0 {
                    reference = Some(row);
                }
            }
            Ok(None) => println!("{}. {}: (empty)", i + 1, display_name(path)),
            Err(e) => println!("{}. {}: error: {}", i + 1, display_name(path), e),
        }
    }

    Ok(())
}
