use crate::constants::*;
use anyhow::{anyhow, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use env_logger::fmt::Color;
use log::{Level, LevelFilter};
use once_cell::sync::Lazy;
use std::{
    io::Write,
    path::{Path, PathBuf},
};

/// Full version string including the crate version and git description.
///
/// # Examples
/// * `0.1.0-1ba958a-dirty` - while on a dirty branch
/// * `0.1.0-1ba958a` - with a fresh commit
pub static FULL_VERSION: Lazy<String> = Lazy::new(|| {
    let git_describe = env!("VERGEN_GIT_DESCRIBE");
    if git_describe.is_empty() {
        env!("CARGO_PKG_VERSION").to_string()
    } else {
        format!("{}-{}", env!("CARGO_PKG_VERSION"), git_describe)
    }
});

#[derive(Parser, Debug)]
#[command(name="varanno",
          version=&**FULL_VERSION,
          about="Variant annotation from tabix-indexed reference data sets",
          long_about = None,
          help_template = "{name} {version}\n{about-section}\n{usage-heading}\n    {usage}\n\n{all-args}{after-help}",
          )]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Specify multiple times to increase verbosity level (e.g., -vv for more verbosity)
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true
    )]
    pub verbosity: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Annotate variants with the sources listed in a configuration file
    Annotate(AnnotateArgs),
    /// Apply the default filter to an annotated stream
    Filter(FilterArgs),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Annotate(_) => "annotate",
            Command::Filter(_) => "filter",
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Keep passing, high or moderate impact, rare variants
    Default,
    /// Keep every variant
    None,
}

/// Analyses over the trios declared in `##PEDIGREE` header lines.
#[derive(Args, Debug, Clone, Default)]
pub struct TrioArgs {
    /// Annotate Mendelian-constraint likelihood ratios (MVCLR, MENDELLR, UNCGT, CONGT)
    #[arg(long = "mendelian", help_heading = "Trio analysis")]
    pub mendelian: bool,

    /// Flag compound-heterozygous hits per gene for the first trio (COMPOUND, MendHetRec)
    #[arg(long = "compound-het", help_heading = "Trio analysis")]
    pub compound_het: bool,
}

#[derive(Parser, Debug, Clone)]
#[command(arg_required_else_help(true))]
pub struct AnnotateArgs {
    /// JSON file listing the annotators
    #[arg(
        short = 'c',
        long = "config",
        value_name = "CONFIG",
        value_parser = check_file_exists
    )]
    pub config: PathBuf,

    /// VCF to annotate, plain or gzipped [default: standard input]
    #[arg(
        short = 'i',
        long = "input",
        value_name = "VCF",
        value_parser = check_input_path
    )]
    pub input: Option<PathBuf>,

    /// Write output to a file, BGZF-compressed for .gz/.bgz [default: standard output]
    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        value_parser = check_prefix_path
    )]
    pub output: Option<PathBuf>,

    /// Filter applied after annotation
    #[arg(long = "filter", value_enum, default_value_t = FilterMode::None)]
    pub filter: FilterMode,

    /// Number of threads to use
    #[arg(
        short = '@',
        value_name = "THREADS",
        default_value = "1",
        value_parser = threads_in_range
    )]
    pub num_threads: usize,

    /// Variants per annotation batch
    #[arg(
        long = "batch-size",
        value_name = "N",
        default_value_t = DEFAULT_BATCH_SIZE,
        value_parser = batch_size_in_range,
        help_heading = "Advanced"
    )]
    pub batch_size: usize,

    /// Batches buffered between the reader and the annotators
    #[arg(
        long = "queue-capacity",
        value_name = "N",
        default_value_t = DEFAULT_QUEUE_CAPACITY,
        value_parser = batch_size_in_range,
        help_heading = "Advanced"
    )]
    pub queue_capacity: usize,

    /// Tabix-index a BGZF output; the input must be coordinate-sorted
    #[arg(long = "write-index", help_heading = "Advanced")]
    pub write_index: bool,

    /// Print only the output header and exit
    #[arg(long = "print-header", help_heading = "Advanced")]
    pub print_header: bool,

    #[command(flatten)]
    pub trio: TrioArgs,

    /// Do not append version and command line to the header
    #[arg(long = "no-version", help_heading = "Advanced")]
    pub no_version: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct FilterArgs {
    /// Annotated VCF, plain or gzipped [default: standard input]
    #[arg(
        short = 'i',
        long = "input",
        value_name = "VCF",
        value_parser = check_input_path
    )]
    pub input: Option<PathBuf>,

    /// Write output to a file, BGZF-compressed for .gz/.bgz [default: standard output]
    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        value_parser = check_prefix_path
    )]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub trio: TrioArgs,

    /// Do not append version and command line to the header
    #[arg(long = "no-version", help_heading = "Advanced")]
    pub no_version: bool,
}

/// Initializes the verbosity level for logging based on the command-line arguments.
///
/// Sets up the logger with a specific verbosity level that is determined
/// by the number of occurrences of the `-v` or `--verbose` flag in the command-line arguments.
pub fn init_verbose(args: &Cli) {
    let filter_level: LevelFilter = match args.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            let level = record.level();
            let mut style = buf.style();
            match record.level() {
                Level::Error => style.set_color(Color::Red),
                Level::Warn => style.set_color(Color::Yellow),
                Level::Info => style.set_color(Color::Green),
                Level::Debug => style.set_color(Color::Blue),
                Level::Trace => style.set_color(Color::Cyan),
            };

            writeln!(
                buf,
                "{} [{}] {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                style.value(level),
                record.module_path().unwrap_or("unknown_module"),
                record.args()
            )
        })
        .filter_level(filter_level)
        .init();
}

/// Validates that the provided string represents a valid number of threads.
fn threads_in_range(s: &str) -> Result<usize> {
    let thread: usize = s
        .parse::<usize>()
        .map_err(|_| anyhow!("`{}` is not a valid thread number", s))?;
    if thread == 0 {
        return Err(anyhow!("Number of threads must be >= 1"));
    }
    Ok(thread)
}

fn batch_size_in_range(s: &str) -> Result<usize> {
    let size: usize = s
        .parse::<usize>()
        .map_err(|_| anyhow!("`{}` is not a valid size", s))?;
    if size == 0 {
        return Err(anyhow!("Size must be >= 1"));
    }
    Ok(size)
}

/// Checks if the provided file path exists.
fn check_file_exists(s: &str) -> Result<PathBuf> {
    let path = Path::new(s);
    if !path.exists() {
        return Err(anyhow!("File does not exist: {}", path.display()));
    }
    Ok(path.to_path_buf())
}

/// Like `check_file_exists`, but `-` names standard input.
fn check_input_path(s: &str) -> Result<PathBuf> {
    if s == "-" {
        return Ok(PathBuf::from(s));
    }
    check_file_exists(s)
}

fn check_prefix_path(s: &str) -> Result<PathBuf> {
    let path = Path::new(s);
    if let Some(parent_dir) = path.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            return Err(anyhow!("Path does not exist: {}", parent_dir.display()));
        }
    }
    Ok(path.to_path_buf())
}
