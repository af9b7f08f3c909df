//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// hdlcov: resolve HDL module closures and collect sandboxed coverage
#[derive(Parser, Debug)]
#[command(name = "hdlcov")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Sandbox configuration file (YAML)
    #[arg(long, global = true, env = "HDLCOV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the dependency closure of one or more modules
    Resolve(ResolveArgs),

    /// Resolve a closure and run it through the sandboxed toolchain
    Run(RunArgs),

    /// Run many units concurrently and write a summary report
    Batch(BatchArgs),

    /// Parse a coverage log into counters
    Parse(ParseArgs),

    /// Create the sandbox root filesystem
    InitEnv,

    /// Show the effective sandbox configuration
    Config(ConfigArgs),

    /// Check dataset integrity
    Check(CheckArgs),
}

/// Closure options shared by `resolve`, `run` and `batch`
#[derive(clap::Args, Debug, Clone)]
pub struct ClosureArgs {
    /// Abort on the first missing or ambiguous module
    #[arg(long)]
    pub fail_on_missing: bool,

    /// How code units are deduplicated
    #[arg(long, default_value = "code")]
    pub dedup: DedupArg,
}

/// Arguments for the resolve command
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Dataset file (JSON lines or a JSON array)
    #[arg(short, long)]
    pub dataset: PathBuf,

    /// Root module identifier (repeatable); a text index spelled the same
    /// wins over an integer index
    #[arg(short, long = "root", required = true)]
    pub roots: Vec<String>,

    /// Closure options
    #[command(flatten)]
    pub closure: ClosureArgs,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: FormatArg,

    /// Write the flattened source to this file instead of printing
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Dataset file (JSON lines or a JSON array)
    #[arg(short, long)]
    pub dataset: PathBuf,

    /// Root module identifier (repeatable); a text index spelled the same
    /// wins over an integer index
    #[arg(short, long = "root", required = true)]
    pub roots: Vec<String>,

    /// Scratch directory for this unit
    #[arg(short, long)]
    pub workdir: PathBuf,

    /// Closure options
    #[command(flatten)]
    pub closure: ClosureArgs,

    /// Timeout in seconds (overrides the config file)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Rerun even if the workdir already exists
    #[arg(long)]
    pub force: bool,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: FormatArg,
}

/// Arguments for the batch command
#[derive(Parser, Debug)]
pub struct BatchArgs {
    /// Dataset file (JSON lines or a JSON array)
    #[arg(short, long)]
    pub dataset: PathBuf,

    /// Job list (name + roots per record); one job per module if omitted
    #[arg(long)]
    pub jobs_file: Option<PathBuf>,

    /// Parent directory of all unit workdirs
    #[arg(short, long)]
    pub out_dir: PathBuf,

    /// Number of concurrent units (0 = auto-detect)
    #[arg(short = 'j', long, default_value = "0")]
    pub jobs: usize,

    /// Closure options
    #[command(flatten)]
    pub closure: ClosureArgs,

    /// Timeout in seconds per unit (overrides the config file)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Rerun units whose workdir already exists
    #[arg(long)]
    pub force: bool,

    /// Summary report path (defaults to <out-dir>/summary.json)
    #[arg(long)]
    pub summary: Option<PathBuf>,
}

/// Arguments for the parse command
#[derive(Parser, Debug)]
pub struct ParseArgs {
    /// Coverage log file
    pub log: PathBuf,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: FormatArg,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Ignore --config and print the built-in defaults
    #[arg(long)]
    pub show_default: bool,
}

/// Arguments for the check command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Dataset file (JSON lines or a JSON array)
    #[arg(short, long)]
    pub dataset: PathBuf,
}

/// Output format argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormatArg {
    /// Human-readable text
    #[default]
    Text,
    /// Indented JSON
    Json,
}

impl From<FormatArg> for crate::output::OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}

/// Code unit deduplication argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DedupArg {
    /// Identical source text is emitted once
    #[default]
    Code,
    /// Each module contributes its source
    Id,
}

impl From<DedupArg> for hdlcov::DedupPolicy {
    fn from(arg: DedupArg) -> Self {
        match arg {
            DedupArg::Code => Self::ByCode,
            DedupArg::Id => Self::ById,
        }
    }
}

impl ClosureArgs {
    /// Resolution options selected on the command line
    #[must_use]
    pub fn options(&self) -> hdlcov::ResolveOptions {
        hdlcov::ResolveOptions::new()
            .with_ignore_missing(!self.fail_on_missing)
            .with_dedup(self.dedup.into())
    }
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
