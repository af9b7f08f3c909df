//! hdlcov CLI library
//!
//! Command-line interface for resolving HDL module closures and collecting
//! Verilator coverage in a sandbox.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod handlers;
mod output;

pub use commands::{
    BatchArgs, CheckArgs, Cli, ClosureArgs, ColorArg, Commands, ConfigArgs, DedupArg, FormatArg,
    ParseArgs, ResolveArgs, RunArgs,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, ProgressReporter};
