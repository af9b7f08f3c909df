//! Coverage log command handler

use crate::commands::ParseArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;
use hdlcov::{parse_coverage_log, to_pretty_json, CoverageSummary};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ParsedLog<'a> {
    counters: &'a [i64],
    summary: CoverageSummary,
}

/// Render counters one per line, or as JSON with a summary
pub fn render_counters(counters: &[i64], format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Text => Ok(counters
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join("\n")),
        OutputFormat::Json => Ok(to_pretty_json(&ParsedLog {
            counters,
            summary: CoverageSummary::from_counters(counters),
        })?),
    }
}

/// Execute the parse command
pub fn execute_parse(config: &CliConfig, args: &ParseArgs) -> CliResult<()> {
    if !args.log.exists() {
        return Err(CliError::invalid_argument(format!(
            "Coverage log not found: {}",
            args.log.display()
        )));
    }
    let counters = parse_coverage_log(&args.log)?;
    if config.verbosity.is_verbose() {
        eprintln!("Parsed {} counters from {}", counters.len(), args.log.display());
    }
    let rendered = render_counters(&counters, args.format.into())?;
    if !rendered.is_empty() {
        println!("{rendered}");
    }
    Ok(())
}
