//! Resolve command handler.
//!
//! Orchestrates: load dataset -> compute closure -> print or write source.

use super::load_store;
use crate::commands::ResolveArgs;
use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::{OutputFormat, ProgressReporter};
use hdlcov::{resolve, to_pretty_json, Resolution};

/// Render a resolution for stdout
pub fn render_resolution(resolution: &Resolution, format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Json => Ok(to_pretty_json(resolution)?),
        OutputFormat::Text => Ok(resolution.flatten()),
    }
}

/// Execute the resolve command
pub fn execute_resolve(config: &CliConfig, args: &ResolveArgs) -> CliResult<()> {
    let reporter = ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
    let store = load_store(&args.dataset)?;
    let resolution = resolve(
        &store,
        args.roots.iter().map(|root| store.id_for(root)),
        args.closure.options(),
    )?;

    for id in &resolution.skipped {
        reporter.warning(&format!("Skipped unresolved module {id}"));
    }

    if let Some(ref output) = args.output {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output, resolution.flatten())?;
        reporter.success(&format!(
            "Wrote {} code units from {} modules to {}",
            resolution.len(),
            resolution.resolved.len(),
            output.display()
        ));
        return Ok(());
    }

    println!("{}", render_resolution(&resolution, args.format.into())?);
    Ok(())
}
