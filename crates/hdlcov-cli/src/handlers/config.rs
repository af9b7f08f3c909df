//! Sandbox configuration command handler

use crate::commands::ConfigArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use hdlcov::SandboxConfig;
use std::path::Path;

/// Load the sandbox configuration named by `--config`, or the defaults
pub fn load_sandbox_config(config: &CliConfig) -> CliResult<SandboxConfig> {
    let Some(ref file) = config.sandbox_config else {
        return Ok(SandboxConfig::default());
    };
    let path = Path::new(file);
    if !path.exists() {
        return Err(CliError::config(format!(
            "Sandbox config file not found: {}",
            path.display()
        )));
    }
    tracing::debug!(path = %path.display(), "loading sandbox config");
    Ok(SandboxConfig::load(path)?)
}

/// Render the effective configuration as YAML
pub fn render_config(config: &CliConfig, args: &ConfigArgs) -> CliResult<String> {
    let sandbox = if args.show_default {
        SandboxConfig::default()
    } else {
        load_sandbox_config(config)?
    };
    Ok(sandbox.to_yaml()?)
}

/// Execute the config command
pub fn execute_config(config: &CliConfig, args: &ConfigArgs) -> CliResult<()> {
    let yaml = render_config(config, args)?;
    print!("{yaml}");
    Ok(())
}
