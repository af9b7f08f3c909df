//! Sandbox bootstrap command handler

use super::{load_sandbox_config, runtime};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use hdlcov::{Outcome, SandboxRunner};

/// Execute the init-env command
pub fn execute_init_env(config: &CliConfig) -> CliResult<()> {
    let reporter = ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
    let runner = SandboxRunner::new(load_sandbox_config(config)?)?;

    if config.verbosity.is_verbose() {
        if let Ok(line) = runner.init_command_line() {
            reporter.info(&format!("Running: {line}"));
        }
    }

    let outcome = runtime()?.block_on(runner.init_environment())?;
    match &outcome {
        Outcome::Skipped => {
            reporter.info("Host isolation configured; no container to create");
            Ok(())
        }
        done if done.is_success() => {
            reporter.success(&format!(
                "Created sandbox container {}",
                runner.config().image_name
            ));
            Ok(())
        }
        Outcome::Completed { stderr, .. } if !stderr.trim().is_empty() => Err(
            CliError::run_failed(format!("{outcome}: {}", stderr.trim())),
        ),
        other => Err(CliError::run_failed(other.to_string())),
    }
}
