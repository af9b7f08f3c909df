//! Run command handler.
//!
//! Orchestrates: load dataset -> resolve -> sandbox run -> parse coverage.

use super::{load_sandbox_config, load_store, runtime};
use crate::commands::RunArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, ProgressReporter};
use hdlcov::{
    parse_coverage_log, resolve, to_pretty_json, CoverageSummary, ModuleId, Outcome, RunReport,
    SandboxConfig, SandboxRunner,
};
use serde::Serialize;

/// Result of a single run, as printed by the command
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Modules in the closure
    pub modules: usize,
    /// Code units written to the source file
    pub code_units: usize,
    /// References skipped during resolution
    pub skipped_modules: Vec<ModuleId>,
    /// Sandbox run
    pub run: RunReport,
    /// Parsed coverage counters, when a log was produced
    pub coverage: Option<Vec<i64>>,
    /// Summary of the counters
    pub coverage_summary: Option<CoverageSummary>,
}

/// Apply command-line overrides on top of the loaded configuration
#[must_use]
pub fn apply_overrides(sandbox: SandboxConfig, timeout: Option<u64>, force: bool) -> SandboxConfig {
    let sandbox = match timeout {
        Some(seconds) => sandbox.with_timeout_seconds(seconds),
        None => sandbox,
    };
    if force {
        sandbox.with_force_rerun(true)
    } else {
        sandbox
    }
}

/// Render a run summary as text
#[must_use]
pub fn render_text(summary: &RunSummary) -> String {
    let mut out = format!(
        "workdir: {}\noutcome: {}\nduration: {}ms\nmodules: {} ({} code units, {} skipped)\n",
        summary.run.workdir.display(),
        summary.run.outcome,
        summary.run.duration_ms,
        summary.modules,
        summary.code_units,
        summary.skipped_modules.len()
    );
    if let Some(ref s) = summary.coverage_summary {
        out.push_str(&format!(
            "coverage: {} points, {} hit, {} missed ({:.1}%)\n",
            s.points,
            s.hit,
            s.missed,
            s.hit_ratio() * 100.0
        ));
    }
    out
}

/// Execute the run command
pub fn execute_run(config: &CliConfig, args: &RunArgs) -> CliResult<()> {
    let reporter = ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
    let store = load_store(&args.dataset)?;
    let resolution = resolve(
        &store,
        args.roots.iter().map(|root| store.id_for(root)),
        args.closure.options(),
    )?;
    if resolution.is_empty() {
        return Err(CliError::invalid_argument(format!(
            "None of the roots resolved: {}",
            args.roots.join(", ")
        )));
    }

    let sandbox = apply_overrides(load_sandbox_config(config)?, args.timeout, args.force);
    let runner = SandboxRunner::new(sandbox)?;

    if config.verbosity.is_verbose() {
        reporter.info(&format!(
            "Running {} code units in {}",
            resolution.len(),
            args.workdir.display()
        ));
    }

    let run = runtime()?.block_on(runner.run(&resolution.code_units, &args.workdir));

    let coverage = match runner.coverage_log_path(&args.workdir) {
        Some(log) if log.is_file() => Some(parse_coverage_log(&log)?),
        _ => None,
    };
    let summary = RunSummary {
        modules: resolution.resolved.len(),
        code_units: resolution.len(),
        skipped_modules: resolution.skipped,
        coverage_summary: coverage.as_deref().map(CoverageSummary::from_counters),
        coverage,
        run,
    };

    match OutputFormat::from(args.format) {
        OutputFormat::Json => println!("{}", to_pretty_json(&summary)?),
        OutputFormat::Text => print!("{}", render_text(&summary)),
    }

    match &summary.run.outcome {
        Outcome::Skipped => {
            reporter.warning("Workdir already exists; pass --force to rerun");
            Ok(())
        }
        outcome if outcome.is_success() => Ok(()),
        outcome => Err(CliError::run_failed(outcome.to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn summary(outcome: Outcome, coverage: Option<Vec<i64>>) -> RunSummary {
        RunSummary {
            modules: 3,
            code_units: 2,
            skipped_modules: vec!["ghost".into()],
            run: RunReport {
                workdir: PathBuf::from("/tmp/unit"),
                outcome,
                duration_ms: 42,
            },
            coverage_summary: coverage.as_deref().map(CoverageSummary::from_counters),
            coverage,
        }
    }

    #[test]
    fn test_apply_overrides() {
        let sandbox = apply_overrides(SandboxConfig::default(), Some(5), true);
        assert_eq!(sandbox.timeout_seconds, 5);
        assert!(sandbox.force_rerun);

        let sandbox = apply_overrides(SandboxConfig::default(), None, false);
        assert_eq!(sandbox, SandboxConfig::default());
    }

    #[test]
    fn test_render_text_with_coverage() {
        let text = render_text(&summary(
            Outcome::Completed {
                exit_code: Some(0),
                success: true,
                stdout: String::new(),
                stderr: String::new(),
            },
            Some(vec![1, 0, 3, 0]),
        ));
        assert!(text.contains("workdir: /tmp/unit"));
        assert!(text.contains("completed (exit code 0)"));
        assert!(text.contains("3 (2 code units, 1 skipped)"));
        assert!(text.contains("4 points, 2 hit, 2 missed (50.0%)"));
    }

    #[test]
    fn test_render_text_timeout() {
        let text = render_text(&summary(Outcome::TimedOut { timeout_ms: 9000 }, None));
        assert!(text.contains("timed out after 9s"));
        assert!(!text.contains("coverage:"));
    }

    #[test]
    fn test_summary_json_shape() {
        let json = to_pretty_json(&summary(Outcome::Skipped, None)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["run"]["outcome"]["status"], "skipped");
        assert_eq!(value["skipped_modules"][0], "ghost");
        assert!(value["coverage"].is_null());
    }
}
