//! Batch command handler.
//!
//! Orchestrates: load dataset -> build job list -> worker pool -> summary JSON.
//! Unit failures are recorded in the report and never fail the command.

use super::{load_sandbox_config, load_store, runtime};
use crate::commands::BatchArgs;
use crate::config::CliConfig;
use crate::error::CliResult;
use crate::handlers::run::apply_overrides;
use crate::output::ProgressReporter;
use hdlcov::{
    jobs_per_module, load_jobs, BatchConfig, BatchDriver, Job, ModuleStore, SandboxRunner,
    UnitReport, UnitStatus,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default summary file name inside the output directory
pub const SUMMARY_FILE: &str = "summary.json";

/// Jobs from `--jobs-file`, or one job per dataset module
pub fn collect_jobs(store: &ModuleStore, jobs_file: Option<&Path>) -> CliResult<Vec<Job>> {
    match jobs_file {
        Some(path) => Ok(load_jobs(path)?),
        None => Ok(jobs_per_module(store)),
    }
}

/// Where the summary report is written
#[must_use]
pub fn summary_path(args: &BatchArgs) -> PathBuf {
    args.summary
        .clone()
        .unwrap_or_else(|| args.out_dir.join(SUMMARY_FILE))
}

/// One-line description of a finished unit
#[must_use]
pub fn describe_unit(unit: &UnitReport) -> String {
    let mut line = format!("{} [{}]", unit.name, unit.status);
    if let Some(ref summary) = unit.coverage_summary {
        line.push_str(&format!(" {}/{} points hit", summary.hit, summary.points));
    }
    if let Some(ref error) = unit.error {
        line.push_str(&format!(": {error}"));
    }
    line
}

/// Execute the batch command
pub fn execute_batch(config: &CliConfig, args: &BatchArgs) -> CliResult<()> {
    let mut reporter =
        ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
    let store = load_store(&args.dataset)?;
    let jobs = collect_jobs(&store, args.jobs_file.as_deref())?;

    let sandbox = apply_overrides(load_sandbox_config(config)?, args.timeout, args.force);
    let runner = SandboxRunner::new(sandbox)?;
    let batch_config = BatchConfig::new(&args.out_dir)
        .with_jobs(args.jobs)
        .with_resolve_options(args.closure.options());
    let driver = BatchDriver::new(Arc::new(store), Arc::new(runner), batch_config);

    reporter.header("Batch");
    reporter.info(&format!(
        "{} units, {} workers, output in {}",
        jobs.len(),
        driver.config().jobs,
        args.out_dir.display()
    ));
    reporter.start_progress(jobs.len() as u64, "units");

    let verbose = config.verbosity.is_verbose();
    let report = runtime()?.block_on(driver.run(jobs, |unit| {
        reporter.increment(1);
        reporter.set_message(&unit.name);
        match unit.status {
            UnitStatus::Succeeded | UnitStatus::Skipped if verbose => {
                reporter.success(&describe_unit(unit));
            }
            UnitStatus::Succeeded | UnitStatus::Skipped => {}
            UnitStatus::Unresolved => reporter.warning(&describe_unit(unit)),
            UnitStatus::Failed | UnitStatus::TimedOut => reporter.failure(&describe_unit(unit)),
        }
    }));
    reporter.finish();

    let path = summary_path(args);
    report.write(&path)?;
    reporter.summary(&report);
    reporter.info(&format!("Summary written to {}", path.display()));
    Ok(())
}
