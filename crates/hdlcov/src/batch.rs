//! Batch driver: many independent units over one shared store.
//!
//! Each unit resolves its roots, runs the sandbox in its own workdir and
//! parses the coverage log. Units share nothing mutable; a failing, hung or
//! panicking unit is recorded in its own [`UnitReport`] and never stops its
//! siblings.

use crate::coverage::{parse_coverage_log, CoverageSummary};
use crate::dataset::{read_json_records, write_json, ModuleId};
use crate::resolver::{resolve, ResolveOptions};
use crate::result::HdlcovResult;
use crate::sandbox::{Outcome, RunReport, SandboxRunner};
use crate::store::ModuleStore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// One starting set to resolve and simulate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Unit name, also used for the workdir
    pub name: String,
    /// Root modules of the closure
    pub roots: Vec<ModuleId>,
}

impl Job {
    /// Create a job
    #[must_use]
    pub fn new(name: impl Into<String>, roots: Vec<ModuleId>) -> Self {
        Self {
            name: name.into(),
            roots,
        }
    }

    /// Job rooted at a single module, named after it
    #[must_use]
    pub fn for_module(id: &ModuleId) -> Self {
        Self::new(id.to_string(), vec![id.clone()])
    }

    /// Workdir name for this job on its own.
    ///
    /// A name made only of path-safe characters is used as is. Any other
    /// name has the unsafe characters replaced and a fingerprint of the
    /// original name appended, so `a/b` and `a_b` never share a workdir.
    #[must_use]
    pub fn workdir_name(&self) -> String {
        let safe = sanitize(&self.name);
        if safe == self.name {
            safe
        } else {
            format!("{safe}-{}", fingerprint([self.name.as_bytes()]))
        }
    }

    fn roots_fingerprint(&self) -> String {
        let keys: Vec<String> = self
            .roots
            .iter()
            .map(|root| match root {
                ModuleId::Int(n) => format!("int:{n}"),
                ModuleId::Text(s) => format!("text:{s}"),
            })
            .collect();
        fingerprint(keys.iter().map(String::as_bytes))
    }
}

fn sanitize(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if safe.is_empty() || safe.chars().all(|c| c == '.') {
        "_".repeat(safe.len().max(1))
    } else {
        safe
    }
}

/// First 48 bits of a SHA-256 over length-prefixed parts, as hex
fn fingerprint<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hasher
        .finalize()
        .iter()
        .take(6)
        .fold(String::with_capacity(12), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        })
}

/// Workdir name for every job, in job order.
///
/// Names are compared case-insensitively. Jobs whose [`Job::workdir_name`]
/// collide are told apart by a fingerprint of their roots, so `7` and `"7"`
/// get separate workdirs. A job that still lands on a claimed name gets
/// `Err` carrying the name of the job that owns it.
#[must_use]
pub fn assign_workdirs(jobs: &[Job]) -> Vec<Result<String, String>> {
    let base: Vec<String> = jobs.iter().map(Job::workdir_name).collect();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for name in &base {
        *counts.entry(name.to_lowercase()).or_default() += 1;
    }

    let mut owners: HashMap<String, &str> = HashMap::new();
    jobs.iter()
        .zip(base)
        .map(|(job, name)| {
            let shared = counts.get(&name.to_lowercase()).copied().unwrap_or(0) > 1;
            let name = if shared {
                format!("{name}-{}", job.roots_fingerprint())
            } else {
                name
            };
            match owners.entry(name.to_lowercase()) {
                Entry::Occupied(owner) => Err((*owner.get()).to_string()),
                Entry::Vacant(slot) => {
                    slot.insert(&job.name);
                    Ok(name)
                }
            }
        })
        .collect()
}

/// One job per distinct module in the store
#[must_use]
pub fn jobs_per_module(store: &ModuleStore) -> Vec<Job> {
    store.ids().map(Job::for_module).collect()
}

/// Load jobs from a JSON-lines file or JSON array
pub fn load_jobs(path: &Path) -> HdlcovResult<Vec<Job>> {
    read_json_records(path)
}

/// Final state of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// Simulation completed with exit status zero
    Succeeded,
    /// Simulation failed, exited non-zero, or could not start
    Failed,
    /// Simulation exceeded its timeout
    TimedOut,
    /// Workdir already held results
    Skipped,
    /// Resolution failed or resolved nothing
    Unresolved,
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Skipped => write!(f, "skipped"),
            Self::Unresolved => write!(f, "unresolved"),
        }
    }
}

impl From<&Outcome> for UnitStatus {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Skipped => Self::Skipped,
            Outcome::Completed { success: true, .. } => Self::Succeeded,
            Outcome::Completed { .. } | Outcome::LaunchFailed { .. } => Self::Failed,
            Outcome::TimedOut { .. } => Self::TimedOut,
        }
    }
}

/// Per-unit result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitReport {
    /// Job name
    pub name: String,
    /// Job roots
    pub roots: Vec<ModuleId>,
    /// Final status
    pub status: UnitStatus,
    /// Modules in the closure
    pub modules: usize,
    /// Code units written to the source file
    pub code_units: usize,
    /// References skipped during resolution
    pub skipped_modules: Vec<ModuleId>,
    /// Sandbox run, if one was attempted
    pub run: Option<RunReport>,
    /// Parsed coverage counters
    pub coverage: Option<Vec<i64>>,
    /// Summary of the counters
    pub coverage_summary: Option<CoverageSummary>,
    /// Error message for unresolved units or unreadable logs
    pub error: Option<String>,
}

impl UnitReport {
    fn unresolved(job: &Job, error: impl Into<String>) -> Self {
        Self {
            name: job.name.clone(),
            roots: job.roots.clone(),
            status: UnitStatus::Unresolved,
            modules: 0,
            code_units: 0,
            skipped_modules: Vec::new(),
            run: None,
            coverage: None,
            coverage_summary: None,
            error: Some(error.into()),
        }
    }

    fn crashed(job: &Job, error: impl Into<String>) -> Self {
        Self {
            status: UnitStatus::Failed,
            ..Self::unresolved(job, error)
        }
    }
}

/// Aggregated batch results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Units sorted by name
    pub units: Vec<UnitReport>,
    /// Number of units
    pub total: usize,
    /// Units that succeeded
    pub succeeded: usize,
    /// Units that failed
    pub failed: usize,
    /// Units that timed out
    pub timed_out: usize,
    /// Units skipped because results existed
    pub skipped: usize,
    /// Units whose roots did not resolve
    pub unresolved: usize,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

impl BatchReport {
    /// Build a report from unit results
    #[must_use]
    pub fn from_units(mut units: Vec<UnitReport>, duration_ms: u64) -> Self {
        units.sort_by(|a, b| a.name.cmp(&b.name));
        let count = |status: UnitStatus| units.iter().filter(|u| u.status == status).count();
        Self {
            total: units.len(),
            succeeded: count(UnitStatus::Succeeded),
            failed: count(UnitStatus::Failed),
            timed_out: count(UnitStatus::TimedOut),
            skipped: count(UnitStatus::Skipped),
            unresolved: count(UnitStatus::Unresolved),
            duration_ms,
            units,
        }
    }

    /// Whether every unit succeeded or was skipped
    #[must_use]
    pub fn all_ok(&self) -> bool {
        self.succeeded + self.skipped == self.total
    }

    /// Look up a unit by job name
    #[must_use]
    pub fn unit(&self, name: &str) -> Option<&UnitReport> {
        self.units.iter().find(|u| u.name == name)
    }

    /// Write the report as an indented JSON document
    pub fn write(&self, path: &Path) -> HdlcovResult<()> {
        write_json(self, path)
    }
}

/// Batch driver settings
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Parent of all unit workdirs
    pub out_dir: PathBuf,
    /// Maximum units in flight
    pub jobs: usize,
    /// Resolution policy applied to every unit
    pub resolve: ResolveOptions,
}

impl BatchConfig {
    /// Create settings with one worker per available CPU
    #[must_use]
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            jobs: std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
            resolve: ResolveOptions::default(),
        }
    }

    /// Set the worker count (0 means auto-detect)
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        if jobs > 0 {
            self.jobs = jobs;
        }
        self
    }

    /// Set the resolution policy
    #[must_use]
    pub const fn with_resolve_options(mut self, options: ResolveOptions) -> Self {
        self.resolve = options;
        self
    }
}

/// Fans units out over a bounded pool of tokio tasks
#[derive(Debug, Clone)]
pub struct BatchDriver {
    store: Arc<ModuleStore>,
    runner: Arc<SandboxRunner>,
    config: BatchConfig,
}

impl BatchDriver {
    /// Create a driver over a shared store and runner
    #[must_use]
    pub fn new(store: Arc<ModuleStore>, runner: Arc<SandboxRunner>, config: BatchConfig) -> Self {
        Self {
            store,
            runner,
            config,
        }
    }

    /// Returns the configuration
    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run every job, calling `on_unit` as each one finishes
    pub async fn run<F>(&self, jobs: Vec<Job>, mut on_unit: F) -> BatchReport
    where
        F: FnMut(&UnitReport),
    {
        let start = Instant::now();
        let concurrency = self.config.jobs.max(1);
        tracing::info!(units = jobs.len(), concurrency, "starting batch");

        let mut units = Vec::new();
        let mut assigned = Vec::with_capacity(jobs.len());
        let workdirs = assign_workdirs(&jobs);
        for (job, workdir) in jobs.into_iter().zip(workdirs) {
            match workdir {
                Ok(name) => assigned.push((job, self.config.out_dir.join(name))),
                Err(owner) => {
                    tracing::warn!(unit = %job.name, %owner, "workdir already claimed");
                    let report = UnitReport::crashed(
                        &job,
                        format!("workdir collides with unit {owner}"),
                    );
                    on_unit(&report);
                    units.push(report);
                }
            }
        }

        let store = Arc::clone(&self.store);
        let runner = Arc::clone(&self.runner);
        let options = self.config.resolve;
        let unit = move |job: Job, workdir: PathBuf| {
            let store = Arc::clone(&store);
            let runner = Arc::clone(&runner);
            async move { execute_unit(&store, &runner, &job, &workdir, options).await }
        };
        units.extend(fan_out(assigned, concurrency, unit, on_unit).await);

        let report = BatchReport::from_units(units, start.elapsed().as_millis() as u64);
        tracing::info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            timed_out = report.timed_out,
            skipped = report.skipped,
            unresolved = report.unresolved,
            "batch finished"
        );
        report
    }
}

/// Run `unit` over every job with at most `concurrency` in flight.
///
/// Each unit runs in its own task so a panic becomes a failed report for
/// that job alone.
async fn fan_out<U, Fut, F>(
    jobs: Vec<(Job, PathBuf)>,
    concurrency: usize,
    unit: U,
    mut on_unit: F,
) -> Vec<UnitReport>
where
    U: Fn(Job, PathBuf) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = UnitReport> + Send + 'static,
    F: FnMut(&UnitReport),
{
    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));
    let unit = Arc::new(unit);
    let mut join_set: tokio::task::JoinSet<UnitReport> = tokio::task::JoinSet::new();

    for (job, workdir) in jobs {
        let semaphore = Arc::clone(&semaphore);
        let unit = Arc::clone(&unit);

        join_set.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return UnitReport::crashed(&job, "worker pool closed");
            };
            let handle = tokio::spawn(unit(job.clone(), workdir));
            match handle.await {
                Ok(report) => report,
                Err(e) => {
                    tracing::warn!(unit = %job.name, error = %e, "unit task crashed");
                    UnitReport::crashed(&job, format!("unit task crashed: {e}"))
                }
            }
        });
    }

    let mut units = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(report) => {
                on_unit(&report);
                units.push(report);
            }
            Err(e) => tracing::warn!(error = %e, "batch worker crashed"),
        }
    }
    units
}

async fn execute_unit(
    store: &ModuleStore,
    runner: &SandboxRunner,
    job: &Job,
    workdir: &Path,
    options: ResolveOptions,
) -> UnitReport {
    let resolution = match resolve(store, job.roots.iter().cloned(), options) {
        Ok(resolution) => resolution,
        Err(e) => {
            tracing::info!(unit = %job.name, error = %e, "unit did not resolve");
            return UnitReport::unresolved(job, e.to_string());
        }
    };
    if resolution.is_empty() {
        return UnitReport {
            skipped_modules: resolution.skipped,
            ..UnitReport::unresolved(job, "none of the job's roots resolved to a module")
        };
    }

    tracing::info!(unit = %job.name, modules = resolution.resolved.len(), "running unit");
    let run = runner.run(&resolution.code_units, workdir).await;
    let status = UnitStatus::from(&run.outcome);

    let mut error = match &run.outcome {
        Outcome::LaunchFailed { message } => Some(message.clone()),
        _ => None,
    };
    let mut coverage = None;
    if let Some(log) = runner.coverage_log_path(workdir).filter(|p| p.is_file()) {
        match parse_coverage_log(&log) {
            Ok(counters) => coverage = Some(counters),
            Err(e) => error = Some(e.to_string()),
        }
    }

    UnitReport {
        name: job.name.clone(),
        roots: job.roots.clone(),
        status,
        modules: resolution.resolved.len(),
        code_units: resolution.code_units.len(),
        skipped_modules: resolution.skipped,
        coverage_summary: coverage.as_deref().map(CoverageSummary::from_counters),
        coverage,
        run: Some(run),
        error,
    }
}
