//! Sandboxed toolchain execution.
//!
//! A resolved module set is written to a scratch directory as one source
//! file, then compiled, elaborated and executed by the HDL toolchain inside an
//! enroot container (or directly on the host with [`Isolation::None`]).
//!
//! ```text
//! <workdir>/
//! ├── src.v                 flattened compilation unit
//! └── obj_dir/              toolchain-managed build output
//!     ├── Vsrc              simulation binary
//!     └── ...               coverage database, post-command output
//! ```
//!
//! Process failures never surface as errors: timeouts, launch failures and
//! non-zero exits are all reported through [`Outcome`] so one bad unit cannot
//! abort a batch.
//!
//! # Examples
//!
//! ```rust,ignore
//! use hdlcov::sandbox::{SandboxConfig, SandboxRunner};
//!
//! let runner = SandboxRunner::new(SandboxConfig::default())?;
//! let report = runner.run(&resolution.code_units, "runs/top".as_ref()).await;
//! println!("{}", report.outcome);
//! ```

use crate::result::{HdlcovError, HdlcovResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

/// Separator between code units in the generated source file
pub const CODE_UNIT_SEPARATOR: &str = "\n\n";

/// How the toolchain is isolated from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    /// Run inside an enroot container
    #[default]
    Enroot,
    /// Run directly on the host
    None,
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enroot => write!(f, "enroot"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Sandbox and toolchain configuration.
///
/// Every path the runner touches comes from here; there is no global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Isolation mode.
    pub isolation: Isolation,
    /// Container runtime executable.
    pub container_runtime: String,
    /// Container name created by `init_environment` and used by runs.
    pub image_name: String,
    /// Image file the container is created from.
    pub image_path: Option<PathBuf>,
    /// Toolchain (Verilator) executable.
    pub toolchain_path: PathBuf,
    /// Toolchain install directory mounted into the container.
    pub toolchain_mount: Option<PathBuf>,
    /// Additional host paths mounted read/write at the same location.
    pub mount_list: Vec<PathBuf>,
    /// Flags passed to the toolchain before the source file.
    pub toolchain_flags: Vec<String>,
    /// Generated source file name inside the workdir.
    pub source_file: String,
    /// Build output directory name inside the workdir.
    pub build_dir: String,
    /// Simulation binary produced in the build directory.
    pub executable: String,
    /// Commands run in the build directory after the simulation binary.
    pub post_commands: Vec<String>,
    /// Coverage log to parse after a run, relative to the workdir.
    pub coverage_log: Option<PathBuf>,
    /// Wall-clock limit per invocation.
    pub timeout_seconds: u64,
    /// Re-run even when the workdir already exists.
    pub force_rerun: bool,
    /// Shell used to interpret the composed command line.
    pub shell: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            isolation: Isolation::Enroot,
            container_runtime: "enroot".to_string(),
            image_name: "ubuntu2404".to_string(),
            image_path: None,
            toolchain_path: PathBuf::from("/opt/verilator/bin/verilator"),
            toolchain_mount: Some(PathBuf::from("/opt/verilator")),
            mount_list: vec![PathBuf::from("/usr"), PathBuf::from("/etc")],
            toolchain_flags: [
                "--binary",
                "--coverage",
                "--no-timing",
                "-Wno-style",
                "-Wno-fatal",
                "--bbox-sys",
                "--bbox-unsup",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            source_file: "src.v".to_string(),
            build_dir: "obj_dir".to_string(),
            executable: "Vsrc".to_string(),
            post_commands: Vec::new(),
            coverage_log: None,
            timeout_seconds: 120,
            force_rerun: false,
            shell: "sh".to_string(),
        }
    }
}

impl SandboxConfig {
    /// Creates the default Verilator-in-enroot configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a YAML document; missing keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> HdlcovResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| HdlcovError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a YAML configuration file.
    pub fn load(path: &Path) -> HdlcovResult<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| HdlcovError::io(path, e))?;
        Self::from_yaml_str(&yaml)
    }

    /// Renders the configuration as YAML.
    pub fn to_yaml(&self) -> HdlcovResult<String> {
        serde_yaml_ng::to_string(self).map_err(|e| HdlcovError::Serialization {
            message: e.to_string(),
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> HdlcovResult<()> {
        if self.timeout_seconds == 0 {
            return Err(HdlcovError::invalid_config("timeout_seconds cannot be zero"));
        }
        if self.toolchain_path.as_os_str().is_empty() {
            return Err(HdlcovError::invalid_config("toolchain_path not specified"));
        }
        for (name, value) in [
            ("source_file", &self.source_file),
            ("build_dir", &self.build_dir),
            ("executable", &self.executable),
            ("shell", &self.shell),
        ] {
            if value.is_empty() {
                return Err(HdlcovError::invalid_config(format!("{name} not specified")));
            }
        }
        if self.isolation == Isolation::Enroot
            && (self.image_name.is_empty() || self.container_runtime.is_empty())
        {
            return Err(HdlcovError::invalid_config(
                "enroot isolation requires image_name and container_runtime",
            ));
        }
        Ok(())
    }

    /// Timeout as a duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Sets the isolation mode.
    #[must_use]
    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Sets the toolchain executable.
    #[must_use]
    pub fn with_toolchain(mut self, path: impl Into<PathBuf>) -> Self {
        self.toolchain_path = path.into();
        self
    }

    /// Replaces the toolchain flags.
    #[must_use]
    pub fn with_toolchain_flags(mut self, flags: Vec<String>) -> Self {
        self.toolchain_flags = flags;
        self
    }

    /// Sets the per-invocation timeout.
    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets whether existing workdirs are re-run.
    #[must_use]
    pub fn with_force_rerun(mut self, force: bool) -> Self {
        self.force_rerun = force;
        self
    }

    /// Adds a command run in the build directory after simulation.
    #[must_use]
    pub fn with_post_command(mut self, command: impl Into<String>) -> Self {
        self.post_commands.push(command.into());
        self
    }

    /// Sets the coverage log path relative to the workdir.
    #[must_use]
    pub fn with_coverage_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.coverage_log = Some(path.into());
        self
    }
}

/// Result of one sandbox invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Workdir already present; nothing was run.
    Skipped,
    /// Process ran to completion.
    Completed {
        /// Exit code, absent when killed by a signal.
        exit_code: Option<i32>,
        /// Whether the process exited successfully.
        success: bool,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },
    /// Process group exceeded the timeout and was killed.
    TimedOut {
        /// Timeout that was exceeded, in milliseconds.
        timeout_ms: u64,
    },
    /// Process could not be started, or scratch files could not be written.
    LaunchFailed {
        /// Error message.
        message: String,
    },
}

impl Outcome {
    /// Whether the invocation completed with a zero exit status.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Completed { success: true, .. })
    }

    /// Whether the run was skipped because results already existed.
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => write!(f, "skipped (workdir already exists)"),
            Self::Completed {
                exit_code: Some(code),
                ..
            } => write!(f, "completed (exit code {code})"),
            Self::Completed { .. } => write!(f, "completed (terminated by signal)"),
            Self::TimedOut { timeout_ms } if timeout_ms % 1000 == 0 => {
                write!(f, "timed out after {}s", timeout_ms / 1000)
            }
            Self::TimedOut { timeout_ms } => write!(f, "timed out after {timeout_ms}ms"),
            Self::LaunchFailed { message } => write!(f, "launch failed: {message}"),
        }
    }
}

/// Workdir paired with the outcome of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Scratch directory of the run.
    pub workdir: PathBuf,
    /// What happened.
    pub outcome: Outcome,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Runs the toolchain over flattened module sets.
#[derive(Debug, Clone)]
pub struct SandboxRunner {
    config: SandboxConfig,
}

impl SandboxRunner {
    /// Creates a runner after validating the configuration.
    pub fn new(config: SandboxConfig) -> HdlcovResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Path of the generated source file for `workdir`.
    #[must_use]
    pub fn source_path(&self, workdir: &Path) -> PathBuf {
        workdir.join(&self.config.source_file)
    }

    /// Path of the build output directory for `workdir`.
    #[must_use]
    pub fn build_path(&self, workdir: &Path) -> PathBuf {
        workdir.join(&self.config.build_dir)
    }

    /// Path of the configured coverage log for `workdir`, if any.
    #[must_use]
    pub fn coverage_log_path(&self, workdir: &Path) -> Option<PathBuf> {
        self.config.coverage_log.as_ref().map(|log| workdir.join(log))
    }

    /// Compile, elaborate and run steps, without the container wrapper.
    #[must_use]
    pub fn toolchain_command(&self, workdir: &Path) -> String {
        let build = self.build_path(workdir);
        let mut parts = vec![
            shell_quote(&self.config.toolchain_path.to_string_lossy()),
            "--Mdir".to_string(),
            shell_quote(&build.to_string_lossy()),
        ];
        parts.extend(self.config.toolchain_flags.iter().map(|f| shell_quote(f)));
        parts.push(shell_quote(&self.source_path(workdir).to_string_lossy()));

        let mut line = format!(
            "{} && cd {} && ./{}",
            parts.join(" "),
            shell_quote(&build.to_string_lossy()),
            shell_quote(&self.config.executable)
        );
        for post in &self.config.post_commands {
            line.push_str(" && ");
            line.push_str(post);
        }
        line
    }

    /// Full command line handed to the shell for `workdir`.
    #[must_use]
    pub fn command_line(&self, workdir: &Path) -> String {
        let inner = self.toolchain_command(workdir);
        match self.config.isolation {
            Isolation::None => inner,
            Isolation::Enroot => {
                let mut mounts: Vec<&Path> = vec![workdir];
                if let Some(ref tm) = self.config.toolchain_mount {
                    mounts.push(tm);
                }
                mounts.extend(self.config.mount_list.iter().map(PathBuf::as_path));

                let mut line = format!("{} start --root -w", shell_quote(&self.config.container_runtime));
                for mount in mounts {
                    let m = mount.to_string_lossy();
                    line.push_str(&format!(" --mount {}", shell_quote(&format!("{m}:{m}"))));
                }
                line.push_str(&format!(
                    " {} sh -c {}",
                    shell_quote(&self.config.image_name),
                    shell_quote(&inner)
                ));
                line
            }
        }
    }

    /// Command line that creates the container from the image.
    pub fn init_command_line(&self) -> HdlcovResult<String> {
        let image = self.config.image_path.as_ref().ok_or_else(|| {
            HdlcovError::invalid_config("image_path is required to create the container")
        })?;
        Ok(format!(
            "{} create -n {} {}",
            shell_quote(&self.config.container_runtime),
            shell_quote(&self.config.image_name),
            shell_quote(&image.to_string_lossy())
        ))
    }

    /// Creates the container once, before any run.
    pub async fn init_environment(&self) -> HdlcovResult<Outcome> {
        if self.config.isolation == Isolation::None {
            return Ok(Outcome::Skipped);
        }
        let line = self.init_command_line()?;
        tracing::info!(command = %line, "creating sandbox container");
        let cwd = std::env::current_dir().map_err(|e| HdlcovError::io(".", e))?;
        Ok(self.execute(&line, &cwd, self.config.timeout()).await)
    }

    /// Writes `code_units` into `workdir` and runs the toolchain there.
    pub async fn run<S: AsRef<str>>(&self, code_units: &[S], workdir: &Path) -> RunReport {
        self.run_with_timeout(code_units, workdir, self.config.timeout())
            .await
    }

    /// Like [`SandboxRunner::run`] with an explicit timeout.
    pub async fn run_with_timeout<S: AsRef<str>>(
        &self,
        code_units: &[S],
        workdir: &Path,
        timeout: Duration,
    ) -> RunReport {
        let start = Instant::now();
        let finish = |outcome: Outcome| RunReport {
            workdir: workdir.to_path_buf(),
            outcome,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        if workdir.is_dir() && !self.config.force_rerun {
            tracing::debug!(workdir = %workdir.display(), "workdir exists, skipping");
            return finish(Outcome::Skipped);
        }

        if let Err(message) = self.write_source(code_units, workdir).await {
            tracing::warn!(workdir = %workdir.display(), %message, "could not prepare workdir");
            return finish(Outcome::LaunchFailed { message });
        }

        let line = self.command_line(workdir);
        tracing::debug!(command = %line, "launching toolchain");
        let outcome = self.execute(&line, workdir, timeout).await;
        finish(outcome)
    }

    async fn write_source<S: AsRef<str>>(&self, code_units: &[S], workdir: &Path) -> Result<(), String> {
        tokio::fs::create_dir_all(workdir)
            .await
            .map_err(|e| format!("failed to create {}: {e}", workdir.display()))?;
        let source = code_units
            .iter()
            .map(|unit| unit.as_ref())
            .collect::<Vec<&str>>()
            .join(CODE_UNIT_SEPARATOR);
        let path = self.source_path(workdir);
        tokio::fs::write(&path, source)
            .await
            .map_err(|e| format!("failed to write {}: {e}", path.display()))
    }

    async fn execute(&self, line: &str, cwd: &Path, timeout: Duration) -> Outcome {
        let mut command = tokio::process::Command::new(&self.config.shell);
        command
            .arg("-c")
            .arg(line)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout reaches the toolchain under the shell
        #[cfg(unix)]
        command.process_group(0);
        let child = command.spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(shell = %self.config.shell, error = %e, "failed to spawn shell");
                return Outcome::LaunchFailed {
                    message: format!("failed to spawn {}: {e}", self.config.shell),
                };
            }
        };

        let pid = child.id();
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Outcome::Completed {
                exit_code: output.status.code(),
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Ok(Err(e)) => Outcome::LaunchFailed {
                message: format!("failed to collect output: {e}"),
            },
            Err(_) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(cwd = %cwd.display(), timeout_ms, "toolchain timed out");
                kill_process_group(pid);
                Outcome::TimedOut { timeout_ms }
            }
        }
    }
}

/// SIGKILL every process in the group led by `pid`
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        tracing::debug!(pid, error = %e, "process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Quote `s` for a POSIX shell unless it only has safe characters
#[must_use]
pub fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | ':' | '=' | '+' | ','));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}
