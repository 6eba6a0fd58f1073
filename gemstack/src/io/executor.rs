//! Executor abstraction for agent invocation.
//!
//! The [`Executor`] trait decouples the execution pipeline from the actual
//! agent process. Tests use scripted executors that return predetermined
//! outputs without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::io::config::AgentConfig;
use crate::io::process::run_command_merged;

/// Parameters for one executor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Working directory for the child process.
    pub workdir: PathBuf,
    pub program: String,
    pub args: Vec<String>,
    /// Maximum time to wait for the child to complete.
    pub timeout: Duration,
    /// Bound on the output kept in memory.
    pub output_limit_bytes: usize,
}

/// Result of one invocation. A non-zero exit is data, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Stdout and stderr merged in arrival order.
    pub output: String,
    pub timed_out: bool,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// Abstraction over agent execution backends.
pub trait Executor {
    /// Run the request to completion. `Err` means the process could not be run.
    fn exec(&self, request: &ExecRequest) -> Result<ExecOutput>;
}

/// Executor that spawns the agent directly (no shell) and mirrors its output.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

impl Executor for ProcessExecutor {
    #[instrument(skip_all, fields(program = %request.program, timeout_secs = request.timeout.as_secs()))]
    fn exec(&self, request: &ExecRequest) -> Result<ExecOutput> {
        info!(workdir = %request.workdir.display(), "starting agent");
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args).current_dir(&request.workdir);

        let output = run_command_merged(cmd, request.timeout, request.output_limit_bytes, true)
            .with_context(|| format!("run {}", request.program))?;

        if output.timed_out {
            warn!(
                timeout_secs = request.timeout.as_secs(),
                "agent timed out"
            );
        } else if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent exited with failure");
        } else {
            debug!("agent completed");
        }

        Ok(ExecOutput {
            exit_code: output.status.code(),
            output: output.output,
            timed_out: output.timed_out,
        })
    }
}

/// How to launch the agent for a given model and unit.
///
/// The resulting argument vector is
/// `[entry] <args..> <model_flag> <model> <unit args..>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand {
    pub program: String,
    pub entry: Option<PathBuf>,
    pub base_args: Vec<String>,
    pub model_flag: String,
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl AgentCommand {
    pub fn from_config(config: &AgentConfig, entry: Option<PathBuf>, workdir: PathBuf) -> Self {
        Self {
            program: config.program.clone(),
            entry,
            base_args: config.args.clone(),
            model_flag: config.model_flag.clone(),
            workdir,
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    /// `unit_args` comes from [`crate::core::types::ExecutionUnit::to_args`].
    pub fn request(&self, model: &str, unit_args: &[String]) -> ExecRequest {
        let mut args = Vec::new();
        if let Some(entry) = &self.entry {
            args.push(entry.display().to_string());
        }
        args.extend(self.base_args.iter().cloned());
        args.push(self.model_flag.clone());
        args.push(model.to_string());
        args.extend(unit_args.iter().cloned());
        ExecRequest {
            workdir: self.workdir.clone(),
            program: self.program.clone(),
            args,
            timeout: self.timeout,
            output_limit_bytes: self.output_limit_bytes,
        }
    }
}
