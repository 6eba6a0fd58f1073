//! Scripted doubles and fixtures for tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};

use crate::cooldown::Sleeper;
use crate::core::fallback::ModelFallbackSelector;
use crate::io::executor::{AgentCommand, ExecOutput, ExecRequest, Executor};
use crate::io::git::Committer;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ordered record of side effects shared between doubles.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn record(&self, event: impl Into<String>) {
        lock(&self.0).push(event.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        lock(&self.0).clone()
    }
}

/// Executor that replays canned outputs in order and records every request.
///
/// Running out of responses is reported as an executor error.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    responses: Mutex<VecDeque<ExecOutput>>,
    requests: Mutex<Vec<ExecRequest>>,
    events: Option<EventLog>,
}

impl ScriptedExecutor {
    pub fn new(responses: Vec<ExecOutput>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            events: None,
        }
    }

    /// Record `exec:<last argument>` for each call.
    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn requests(&self) -> Vec<ExecRequest> {
        lock(&self.requests).clone()
    }

    /// Model passed after `--model` in each request.
    pub fn models_used(&self) -> Vec<String> {
        lock(&self.requests)
            .iter()
            .filter_map(|r| {
                let flag = r.args.iter().position(|a| a == "--model")?;
                r.args.get(flag + 1).cloned()
            })
            .collect()
    }

    /// Final argument of each request (the prompt text for prompt units).
    pub fn last_args(&self) -> Vec<String> {
        lock(&self.requests)
            .iter()
            .filter_map(|r| r.args.last().cloned())
            .collect()
    }
}

impl Executor for ScriptedExecutor {
    fn exec(&self, request: &ExecRequest) -> Result<ExecOutput> {
        lock(&self.requests).push(request.clone());
        if let Some(events) = &self.events {
            events.record(format!(
                "exec:{}",
                request.args.last().map_or("", String::as_str)
            ));
        }
        lock(&self.responses)
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted response left"))
    }
}

/// Successful run with the given output.
pub fn ok(output: &str) -> ExecOutput {
    ExecOutput {
        exit_code: Some(0),
        output: output.to_string(),
        timed_out: false,
    }
}

/// Run that exited with `code`.
pub fn exited(code: i32, output: &str) -> ExecOutput {
    ExecOutput {
        exit_code: Some(code),
        output: output.to_string(),
        timed_out: false,
    }
}

pub fn selector(models: &[&str]) -> ModelFallbackSelector {
    ModelFallbackSelector::new(models.iter().map(|m| (*m).to_string()).collect())
        .expect("non-empty model list")
}

/// Agent command with no entry and no base arguments.
pub fn agent_command() -> AgentCommand {
    AgentCommand {
        program: "agent".to_string(),
        entry: None,
        base_args: Vec::new(),
        model_flag: "--model".to_string(),
        workdir: PathBuf::from("."),
        timeout: Duration::from_secs(60),
        output_limit_bytes: 10_000,
    }
}

/// Sleeper that records durations instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
    events: Option<EventLog>,
}

impl RecordingSleeper {
    /// Record `sleep:<seconds>` for each call.
    pub fn with_events(events: EventLog) -> Self {
        Self {
            sleeps: Mutex::new(Vec::new()),
            events: Some(events),
        }
    }

    pub fn recorded(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
        if let Some(events) = &self.events {
            events.record(format!("sleep:{}", duration.as_secs()));
        }
    }
}

/// Committer that records prompts, optionally failing every call.
#[derive(Debug, Default)]
pub struct RecordingCommitter {
    commits: Mutex<Vec<String>>,
    fail: bool,
    events: Option<EventLog>,
}

impl RecordingCommitter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Record `commit:<prompt>` for each call.
    pub fn with_events(events: EventLog) -> Self {
        Self {
            events: Some(events),
            ..Self::default()
        }
    }

    pub fn commits(&self) -> Vec<String> {
        lock(&self.commits).clone()
    }
}

impl Committer for RecordingCommitter {
    fn maybe_commit(&self, prompt: &str) -> Result<bool> {
        if let Some(events) = &self.events {
            events.record(format!("commit:{prompt}"));
        }
        if self.fail {
            bail!("commit rejected");
        }
        lock(&self.commits).push(prompt.to_string());
        Ok(true)
    }
}

/// Temporary working directory for a test run.
pub fn workspace() -> tempfile::TempDir {
    tempfile::tempdir().expect("tempdir")
}

/// Initialize a repository with an identity and one commit.
pub fn init_git_repo(root: &Path) {
    for args in [
        &["init"][..],
        &["config", "user.email", "test@example.com"],
        &["config", "user.name", "test"],
    ] {
        let status = Command::new("git")
            .args(args)
            .current_dir(root)
            .status()
            .expect("git");
        assert!(status.success(), "git {args:?}");
    }

    std::fs::write(root.join("README.md"), "hi\n").expect("write");
    for args in [&["add", "README.md"][..], &["commit", "-m", "chore: init"]] {
        let status = Command::new("git")
            .args(args)
            .current_dir(root)
            .status()
            .expect("git");
        assert!(status.success(), "git {args:?}");
    }
}
