//! Git adapter and the auto-commit collaborator.
//!
//! Commits happen after successful units, so we keep a small explicit
//! wrapper around `git` subprocess calls.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};

use crate::core::summary::truncate_chars;
use crate::io::config::AutoCommitConfig;
use crate::io::status;

/// Commit subjects never exceed this many characters.
pub const MAX_SUBJECT_LEN: usize = 72;

const PROMPTLESS_SUBJECT: &str = "Auto-commit after prompt execution";

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// True when the workdir is inside a git work tree.
    pub fn is_repository(&self) -> Result<bool> {
        let out = self.run(&["rev-parse", "--is-inside-work-tree"])?;
        Ok(out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "true")
    }

    #[instrument(skip_all)]
    pub fn init(&self) -> Result<()> {
        debug!(workdir = %self.workdir.display(), "initializing repository");
        self.run_checked(&["init"])?;
        Ok(())
    }

    /// True if the work tree has any change, untracked files included.
    pub fn has_changes(&self) -> Result<bool> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        Ok(out.lines().any(|line| !line.trim().is_empty()))
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    /// Subject line of the HEAD commit.
    pub fn head_subject(&self) -> Result<String> {
        let out = self.run_capture(&["log", "-1", "--format=%s"])?;
        Ok(out.trim().to_string())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

/// Records the agent's changes after a successful unit.
pub trait Committer: Sync {
    /// Commit pending changes for `prompt`. Returns whether a commit was made.
    fn maybe_commit(&self, prompt: &str) -> Result<bool>;
}

/// Per-invocation auto-commit overrides (from CLI flags).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AutoCommitOverrides {
    pub enabled: Option<bool>,
    pub message_prefix: Option<String>,
    pub include_prompt: Option<bool>,
}

/// Git-backed [`Committer`]. Overrides take precedence over configuration.
#[derive(Debug, Clone)]
pub struct GitAutoCommit {
    git: Git,
    config: AutoCommitConfig,
    overrides: AutoCommitOverrides,
}

impl GitAutoCommit {
    pub fn new(git: Git, config: AutoCommitConfig, overrides: AutoCommitOverrides) -> Self {
        Self {
            git,
            config,
            overrides,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.overrides.enabled.unwrap_or(self.config.enabled)
    }

    pub fn message_prefix(&self) -> &str {
        self.overrides
            .message_prefix
            .as_deref()
            .unwrap_or(&self.config.message_prefix)
    }

    pub fn include_prompt(&self) -> bool {
        self.overrides
            .include_prompt
            .unwrap_or(self.config.include_prompt)
    }

    pub fn commit_message(&self, prompt: &str) -> String {
        commit_subject(self.message_prefix(), prompt, self.include_prompt())
    }
}

impl Committer for GitAutoCommit {
    #[instrument(skip_all)]
    fn maybe_commit(&self, prompt: &str) -> Result<bool> {
        if !self.is_enabled() {
            return Ok(false);
        }
        if !self.git.is_repository()? {
            status::status("Initializing git repository...");
            self.git.init()?;
        }
        if !self.git.has_changes()? {
            status::status("No changes to commit");
            return Ok(false);
        }
        self.git.add_all()?;
        let message = self.commit_message(prompt);
        let committed = self.git.commit_staged(&message)?;
        if committed {
            info!(subject = %message, "auto-committed");
            status::status(&format!("Committed: {message}"));
        }
        Ok(committed)
    }
}

/// Build a single-line commit subject of at most [`MAX_SUBJECT_LEN`] chars.
pub fn commit_subject(prefix: &str, prompt: &str, include_prompt: bool) -> String {
    let summary = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    let body = if include_prompt && !summary.is_empty() {
        summary
    } else {
        PROMPTLESS_SUBJECT.to_string()
    };
    let subject = if prefix.trim().is_empty() {
        body
    } else {
        format!("{} {body}", prefix.trim())
    };
    truncate_chars(&subject, MAX_SUBJECT_LEN)
}
