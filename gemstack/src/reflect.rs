//! Reflective mode: execute a goal, then repeatedly ask the agent for the
//! next step and execute that, carrying a history of completed work.

use anyhow::{Result, bail};
use tracing::{info, instrument, warn};

use crate::cooldown::{CooldownGate, Sleeper, ThreadSleeper};
use crate::core::summary::{DEFAULT_SUMMARY_LEN, first_meaningful_line, truncate_chars};
use crate::core::types::{ExecutionUnit, ReflectionLogEntry};
use crate::io::config::GemStackPaths;
use crate::io::executor::Executor;
use crate::io::git::Committer;
use crate::io::prompt::PromptEngine;
use crate::io::session_log::SessionLog;
use crate::io::status;
use crate::pipeline::ExecutionPipeline;

/// Reason why a reflective run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReflectionStop {
    /// Every allowed iteration ran.
    MaxIterations,
    /// The iteration's primary execution failed.
    ExecutionFailed { iteration: u32 },
    /// The next-step meta-query failed.
    NextPromptFailed { iteration: u32 },
    /// The agent answered the meta-query with nothing.
    EmptyNextPrompt { iteration: u32 },
}

impl ReflectionStop {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ExecutionFailed { .. } | Self::NextPromptFailed { .. }
        )
    }
}

/// Summary of a reflective run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectionOutcome {
    pub iterations_run: u32,
    pub stop: ReflectionStop,
    pub entries: Vec<ReflectionLogEntry>,
}

pub struct ReflectionController<'a, E: Executor, S: Sleeper = ThreadSleeper> {
    pipeline: ExecutionPipeline<'a, E>,
    committer: &'a dyn Committer,
    cooldown: &'a CooldownGate<S>,
    paths: GemStackPaths,
    engine: PromptEngine,
    summary_max_len: usize,
}

impl<'a, E: Executor, S: Sleeper> ReflectionController<'a, E, S> {
    pub fn new(
        pipeline: ExecutionPipeline<'a, E>,
        committer: &'a dyn Committer,
        cooldown: &'a CooldownGate<S>,
        paths: GemStackPaths,
    ) -> Self {
        Self {
            pipeline,
            committer,
            cooldown,
            paths,
            engine: PromptEngine::new(),
            summary_max_len: DEFAULT_SUMMARY_LEN,
        }
    }

    pub fn with_summary_len(mut self, max_len: usize) -> Self {
        self.summary_max_len = max_len;
        self
    }

    /// Run up to `max_iterations` iterations starting from `goal`.
    ///
    /// The session log is rewritten after every iteration. Only template
    /// rendering errors and invalid arguments surface as `Err`.
    #[instrument(skip_all, fields(max_iterations))]
    pub fn run(&self, goal: &str, max_iterations: u32) -> Result<ReflectionOutcome> {
        let goal = goal.trim();
        if goal.is_empty() {
            bail!("reflection goal must not be empty");
        }
        if max_iterations == 0 {
            bail!("max iterations must be > 0");
        }

        let log = SessionLog::new(&self.paths, goal, max_iterations);
        let mut entries: Vec<ReflectionLogEntry> = Vec::new();
        let mut prompt = goal.to_string();

        for iteration in 1..=max_iterations {
            status::status(&format!(
                "Reflection iteration {iteration}/{max_iterations}"
            ));
            let text = if iteration == 1 {
                prompt.clone()
            } else {
                self.engine.render_iteration(goal, &entries, &prompt)?
            };
            let outcome = self.pipeline.run_unit(&ExecutionUnit::Prompt(text));

            let summary = match &outcome.failure {
                None => first_meaningful_line(&outcome.output, self.summary_max_len),
                Some(failure) => truncate_chars(&format!("Failed: {failure}"), self.summary_max_len),
            };
            entries.push(ReflectionLogEntry {
                iteration,
                prompt: prompt.clone(),
                summary,
                success: outcome.success,
            });
            if let Err(e) = log.write(&self.engine, &entries) {
                warn!(err = %e, "session log write failed");
                status::status_warn(&format!("could not write session log: {e:#}"));
            }

            if !outcome.success {
                status::status_error(&format!("Iteration {iteration} failed, stopping"));
                return Ok(finish(entries, ReflectionStop::ExecutionFailed { iteration }));
            }
            if let Err(e) = self.committer.maybe_commit(&prompt) {
                warn!(err = %e, "auto-commit failed");
                status::status_warn(&format!("auto-commit failed: {e:#}"));
            }

            if iteration == max_iterations {
                break;
            }

            self.cooldown.perform_cooldown();
            status::status("Generating next step...");
            let query = self.engine.render_next_step(goal, &entries)?;
            let meta = self.pipeline.run_unit(&ExecutionUnit::Prompt(query));
            if !meta.success {
                status::status_error("failed to generate next prompt");
                return Ok(finish(entries, ReflectionStop::NextPromptFailed { iteration }));
            }
            let next = meta.output.trim();
            if next.is_empty() {
                status::status_warn("agent returned an empty next step, stopping");
                return Ok(finish(entries, ReflectionStop::EmptyNextPrompt { iteration }));
            }
            prompt = next.to_string();
            status::status(&format!(
                "Next step: {}",
                truncate_chars(&prompt, self.summary_max_len)
            ));
        }

        info!(iterations = entries.len(), "reflection finished");
        Ok(finish(entries, ReflectionStop::MaxIterations))
    }
}

fn finish(entries: Vec<ReflectionLogEntry>, stop: ReflectionStop) -> ReflectionOutcome {
    ReflectionOutcome {
        iterations_run: u32::try_from(entries.len()).unwrap_or(u32::MAX),
        stop,
        entries,
    }
}
