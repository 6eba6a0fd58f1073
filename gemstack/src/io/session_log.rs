//! Reflective session log under `.gemstack/`.
//!
//! Both files are rewritten in full after every iteration, so a crash leaves
//! the log consistent up to the last completed iteration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, SecondsFormat};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::core::types::ReflectionLogEntry;
use crate::io::config::{GemStackPaths, write_atomic};
use crate::io::prompt::{PromptEngine, SessionHeader};

#[derive(Debug, Serialize)]
struct SessionRecord<'a> {
    goal: &'a str,
    started_at: &'a str,
    max_iterations: u32,
    entries: &'a [ReflectionLogEntry],
}

/// Writer for one reflective session.
#[derive(Debug, Clone)]
pub struct SessionLog {
    pub log_path: PathBuf,
    pub json_path: PathBuf,
    goal: String,
    max_iterations: u32,
    started_at: String,
}

impl SessionLog {
    pub fn new(paths: &GemStackPaths, goal: &str, max_iterations: u32) -> Self {
        Self::with_start(paths, goal, max_iterations, Local::now())
    }

    pub fn with_start(
        paths: &GemStackPaths,
        goal: &str,
        max_iterations: u32,
        started_at: DateTime<Local>,
    ) -> Self {
        Self {
            log_path: paths.session_log_path.clone(),
            json_path: paths.session_json_path.clone(),
            goal: goal.to_string(),
            max_iterations,
            started_at: started_at.to_rfc3339_opts(SecondsFormat::Secs, false),
        }
    }

    /// Rewrite the text log and JSON sidecar with every entry so far.
    #[instrument(skip_all, fields(entries = entries.len()))]
    pub fn write(&self, engine: &PromptEngine, entries: &[ReflectionLogEntry]) -> Result<()> {
        let header = SessionHeader {
            goal: &self.goal,
            started_at: &self.started_at,
            max_iterations: self.max_iterations,
        };
        let text = engine
            .render_session_log(&header, entries)
            .context("render session log")?;
        write_atomic(&self.log_path, &text)?;

        let record = SessionRecord {
            goal: &self.goal,
            started_at: &self.started_at,
            max_iterations: self.max_iterations,
            entries,
        };
        let mut json = serde_json::to_string_pretty(&record).context("serialize session log")?;
        json.push('\n');
        write_atomic(&self.json_path, &json)?;
        debug!(path = %self.log_path.display(), "session log written");
        Ok(())
    }
}
