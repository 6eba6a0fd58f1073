//! Shared deterministic types for gemstack core logic.
//!
//! These types define stable contracts between the parser, the queue and the
//! execution pipeline. They must not depend on external state or I/O.

use std::fmt;

use anyhow::{Result, anyhow};
use serde::Serialize;

/// One fully-formed instruction for the agent.
///
/// Units are produced by the directive parser or by interactive input and are
/// consumed exactly once by the execution pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionUnit {
    /// Natural-language prompt sent verbatim.
    Prompt(String),
    /// Prompt composed from a goal and/or checkpoints around `task`.
    Composed { text: String, task: String },
    /// Raw line forwarded to the agent as-is (e.g. flags).
    Passthrough(String),
}

impl ExecutionUnit {
    /// Text carried by the unit, without the `prompt "..."` wrapper.
    pub fn text(&self) -> &str {
        match self {
            Self::Prompt(text) | Self::Passthrough(text) | Self::Composed { text, .. } => text,
        }
    }

    /// Short text describing the work, used for commit subjects.
    pub fn task(&self) -> &str {
        match self {
            Self::Composed { task, .. } => task,
            other => other.text(),
        }
    }

    /// Arguments appended to the agent invocation for this unit.
    ///
    /// Prompt text travels as a single argument, so quotes inside it need no
    /// escaping. Passthrough lines are split into words with POSIX shell
    /// quoting rules; unbalanced quotes are an error.
    pub fn to_args(&self) -> Result<Vec<String>> {
        match self {
            Self::Prompt(text) | Self::Composed { text, .. } => {
                Ok(vec!["prompt".to_string(), text.clone()])
            }
            Self::Passthrough(line) => shlex::split(line)
                .ok_or_else(|| anyhow!("unbalanced quoting in passthrough line: {line}")),
        }
    }
}

impl fmt::Display for ExecutionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prompt(text) | Self::Composed { text, .. } => write!(f, "prompt \"{text}\""),
            Self::Passthrough(line) => f.write_str(line),
        }
    }
}

/// One completed iteration of a reflective run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReflectionLogEntry {
    /// Iteration number (1-indexed).
    pub iteration: u32,
    /// Prompt executed in this iteration (without accumulated context).
    pub prompt: String,
    /// One-line summary derived from the agent output.
    pub summary: String,
    pub success: bool,
}
