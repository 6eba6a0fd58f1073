//! Prompt and session-log rendering for reflective mode.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::types::ReflectionLogEntry;

const HISTORY_TEMPLATE: &str = include_str!("prompts/history.md");
const ITERATION_TEMPLATE: &str = include_str!("prompts/iteration.md");
const NEXT_STEP_TEMPLATE: &str = include_str!("prompts/next_step.md");
const SESSION_LOG_TEMPLATE: &str = include_str!("prompts/session_log.txt");

/// Session header shown at the top of the text log.
#[derive(Debug, Clone, Serialize)]
pub struct SessionHeader<'a> {
    pub goal: &'a str,
    pub started_at: &'a str,
    pub max_iterations: u32,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template("history", HISTORY_TEMPLATE)
            .expect("history template should be valid");
        env.add_template("iteration", ITERATION_TEMPLATE)
            .expect("iteration template should be valid");
        env.add_template("next_step", NEXT_STEP_TEMPLATE)
            .expect("next_step template should be valid");
        env.add_template("session_log", SESSION_LOG_TEMPLATE)
            .expect("session_log template should be valid");
        Self { env }
    }

    /// Prompt for an iteration after the first: goal and prior work, then the task.
    pub fn render_iteration(
        &self,
        goal: &str,
        history: &[ReflectionLogEntry],
        prompt: &str,
    ) -> Result<String> {
        let template = self.env.get_template("iteration")?;
        let rendered = template.render(context! {
            goal => goal.trim(),
            history => history,
            prompt => prompt.trim(),
        })?;
        Ok(rendered)
    }

    /// Meta-query asking the agent for the single next step.
    pub fn render_next_step(&self, goal: &str, history: &[ReflectionLogEntry]) -> Result<String> {
        let template = self.env.get_template("next_step")?;
        let rendered = template.render(context! {
            goal => goal.trim(),
            history => history,
        })?;
        Ok(rendered)
    }

    pub fn render_session_log(
        &self,
        header: &SessionHeader<'_>,
        entries: &[ReflectionLogEntry],
    ) -> Result<String> {
        let template = self.env.get_template("session_log")?;
        let rendered = template.render(context! {
            goal => header.goal,
            started_at => header.started_at,
            max_iterations => header.max_iterations,
            entries => entries,
        })?;
        Ok(rendered)
    }
}
