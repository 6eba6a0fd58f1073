//! Run one execution unit against the agent with model fallback.

use std::fmt;

use tracing::{debug, info, instrument, warn};

use crate::core::classifier::exhaustion_marker;
use crate::core::fallback::ModelFallbackSelector;
use crate::core::summary::truncate_chars;
use crate::core::types::ExecutionUnit;
use crate::io::executor::{AgentCommand, Executor};
use crate::io::status;

const UNIT_PREVIEW_LEN: usize = 80;

/// Why a unit did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitFailure {
    /// The last model in the fallback list reported exhaustion.
    ModelsExhausted { last_model: String },
    /// Non-zero exit, signal, or timeout.
    ExitStatus { code: Option<i32>, timed_out: bool },
    /// The agent process could not be run.
    Spawn(String),
    /// The unit could not be turned into agent arguments.
    MalformedUnit(String),
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelsExhausted { last_model } => {
                write!(f, "all models exhausted (last tried {last_model})")
            }
            Self::ExitStatus {
                timed_out: true, ..
            } => f.write_str("agent timed out"),
            Self::ExitStatus {
                code: Some(code), ..
            } => write!(f, "agent exited with status {code}"),
            Self::ExitStatus { code: None, .. } => f.write_str("agent terminated by signal"),
            Self::Spawn(message) => write!(f, "failed to run agent: {message}"),
            Self::MalformedUnit(message) => write!(f, "malformed unit: {message}"),
        }
    }
}

/// Result of running one unit, including retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    pub success: bool,
    /// Output of the final attempt.
    pub output: String,
    pub attempts: u32,
    pub downgrades: u32,
    pub failure: Option<UnitFailure>,
}

/// Sequential executor of units with exhaustion-driven model downgrade.
pub struct ExecutionPipeline<'a, E: Executor> {
    executor: &'a E,
    models: &'a ModelFallbackSelector,
    agent: &'a AgentCommand,
}

impl<'a, E: Executor> ExecutionPipeline<'a, E> {
    pub fn new(executor: &'a E, models: &'a ModelFallbackSelector, agent: &'a AgentCommand) -> Self {
        Self {
            executor,
            models,
            agent,
        }
    }

    pub fn models(&self) -> &ModelFallbackSelector {
        self.models
    }

    /// Run `unit` until it succeeds, fails for a non-exhaustion reason, or the
    /// fallback list is spent. Executor errors become a failed outcome.
    ///
    /// A downgrade persists for later units; the selector is never reset here.
    #[instrument(skip_all)]
    pub fn run_unit(&self, unit: &ExecutionUnit) -> UnitOutcome {
        let preview = truncate_chars(&unit.to_string(), UNIT_PREVIEW_LEN);
        let unit_args = match unit.to_args() {
            Ok(args) => args,
            Err(e) => {
                let message = format!("{e:#}");
                warn!(err = %message, "unit rejected");
                return UnitOutcome {
                    success: false,
                    output: String::new(),
                    attempts: 0,
                    downgrades: 0,
                    failure: Some(UnitFailure::MalformedUnit(message)),
                };
            }
        };
        let mut attempts = 0u32;
        let mut downgrades = 0u32;

        loop {
            let model = self.models.current().to_string();
            attempts += 1;
            status::status(&format!("Executing with {model}: {preview}"));
            let request = self.agent.request(&model, &unit_args);

            let output = match self.executor.exec(&request) {
                Ok(output) => output,
                Err(e) => {
                    let message = format!("{e:#}");
                    warn!(model = %model, err = %message, "agent could not be run");
                    return UnitOutcome {
                        success: false,
                        output: String::new(),
                        attempts,
                        downgrades,
                        failure: Some(UnitFailure::Spawn(message)),
                    };
                }
            };

            if let Some(marker) = exhaustion_marker(&output.output) {
                warn!(model = %model, marker, "model exhausted");
                if self.models.downgrade() {
                    downgrades += 1;
                    status::status(&format!(
                        "Model {model} exhausted, switching to {}",
                        self.models.current()
                    ));
                    continue;
                }
                status::status_error(&format!("Model {model} exhausted and no fallback remains"));
                return UnitOutcome {
                    success: false,
                    output: output.output,
                    attempts,
                    downgrades,
                    failure: Some(UnitFailure::ModelsExhausted { last_model: model }),
                };
            }

            if output.success() {
                info!(model = %model, attempts, "unit succeeded");
                return UnitOutcome {
                    success: true,
                    output: output.output,
                    attempts,
                    downgrades,
                    failure: None,
                };
            }

            debug!(exit_code = ?output.exit_code, timed_out = output.timed_out, "unit failed");
            return UnitOutcome {
                success: false,
                output: output.output,
                attempts,
                downgrades,
                failure: Some(UnitFailure::ExitStatus {
                    code: output.exit_code,
                    timed_out: output.timed_out,
                }),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedExecutor, agent_command, exited, ok, selector};

    fn prompt(text: &str) -> ExecutionUnit {
        ExecutionUnit::Prompt(text.to_string())
    }

    #[test]
    fn success_on_first_model() {
        let executor = ScriptedExecutor::new(vec![ok("done")]);
        let models = selector(&["a", "b"]);
        let agent = agent_command();
        let outcome = ExecutionPipeline::new(&executor, &models, &agent).run_unit(&prompt("X"));
        assert!(outcome.success);
        assert_eq!(outcome.output, "done");
        assert_eq!(outcome.attempts, 1);
        assert_eq!(models.current(), "a");
        assert_eq!(executor.models_used(), vec!["a"]);
    }

    #[test]
    fn exhaustion_downgrades_and_retries() {
        let executor = ScriptedExecutor::new(vec![exited(1, "Error: 429 Too many requests"), ok("ok")]);
        let models = selector(&["a", "b"]);
        let agent = agent_command();
        let outcome = ExecutionPipeline::new(&executor, &models, &agent).run_unit(&prompt("X"));
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.downgrades, 1);
        assert_eq!(executor.models_used(), vec!["a", "b"]);
        assert_eq!(models.current(), "b");
    }

    #[test]
    fn two_exhaustions_walk_down_to_third_model() {
        let executor = ScriptedExecutor::new(vec![
            exited(1, "429"),
            ok("RESOURCE_EXHAUSTED"),
            ok("done"),
        ]);
        let models = selector(&["a", "b", "c"]);
        let agent = agent_command();
        let outcome = ExecutionPipeline::new(&executor, &models, &agent).run_unit(&prompt("X"));
        assert!(outcome.success);
        assert_eq!(outcome.output, "done");
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.downgrades, 2);
        assert_eq!(outcome.failure, None);
        assert_eq!(executor.models_used(), vec!["a", "b", "c"]);
        assert_eq!(models.current(), "c");
    }

    #[test]
    fn malformed_passthrough_fails_without_running_agent() {
        let executor = ScriptedExecutor::new(vec![ok("unused")]);
        let models = selector(&["a"]);
        let agent = agent_command();
        let unit = ExecutionUnit::Passthrough("--prompt \"unterminated".to_string());
        let outcome = ExecutionPipeline::new(&executor, &models, &agent).run_unit(&unit);
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 0);
        assert!(matches!(outcome.failure, Some(UnitFailure::MalformedUnit(_))));
        assert!(executor.requests().is_empty());
    }

    #[test]
    fn passthrough_quoted_value_reaches_agent_as_one_argument() {
        let executor = ScriptedExecutor::new(vec![ok("done")]);
        let models = selector(&["a"]);
        let agent = agent_command();
        let unit = ExecutionUnit::Passthrough("--prompt \"fix the bug\"".to_string());
        assert!(ExecutionPipeline::new(&executor, &models, &agent).run_unit(&unit).success);
        assert_eq!(
            executor.requests()[0].args,
            vec!["--model", "a", "--prompt", "fix the bug"]
        );
    }

    #[test]
    fn exhaustion_marker_overrides_zero_exit() {
        let executor = ScriptedExecutor::new(vec![ok("Quota exceeded for today"), ok("fine")]);
        let models = selector(&["a", "b"]);
        let agent = agent_command();
        let outcome = ExecutionPipeline::new(&executor, &models, &agent).run_unit(&prompt("X"));
        assert!(outcome.success);
        assert_eq!(executor.models_used(), vec!["a", "b"]);
    }

    #[test]
    fn fails_when_last_model_is_exhausted() {
        let executor = ScriptedExecutor::new(vec![
            exited(1, "RESOURCE_EXHAUSTED"),
            exited(1, "rate limit"),
        ]);
        let models = selector(&["a", "b"]);
        let agent = agent_command();
        let outcome = ExecutionPipeline::new(&executor, &models, &agent).run_unit(&prompt("X"));
        assert!(!outcome.success);
        assert_eq!(
            outcome.failure,
            Some(UnitFailure::ModelsExhausted {
                last_model: "b".to_string()
            })
        );
        assert_eq!(models.index(), 1);
    }

    #[test]
    fn non_exhaustion_failure_is_not_retried() {
        let executor = ScriptedExecutor::new(vec![exited(2, "syntax error"), ok("unused")]);
        let models = selector(&["a", "b"]);
        let agent = agent_command();
        let outcome = ExecutionPipeline::new(&executor, &models, &agent).run_unit(&prompt("X"));
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(
            outcome.failure,
            Some(UnitFailure::ExitStatus {
                code: Some(2),
                timed_out: false
            })
        );
        assert_eq!(models.current(), "a");
    }

    #[test]
    fn executor_error_becomes_spawn_failure() {
        let executor = ScriptedExecutor::new(Vec::new());
        let models = selector(&["a"]);
        let agent = agent_command();
        let outcome = ExecutionPipeline::new(&executor, &models, &agent).run_unit(&prompt("X"));
        assert!(!outcome.success);
        assert!(matches!(outcome.failure, Some(UnitFailure::Spawn(_))));
    }

    #[test]
    fn downgrade_persists_across_units() {
        let executor = ScriptedExecutor::new(vec![exited(1, "429"), ok("one"), ok("two")]);
        let models = selector(&["a", "b", "c"]);
        let agent = agent_command();
        let pipeline = ExecutionPipeline::new(&executor, &models, &agent);
        assert!(pipeline.run_unit(&prompt("1")).success);
        assert!(pipeline.run_unit(&prompt("2")).success);
        assert_eq!(executor.models_used(), vec!["a", "b", "b"]);
    }

    #[test]
    fn failure_messages() {
        assert_eq!(
            UnitFailure::ExitStatus {
                code: Some(3),
                timed_out: false
            }
            .to_string(),
            "agent exited with status 3"
        );
        assert_eq!(
            UnitFailure::ExitStatus {
                code: None,
                timed_out: true
            }
            .to_string(),
            "agent timed out"
        );
    }
}
