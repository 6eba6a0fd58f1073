//! Batch and interactive drivers around the single consumer thread.

use std::io::BufRead;
use std::panic;
use std::thread;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cooldown::{CooldownGate, Sleeper, ThreadSleeper};
use crate::core::directive::interactive_unit;
use crate::core::types::ExecutionUnit;
use crate::io::executor::Executor;
use crate::io::git::Committer;
use crate::io::status;
use crate::pipeline::ExecutionPipeline;
use crate::queue::TaskQueue;
use crate::ui::ProgressReporter;

/// Everything the consumer needs besides the queue.
pub struct WorkerContext<'a, E: Executor, S: Sleeper = ThreadSleeper> {
    pub pipeline: ExecutionPipeline<'a, E>,
    pub committer: &'a dyn Committer,
    pub cooldown: &'a CooldownGate<S>,
    pub progress: &'a dyn ProgressReporter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUnit {
    pub unit: ExecutionUnit,
    pub reason: String,
}

/// Summary of a drained queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub executed: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedUnit>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Consume units until the queue is shut down and drained.
///
/// A failed unit is recorded and the loop moves on. Cooldown runs only
/// between units, never after the last queued one.
pub fn run_worker<E: Executor, S: Sleeper>(
    queue: &TaskQueue<ExecutionUnit>,
    ctx: &WorkerContext<'_, E, S>,
) -> BatchReport {
    let mut report = BatchReport::default();
    while let Some(unit) = queue.pop_blocking() {
        report.executed += 1;
        ctx.progress.increment_task_progress();
        ctx.progress.start_animation();
        let outcome = ctx.pipeline.run_unit(&unit);
        ctx.progress.stop_animation();

        if outcome.success {
            report.succeeded += 1;
            if let Err(e) = ctx.committer.maybe_commit(unit.task()) {
                warn!(err = %e, "auto-commit failed");
                status::status_warn(&format!("auto-commit failed: {e:#}"));
            }
        } else {
            let reason = outcome
                .failure
                .map_or_else(|| "unknown failure".to_string(), |f| f.to_string());
            status::status_error(&format!("Unit failed: {reason}"));
            report.failed.push(FailedUnit { unit, reason });
        }

        if !queue.is_empty() {
            ctx.cooldown.perform_cooldown();
        }
    }
    info!(
        executed = report.executed,
        succeeded = report.succeeded,
        failed = report.failed.len(),
        "queue drained"
    );
    report
}

/// Queue every unit, close the queue, and wait for the consumer to drain it.
pub fn run_batch<E, S>(units: Vec<ExecutionUnit>, ctx: &WorkerContext<'_, E, S>) -> BatchReport
where
    E: Executor + Sync,
    S: Sleeper + Sync,
{
    let queue = TaskQueue::new();
    ctx.progress.set_total_tasks(units.len());
    status::status(&format!("Queued {} unit(s)", units.len()));
    for unit in units {
        queue.push(unit);
    }
    queue.shutdown();

    thread::scope(|scope| {
        let worker = scope.spawn(|| run_worker(&queue, ctx));
        worker.join().unwrap_or_else(|payload| panic::resume_unwind(payload))
    })
}

/// Feed units from `reader` line by line while the consumer executes them.
///
/// `exit`, `quit` or end of input stop reading; queued units still run.
pub fn run_interactive<R, E, S>(reader: R, ctx: &WorkerContext<'_, E, S>) -> Result<BatchReport>
where
    R: BufRead,
    E: Executor + Sync,
    S: Sleeper + Sync,
{
    let queue = TaskQueue::new();
    status::status("Interactive mode: enter a command or prompt \"...\"; 'exit' to finish");

    thread::scope(|scope| {
        let worker = scope.spawn(|| run_worker(&queue, ctx));
        let fed = feed_lines(reader, &queue, ctx.progress);
        queue.shutdown();
        let report = worker
            .join()
            .unwrap_or_else(|payload| panic::resume_unwind(payload));
        fed.map(|()| report)
    })
}

fn feed_lines<R: BufRead>(
    reader: R,
    queue: &TaskQueue<ExecutionUnit>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let mut total = 0usize;
    for line in reader.lines() {
        let line = line.context("read interactive input")?;
        let trimmed = line.trim();
        if trimmed == "exit" || trimmed == "quit" {
            break;
        }
        let Some(unit) = interactive_unit(trimmed) else {
            continue;
        };
        total += 1;
        progress.set_total_tasks(total);
        queue.push(unit);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use super::*;
    use crate::cooldown::CooldownOverrides;
    use crate::core::directive::parse_directives;
    use crate::io::config::CooldownConfig;
    use crate::test_support::{
        EventLog, RecordingCommitter, RecordingSleeper, ScriptedExecutor, agent_command, exited,
        ok, selector,
    };
    use crate::ui::NoProgress;

    fn enabled_cooldown(events: &EventLog) -> CooldownGate<RecordingSleeper> {
        CooldownGate::with_sleeper(
            CooldownConfig {
                enabled: true,
                seconds: 7,
            },
            CooldownOverrides::default(),
            RecordingSleeper::with_events(events.clone()),
        )
    }

    fn prompts(texts: &[&str]) -> Vec<ExecutionUnit> {
        texts
            .iter()
            .map(|t| ExecutionUnit::Prompt((*t).to_string()))
            .collect()
    }

    #[test]
    fn executes_in_order_with_cooldown_between_units_only() {
        let events = EventLog::default();
        let executor =
            ScriptedExecutor::new(vec![ok("1"), ok("2"), ok("3")]).with_events(events.clone());
        let models = selector(&["m"]);
        let agent = agent_command();
        let committer = RecordingCommitter::default();
        let cooldown = enabled_cooldown(&events);
        let ctx = WorkerContext {
            pipeline: ExecutionPipeline::new(&executor, &models, &agent),
            committer: &committer,
            cooldown: &cooldown,
            progress: &NoProgress,
        };

        let report = run_batch(prompts(&["a", "b", "c"]), &ctx);

        assert_eq!(report.executed, 3);
        assert_eq!(report.succeeded, 3);
        assert!(report.all_succeeded());
        assert_eq!(
            events.snapshot(),
            vec!["exec:a", "sleep:7", "exec:b", "sleep:7", "exec:c"]
        );
        assert_eq!(committer.commits(), vec!["a", "b", "c"]);
        assert_eq!(
            cooldown.sleeper().recorded(),
            vec![Duration::from_secs(7); 2]
        );
    }

    #[test]
    fn failure_does_not_stop_later_units() {
        let executor = ScriptedExecutor::new(vec![ok("1"), exited(1, "boom"), ok("3")]);
        let models = selector(&["m"]);
        let agent = agent_command();
        let committer = RecordingCommitter::default();
        let cooldown = CooldownGate::with_sleeper(
            CooldownConfig::default(),
            CooldownOverrides::default(),
            RecordingSleeper::default(),
        );
        let ctx = WorkerContext {
            pipeline: ExecutionPipeline::new(&executor, &models, &agent),
            committer: &committer,
            cooldown: &cooldown,
            progress: &NoProgress,
        };

        let report = run_batch(prompts(&["a", "b", "c"]), &ctx);

        assert_eq!(report.executed, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].unit, ExecutionUnit::Prompt("b".to_string()));
        assert_eq!(report.failed[0].reason, "agent exited with status 1");
        assert_eq!(committer.commits(), vec!["a", "c"]);
        assert!(cooldown.sleeper().recorded().is_empty());
    }

    #[test]
    fn scoped_prompt_commits_with_raw_task() {
        let executor = ScriptedExecutor::new(vec![ok("done")]);
        let models = selector(&["m"]);
        let agent = agent_command();
        let committer = RecordingCommitter::default();
        let cooldown = CooldownGate::with_sleeper(
            CooldownConfig::default(),
            CooldownOverrides::default(),
            RecordingSleeper::default(),
        );
        let ctx = WorkerContext {
            pipeline: ExecutionPipeline::new(&executor, &models, &agent),
            committer: &committer,
            cooldown: &cooldown,
            progress: &NoProgress,
        };
        let units = parse_directives(
            "GemStackSTART\nPromptBlockSTART\ngoal \"Ship v2\"\nspecify \"CI green\"\nprompt \"Bump version\"\nPromptBlockEND\nGemStackEND",
        )
        .units;

        let report = run_batch(units, &ctx);

        assert!(report.all_succeeded());
        assert_eq!(committer.commits(), vec!["Bump version"]);
        assert!(executor.last_args()[0].starts_with("GOAL: Ship v2"));
    }

    #[test]
    fn commit_failure_is_not_a_unit_failure() {
        let executor = ScriptedExecutor::new(vec![ok("1")]);
        let models = selector(&["m"]);
        let agent = agent_command();
        let committer = RecordingCommitter::failing();
        let cooldown = CooldownGate::with_sleeper(
            CooldownConfig::default(),
            CooldownOverrides::default(),
            RecordingSleeper::default(),
        );
        let ctx = WorkerContext {
            pipeline: ExecutionPipeline::new(&executor, &models, &agent),
            committer: &committer,
            cooldown: &cooldown,
            progress: &NoProgress,
        };
        let report = run_batch(prompts(&["a"]), &ctx);
        assert!(report.all_succeeded());
    }

    #[test]
    fn interactive_reads_until_exit() {
        let executor = ScriptedExecutor::new(vec![ok("1"), ok("2")]);
        let models = selector(&["m"]);
        let agent = agent_command();
        let committer = RecordingCommitter::default();
        let cooldown = CooldownGate::with_sleeper(
            CooldownConfig::default(),
            CooldownOverrides::default(),
            RecordingSleeper::default(),
        );
        let ctx = WorkerContext {
            pipeline: ExecutionPipeline::new(&executor, &models, &agent),
            committer: &committer,
            cooldown: &cooldown,
            progress: &NoProgress,
        };

        let input = Cursor::new("prompt \"Fix it\"\n\n--version\nexit\nprompt \"ignored\"\n");
        let report = run_interactive(input, &ctx).expect("interactive");

        assert_eq!(report.executed, 2);
        let requests = executor.requests();
        assert_eq!(requests[0].args[requests[0].args.len() - 2..], ["prompt", "Fix it"]);
        assert_eq!(requests[1].args.last().map(String::as_str), Some("--version"));
    }

    #[test]
    fn interactive_stops_at_end_of_input() {
        let executor = ScriptedExecutor::new(vec![ok("1")]);
        let models = selector(&["m"]);
        let agent = agent_command();
        let committer = RecordingCommitter::default();
        let cooldown = CooldownGate::with_sleeper(
            CooldownConfig::default(),
            CooldownOverrides::default(),
            RecordingSleeper::default(),
        );
        let ctx = WorkerContext {
            pipeline: ExecutionPipeline::new(&executor, &models, &agent),
            committer: &committer,
            cooldown: &cooldown,
            progress: &NoProgress,
        };
        let report = run_interactive(Cursor::new("quit-not\n"), &ctx).expect("interactive");
        assert_eq!(report.executed, 1);
    }
}
