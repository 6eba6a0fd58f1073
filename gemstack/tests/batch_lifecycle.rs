//! Batch-level tests: directive text through parsing, the queue, the
//! pipeline with model fallback, and git auto-commit.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use gemstack::batch::{WorkerContext, run_batch};
use gemstack::cooldown::{CooldownGate, CooldownOverrides};
use gemstack::core::directive::parse_directives;
use gemstack::io::config::{AutoCommitConfig, CooldownConfig};
use gemstack::io::executor::{ExecOutput, ExecRequest, Executor};
use gemstack::io::git::{AutoCommitOverrides, Git, GitAutoCommit};
use gemstack::pipeline::ExecutionPipeline;
use gemstack::test_support::{
    EventLog, RecordingCommitter, RecordingSleeper, ScriptedExecutor, agent_command, exited,
    init_git_repo, ok, selector,
};
use gemstack::ui::NoProgress;

const QUEUE: &str = "\
notes above the block are ignored
GemStackSTART
PromptBlockSTART
goal \"Ship the parser\"
specify \"Tests pass\"
prompt \"Write the lexer\"
prompt \"Write the parser\"
PromptBlockEND
--checkpointing
GemStackEND
";

/// Executor that writes one file per call into the workdir.
struct FileWritingExecutor {
    calls: AtomicUsize,
}

impl Executor for FileWritingExecutor {
    fn exec(&self, request: &ExecRequest) -> Result<ExecOutput> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        fs::write(request.workdir.join(format!("unit-{n}.txt")), "work\n")?;
        Ok(ExecOutput {
            exit_code: Some(0),
            output: format!("wrote unit-{n}.txt"),
            timed_out: false,
        })
    }
}

/// Three units; the first model hits its quota on the second unit.
///
/// Expected: every unit runs in file order, the downgrade sticks for the
/// third unit, cooldown runs twice, and each success is committed.
#[test]
fn queue_runs_in_order_with_sticky_fallback() {
    let outcome = parse_directives(QUEUE);
    assert!(outcome.warnings.is_empty());
    assert_eq!(outcome.units.len(), 3);

    let events = EventLog::default();
    let executor = ScriptedExecutor::new(vec![
        ok("lexer done"),
        exited(1, "Error 429: Too many requests"),
        ok("parser done"),
        ok("flag accepted"),
    ])
    .with_events(events.clone());
    let models = selector(&["pro", "flash"]);
    let agent = agent_command();
    let committer = RecordingCommitter::default();
    let cooldown = CooldownGate::with_sleeper(
        CooldownConfig {
            enabled: true,
            seconds: 0,
        },
        CooldownOverrides::default(),
        RecordingSleeper::with_events(events.clone()),
    );
    let ctx = WorkerContext {
        pipeline: ExecutionPipeline::new(&executor, &models, &agent),
        committer: &committer,
        cooldown: &cooldown,
        progress: &NoProgress,
    };

    let report = run_batch(outcome.units, &ctx);

    assert_eq!(report.executed, 3);
    assert!(report.all_succeeded());
    assert_eq!(executor.models_used(), vec!["pro", "pro", "flash", "flash"]);

    let sent = executor.last_args();
    assert!(sent[0].starts_with("GOAL: Ship the parser\n\nCHECKPOINT:"));
    assert!(sent[0].ends_with("Write the lexer"));
    assert_eq!(sent[2], "GOAL: Ship the parser\n\nCURRENT TASK: Write the parser");
    assert_eq!(sent[3], "--checkpointing");

    let sleeps: Vec<_> = events
        .snapshot()
        .into_iter()
        .filter(|e| e.starts_with("sleep:"))
        .collect();
    assert_eq!(sleeps, vec!["sleep:60", "sleep:60"]);
    assert_eq!(
        committer.commits(),
        vec!["Write the lexer", "Write the parser", "--checkpointing"]
    );
}

/// Fallback list spent on the first unit; later units still run on the
/// last model.
#[test]
fn exhausted_unit_does_not_stop_the_queue() {
    let outcome = parse_directives("GemStackSTART\nprompt \"a\"\nprompt \"b\"\nGemStackEND");
    let executor = ScriptedExecutor::new(vec![
        exited(1, "quota exceeded"),
        exited(1, "RESOURCE_EXHAUSTED"),
        ok("b done"),
    ]);
    let models = selector(&["pro", "flash"]);
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

    let report = run_batch(outcome.units, &ctx);

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].reason.contains("all models exhausted"));
    assert_eq!(executor.models_used(), vec!["pro", "flash", "flash"]);
    assert_eq!(committer.commits(), vec!["b"]);
}

/// Real git: each successful unit becomes one commit with a bounded subject.
#[test]
fn auto_commit_records_each_unit() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_git_repo(temp.path());

    let long_prompt = format!("Refactor {}", "the module ".repeat(10));
    let text = format!("GemStackSTART\nprompt \"Add docs\"\nprompt \"{long_prompt}\"\nGemStackEND");
    let outcome = parse_directives(&text);

    let executor = FileWritingExecutor {
        calls: AtomicUsize::new(0),
    };
    let models = selector(&["m"]);
    let mut agent = agent_command();
    agent.workdir = temp.path().to_path_buf();
    let git = Git::new(temp.path());
    let committer = GitAutoCommit::new(
        git.clone(),
        AutoCommitConfig {
            enabled: true,
            ..AutoCommitConfig::default()
        },
        AutoCommitOverrides::default(),
    );
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

    let report = run_batch(outcome.units, &ctx);
    assert!(report.all_succeeded());

    let subject = git.head_subject().expect("subject");
    assert_eq!(subject.chars().count(), 72);
    assert!(subject.starts_with("[GemStack] Refactor the module"));
    assert!(subject.ends_with("..."));
    assert!(!git.has_changes().expect("status"));
}
