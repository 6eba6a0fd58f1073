//! Reflective-mode lifecycle tests against scripted agent responses.

use std::fs;

use gemstack::cooldown::{CooldownGate, CooldownOverrides};
use gemstack::io::config::{CooldownConfig, GemStackPaths};
use gemstack::pipeline::ExecutionPipeline;
use gemstack::reflect::{ReflectionController, ReflectionStop};
use gemstack::test_support::{
    RecordingCommitter, RecordingSleeper, ScriptedExecutor, agent_command, exited, ok, selector,
};

/// Three iterations with a quota hit during the second meta-query.
///
/// Execution sequence:
/// 1. goal on `pro` -> success
/// 2. meta-query on `pro` -> 429, downgrade, retry on `flash` -> next step
/// 3. iteration 2 on `flash` -> success
/// 4. meta-query -> next step
/// 5. iteration 3 -> success, no further meta-query
#[test]
fn full_session_writes_log_after_every_iteration() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = GemStackPaths::new(temp.path());
    let executor = ScriptedExecutor::new(vec![
        ok("[GemStack] noise\n=====\nScaffolded the crate"),
        exited(1, "429 Too Many Requests"),
        ok("Add a config loader"),
        ok("Config loader added"),
        ok("Write integration tests"),
        ok("Tests written"),
    ]);
    let models = selector(&["pro", "flash"]);
    let agent = agent_command();
    let committer = RecordingCommitter::default();
    let cooldown = CooldownGate::with_sleeper(
        CooldownConfig::default(),
        CooldownOverrides {
            enabled: Some(true),
            seconds: Some(1),
        },
        RecordingSleeper::default(),
    );
    let controller = ReflectionController::new(
        ExecutionPipeline::new(&executor, &models, &agent),
        &committer,
        &cooldown,
        paths.clone(),
    );

    let outcome = controller.run("Build a config-driven CLI", 3).expect("run");

    assert_eq!(outcome.stop, ReflectionStop::MaxIterations);
    assert_eq!(outcome.iterations_run, 3);
    let summaries: Vec<_> = outcome.entries.iter().map(|e| e.summary.as_str()).collect();
    assert_eq!(
        summaries,
        vec!["Scaffolded the crate", "Config loader added", "Tests written"]
    );
    assert_eq!(
        committer.commits(),
        vec![
            "Build a config-driven CLI",
            "Add a config loader",
            "Write integration tests"
        ]
    );
    assert_eq!(
        executor.models_used(),
        vec!["pro", "pro", "flash", "flash", "flash", "flash"]
    );
    assert_eq!(cooldown.sleeper().recorded().len(), 2);

    let last_prompt = executor.last_args().pop().expect("prompt");
    assert!(last_prompt.contains("1. Build a config-driven CLI\n   Result: Scaffolded the crate"));
    assert!(last_prompt.contains("2. Add a config loader\n   Result: Config loader added"));
    assert!(last_prompt.ends_with("CURRENT TASK: Write integration tests"));

    let log = fs::read_to_string(&paths.session_log_path).expect("log");
    assert!(log.contains("Goal: Build a config-driven CLI"));
    assert_eq!(log.matches("[OK]").count(), 3);

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&paths.session_json_path).expect("json"))
            .expect("parse");
    assert_eq!(json["entries"][2]["prompt"], "Write integration tests");
}

#[test]
fn all_models_exhausted_stops_as_execution_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    let executor = ScriptedExecutor::new(vec![exited(1, "rate limit"), exited(1, "rate limit")]);
    let models = selector(&["pro", "flash"]);
    let agent = agent_command();
    let committer = RecordingCommitter::default();
    let cooldown = CooldownGate::with_sleeper(
        CooldownConfig::default(),
        CooldownOverrides::default(),
        RecordingSleeper::default(),
    );
    let controller = ReflectionController::new(
        ExecutionPipeline::new(&executor, &models, &agent),
        &committer,
        &cooldown,
        GemStackPaths::new(temp.path()),
    );

    let outcome = controller.run("Goal", 4).expect("run");
    assert_eq!(outcome.stop, ReflectionStop::ExecutionFailed { iteration: 1 });
    assert!(outcome.entries[0].summary.starts_with("Failed: all models exhausted"));
    assert!(committer.commits().is_empty());
}
