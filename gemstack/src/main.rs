//! Prompt queue orchestrator for an external AI coding agent.
//!
//! Reads `GemStackQueue.txt` (or stdin) and feeds each unit to the agent,
//! downgrading through the configured models on rate-limit exhaustion.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::warn;

use gemstack::batch::{BatchReport, WorkerContext, run_batch, run_interactive};
use gemstack::cooldown::{CooldownGate, CooldownOverrides};
use gemstack::core::directive::ParseOutcome;
use gemstack::core::fallback::ModelFallbackSelector;
use gemstack::exit_codes;
use gemstack::io::config::{GemStackConfig, GemStackPaths, load_config, write_atomic, write_config};
use gemstack::io::directive_file::load_directives;
use gemstack::io::executor::{AgentCommand, ProcessExecutor};
use gemstack::io::git::{AutoCommitOverrides, Git, GitAutoCommit};
use gemstack::io::locator::{ENTRY_ENV, locate_agent_entry};
use gemstack::io::status;
use gemstack::logging;
use gemstack::pipeline::ExecutionPipeline;
use gemstack::reflect::{ReflectionController, ReflectionStop};
use gemstack::ui::StatusLine;

const SAMPLE_QUEUE: &str = include_str!("io/prompts/sample_queue.txt");

#[derive(Parser)]
#[command(
    name = "gemstack",
    version,
    about = "Queue prompts for an AI coding agent with automatic model fallback"
)]
struct Cli {
    /// Directory the agent works in (defaults to the current directory).
    #[arg(long, global = true, value_name = "DIR")]
    workdir: Option<PathBuf>,

    /// Config file (defaults to `.gemstack/config.toml` in the workdir).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config and a sample directive file if missing.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Parse a directive file and print the units it yields.
    Plan {
        /// Directive file (defaults to `GemStackQueue.txt`).
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Execute the directive file, or read units from stdin when it has none.
    Run {
        /// Directive file (defaults to `GemStackQueue.txt`).
        #[arg(short, long)]
        file: Option<PathBuf>,

        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Work toward a goal by letting the agent choose each next step.
    Reflect {
        goal: String,

        /// Maximum iterations (defaults to `reflection.max_iterations`).
        #[arg(short = 'n', long)]
        iterations: Option<u32>,

        #[command(flatten)]
        overrides: OverrideArgs,
    },
}

/// Per-invocation overrides; each takes precedence over the config file.
#[derive(Args, Debug, Default, Clone)]
struct OverrideArgs {
    /// Pause between agent invocations.
    #[arg(long, conflicts_with = "no_cooldown")]
    cooldown: bool,

    /// Never pause between agent invocations.
    #[arg(long)]
    no_cooldown: bool,

    /// Pause length; zero or negative means 60.
    #[arg(long, value_name = "SECS", allow_negative_numbers = true)]
    cooldown_seconds: Option<i64>,

    /// Commit the agent's changes after each successful unit.
    #[arg(long, conflicts_with = "no_auto_commit")]
    auto_commit: bool,

    /// Never commit automatically.
    #[arg(long)]
    no_auto_commit: bool,

    /// Commit subject prefix.
    #[arg(long, value_name = "PREFIX")]
    commit_prefix: Option<String>,

    /// Leave the prompt out of commit subjects.
    #[arg(long)]
    commit_without_prompt: bool,
}

impl OverrideArgs {
    fn cooldown(&self) -> CooldownOverrides {
        CooldownOverrides {
            enabled: flag_pair(self.cooldown, self.no_cooldown),
            seconds: self.cooldown_seconds,
        }
    }

    fn auto_commit(&self) -> AutoCommitOverrides {
        AutoCommitOverrides {
            enabled: flag_pair(self.auto_commit, self.no_auto_commit),
            message_prefix: self.commit_prefix.clone(),
            include_prompt: self.commit_without_prompt.then_some(false),
        }
    }
}

fn flag_pair(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let workdir = match cli.workdir {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolve current directory")?,
    };
    let paths = GemStackPaths::new(&workdir);
    let config_path = cli.config.unwrap_or_else(|| paths.config_path.clone());

    match cli.command {
        Command::Init { force } => cmd_init(&paths, &config_path, force),
        Command::Plan { file } => cmd_plan(&resolve_file(&paths, file)),
        Command::Run { file, overrides } => {
            let config = load_config(&config_path)?;
            cmd_run(&paths, &config, &resolve_file(&paths, file), &overrides)
        }
        Command::Reflect {
            goal,
            iterations,
            overrides,
        } => {
            let config = load_config(&config_path)?;
            cmd_reflect(&paths, &config, &goal, iterations, &overrides)
        }
    }
}

fn resolve_file(paths: &GemStackPaths, file: Option<PathBuf>) -> PathBuf {
    match file {
        Some(file) if file.is_relative() => paths.root.join(file),
        Some(file) => file,
        None => paths.directive_file(),
    }
}

fn cmd_init(paths: &GemStackPaths, config_path: &Path, force: bool) -> Result<i32> {
    if force || !config_path.exists() {
        write_config(config_path, &GemStackConfig::default())?;
        status::status(&format!("Wrote {}", config_path.display()));
    }
    let queue_path = paths.directive_file();
    if force || !queue_path.exists() {
        write_atomic(&queue_path, SAMPLE_QUEUE)?;
        status::status(&format!("Wrote {}", queue_path.display()));
    }
    Ok(exit_codes::OK)
}

fn cmd_plan(file: &Path) -> Result<i32> {
    let Some(outcome) = load_directives(file)? else {
        status::status(&format!("No directive file at {}", file.display()));
        return Ok(exit_codes::NO_WORK);
    };
    report_warnings(&outcome);
    if !outcome.has_units() {
        status::status("No execution units found");
        return Ok(exit_codes::NO_WORK);
    }
    for (idx, unit) in outcome.units.iter().enumerate() {
        println!("{}. {}", idx + 1, unit);
    }
    Ok(exit_codes::OK)
}

fn cmd_run(
    paths: &GemStackPaths,
    config: &GemStackConfig,
    file: &Path,
    overrides: &OverrideArgs,
) -> Result<i32> {
    let units = match load_directives(file)? {
        Some(outcome) => {
            report_warnings(&outcome);
            outcome.units
        }
        None => Vec::new(),
    };

    let models = ModelFallbackSelector::new(config.models.fallback.clone())?;
    let agent = agent_command(config, &paths.root)?;
    let executor = ProcessExecutor;
    let committer = GitAutoCommit::new(
        Git::new(&paths.root),
        config.auto_commit.clone(),
        overrides.auto_commit(),
    );
    let cooldown = CooldownGate::new(config.cooldown.clone(), overrides.cooldown());
    let progress = StatusLine::new();
    let ctx = WorkerContext {
        pipeline: ExecutionPipeline::new(&executor, &models, &agent),
        committer: &committer,
        cooldown: &cooldown,
        progress: &progress,
    };

    let report = if units.is_empty() {
        status::status(&format!(
            "No units in {}, reading from stdin",
            file.display()
        ));
        run_interactive(io::stdin().lock(), &ctx)?
    } else {
        run_batch(units, &ctx)
    };
    drop(progress);

    Ok(report_batch(&report))
}

fn cmd_reflect(
    paths: &GemStackPaths,
    config: &GemStackConfig,
    goal: &str,
    iterations: Option<u32>,
    overrides: &OverrideArgs,
) -> Result<i32> {
    let max_iterations = iterations.unwrap_or(config.reflection.max_iterations);
    if max_iterations == 0 {
        bail!("--iterations must be > 0");
    }
    fs::create_dir_all(&paths.state_dir)
        .with_context(|| format!("create {}", paths.state_dir.display()))?;

    let models = ModelFallbackSelector::new(config.models.fallback.clone())?;
    let agent = agent_command(config, &paths.root)?;
    let executor = ProcessExecutor;
    let committer = GitAutoCommit::new(
        Git::new(&paths.root),
        config.auto_commit.clone(),
        overrides.auto_commit(),
    );
    let cooldown = CooldownGate::new(config.cooldown.clone(), overrides.cooldown());
    let controller = ReflectionController::new(
        ExecutionPipeline::new(&executor, &models, &agent),
        &committer,
        &cooldown,
        paths.clone(),
    )
    .with_summary_len(config.reflection.summary_max_len);

    let outcome = controller.run(goal, max_iterations)?;
    let reason = match &outcome.stop {
        ReflectionStop::MaxIterations => "reached max iterations".to_string(),
        ReflectionStop::ExecutionFailed { iteration } => {
            format!("iteration {iteration} failed")
        }
        ReflectionStop::NextPromptFailed { iteration } => {
            format!("could not generate a next step after iteration {iteration}")
        }
        ReflectionStop::EmptyNextPrompt { iteration } => {
            format!("no next step after iteration {iteration}")
        }
    };
    status::status(&format!(
        "Reflection finished after {} iteration(s): {reason}",
        outcome.iterations_run
    ));
    status::status(&format!(
        "Session log: {}",
        paths.session_log_path.display()
    ));

    if outcome.stop.is_failure() {
        Ok(exit_codes::UNIT_FAILED)
    } else {
        Ok(exit_codes::OK)
    }
}

fn agent_command(config: &GemStackConfig, workdir: &Path) -> Result<AgentCommand> {
    let entry = if config.agent.use_entry {
        let entry = locate_agent_entry(config.agent.entry.as_deref())?;
        if !entry.exists() {
            bail!(
                "agent entry not found at {} (set {ENTRY_ENV} or agent.entry in the config)",
                entry.display()
            );
        }
        Some(entry)
    } else {
        None
    };
    Ok(AgentCommand::from_config(
        &config.agent,
        entry,
        workdir.to_path_buf(),
    ))
}

fn report_warnings(outcome: &ParseOutcome) {
    for warning in &outcome.warnings {
        warn!(%warning, "directive warning");
        status::status_warn(&warning.to_string());
    }
}

fn report_batch(report: &BatchReport) -> i32 {
    status::status(&format!(
        "Executed {} unit(s): {} succeeded, {} failed",
        report.executed,
        report.succeeded,
        report.failed.len()
    ));
    for failed in &report.failed {
        status::status_error(&format!("{} ({})", failed.unit, failed.reason));
    }
    if report.all_succeeded() {
        exit_codes::OK
    } else {
        exit_codes::UNIT_FAILED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["gemstack", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_plan_with_file_and_global_workdir() {
        let cli = Cli::parse_from(["gemstack", "plan", "--file", "q.txt", "--workdir", "/w"]);
        assert_eq!(cli.workdir, Some(PathBuf::from("/w")));
        match cli.command {
            Command::Plan { file } => assert_eq!(file, Some(PathBuf::from("q.txt"))),
            _ => panic!("expected plan"),
        }
    }

    #[test]
    fn parse_run_overrides() {
        let cli = Cli::parse_from([
            "gemstack",
            "run",
            "--cooldown",
            "--cooldown-seconds",
            "-5",
            "--no-auto-commit",
            "--commit-prefix",
            "[Bot]",
            "--commit-without-prompt",
        ]);
        let Command::Run { overrides, .. } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(
            overrides.cooldown(),
            CooldownOverrides {
                enabled: Some(true),
                seconds: Some(-5),
            }
        );
        assert_eq!(
            overrides.auto_commit(),
            AutoCommitOverrides {
                enabled: Some(false),
                message_prefix: Some("[Bot]".to_string()),
                include_prompt: Some(false),
            }
        );
    }

    #[test]
    fn no_flags_means_no_overrides() {
        let overrides = OverrideArgs::default();
        assert_eq!(overrides.cooldown(), CooldownOverrides::default());
        assert_eq!(overrides.auto_commit(), AutoCommitOverrides::default());
    }

    #[test]
    fn conflicting_flags_are_rejected() {
        assert!(Cli::try_parse_from(["gemstack", "run", "--cooldown", "--no-cooldown"]).is_err());
    }

    #[test]
    fn parse_reflect() {
        let cli = Cli::parse_from(["gemstack", "reflect", "Build a CLI", "-n", "3"]);
        match cli.command {
            Command::Reflect {
                goal, iterations, ..
            } => {
                assert_eq!(goal, "Build a CLI");
                assert_eq!(iterations, Some(3));
            }
            _ => panic!("expected reflect"),
        }
    }

    #[test]
    fn relative_file_resolves_against_workdir() {
        let paths = GemStackPaths::new(Path::new("/w"));
        assert_eq!(
            resolve_file(&paths, Some(PathBuf::from("q.txt"))),
            PathBuf::from("/w/q.txt")
        );
        assert_eq!(resolve_file(&paths, None), PathBuf::from("/w/GemStackQueue.txt"));
    }
}
