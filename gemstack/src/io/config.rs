//! Gemstack configuration stored under `.gemstack/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const STATE_DIR: &str = ".gemstack";
pub const DEFAULT_DIRECTIVE_FILE: &str = "GemStackQueue.txt";

/// Well-known paths under a working directory.
#[derive(Debug, Clone)]
pub struct GemStackPaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub session_log_path: PathBuf,
    pub session_json_path: PathBuf,
}

impl GemStackPaths {
    pub fn new(root: &Path) -> Self {
        let state_dir = root.join(STATE_DIR);
        Self {
            root: root.to_path_buf(),
            config_path: state_dir.join("config.toml"),
            session_log_path: state_dir.join("reflection_session.log"),
            session_json_path: state_dir.join("reflection_session.json"),
            state_dir,
        }
    }

    pub fn directive_file(&self) -> PathBuf {
        self.root.join(DEFAULT_DIRECTIVE_FILE)
    }
}

/// Gemstack configuration (TOML).
///
/// Every section is optional; missing fields take the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GemStackConfig {
    pub models: ModelsConfig,
    pub agent: AgentConfig,
    pub cooldown: CooldownConfig,
    pub auto_commit: AutoCommitConfig,
    pub reflection: ReflectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelsConfig {
    /// Model identifiers, best first. Exhaustion moves down this list.
    pub fallback: Vec<String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            fallback: [
                "gemini-3-pro-preview",
                "gemini-2.5-pro",
                "gemini-2.5-flash",
                "gemini-2.5-flash-lite",
            ]
            .map(str::to_string)
            .to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Interpreter used to launch the agent.
    pub program: String,
    /// Pass an entry script as the first argument.
    pub use_entry: bool,
    /// Entry script. Resolved by `io::locator` when unset.
    pub entry: Option<PathBuf>,
    /// Arguments placed before the model flag.
    pub args: Vec<String>,
    pub model_flag: String,
    /// Wall-clock limit for one agent invocation.
    pub timeout_secs: u64,
    /// Agent output retained in memory beyond this many bytes is dropped.
    pub output_limit_bytes: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: "node".to_string(),
            use_entry: true,
            entry: None,
            args: vec!["--yolo".to_string()],
            model_flag: "--model".to_string(),
            timeout_secs: 60 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CooldownConfig {
    pub enabled: bool,
    /// Non-positive values are treated as the default.
    pub seconds: i64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutoCommitConfig {
    pub enabled: bool,
    pub message_prefix: String,
    /// Put the executed prompt into the commit subject.
    pub include_prompt: bool,
}

impl Default for AutoCommitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            message_prefix: "[GemStack]".to_string(),
            include_prompt: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReflectionConfig {
    pub max_iterations: u32,
    pub summary_max_len: usize,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            summary_max_len: crate::core::summary::DEFAULT_SUMMARY_LEN,
        }
    }
}

impl GemStackConfig {
    pub fn validate(&self) -> Result<()> {
        if self.models.fallback.is_empty() {
            return Err(anyhow!("models.fallback must be a non-empty array"));
        }
        if self.models.fallback.iter().any(|m| m.trim().is_empty()) {
            return Err(anyhow!("models.fallback entries must not be blank"));
        }
        if self.agent.program.trim().is_empty() {
            return Err(anyhow!("agent.program must not be empty"));
        }
        if self.agent.model_flag.trim().is_empty() {
            return Err(anyhow!("agent.model_flag must not be empty"));
        }
        if self.agent.timeout_secs == 0 {
            return Err(anyhow!("agent.timeout_secs must be > 0"));
        }
        if self.agent.output_limit_bytes == 0 {
            return Err(anyhow!("agent.output_limit_bytes must be > 0"));
        }
        if self.reflection.max_iterations == 0 {
            return Err(anyhow!("reflection.max_iterations must be > 0"));
        }
        if self.reflection.summary_max_len < 4 {
            return Err(anyhow!("reflection.summary_max_len must be >= 4"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `GemStackConfig::default()`.
pub fn load_config(path: &Path) -> Result<GemStackConfig> {
    if !path.exists() {
        let cfg = GemStackConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: GemStackConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &GemStackConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write `contents` to `path` via a sibling temp file and rename.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
