//! Resolve the agent entry script.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use tracing::debug;

/// Environment variable that overrides every other entry source.
pub const ENTRY_ENV: &str = "GEMSTACK_AGENT_ENTRY";

/// Default entry relative to the home directory.
pub const DEFAULT_ENTRY: [&str; 3] = [".gemstack", "gemini-cli", "gemini.js"];

/// Resolve the entry path: env override, then config, then the home default.
pub fn resolve_agent_entry(
    env_override: Option<&str>,
    configured: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(value) = env_override.map(str::trim).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(value));
    }
    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }
    let Some(home) = home else {
        bail!(
            "cannot locate agent entry: no home directory (HOME, USERPROFILE or HOMEDRIVE+HOMEPATH); set {ENTRY_ENV} or agent.entry"
        );
    };
    Ok(DEFAULT_ENTRY.iter().fold(home.to_path_buf(), |p, c| p.join(c)))
}

/// Home directory from `HOME`, then `USERPROFILE`, then `HOMEDRIVE` + `HOMEPATH`.
/// Empty values are skipped.
pub fn home_dir_from(
    home: Option<OsString>,
    user_profile: Option<OsString>,
    home_drive: Option<OsString>,
    home_path: Option<OsString>,
) -> Option<PathBuf> {
    let non_empty = |v: Option<OsString>| v.filter(|v| !v.is_empty());
    if let Some(home) = non_empty(home).or_else(|| non_empty(user_profile)) {
        return Some(PathBuf::from(home));
    }
    let (Some(drive), Some(path)) = (non_empty(home_drive), non_empty(home_path)) else {
        return None;
    };
    let mut joined = drive;
    joined.push(path);
    Some(PathBuf::from(joined))
}

/// Resolve against the real process environment.
pub fn locate_agent_entry(configured: Option<&Path>) -> Result<PathBuf> {
    let env_override = env::var(ENTRY_ENV).ok();
    let home = home_dir_from(
        env::var_os("HOME"),
        env::var_os("USERPROFILE"),
        env::var_os("HOMEDRIVE"),
        env::var_os("HOMEPATH"),
    );
    let entry = resolve_agent_entry(env_override.as_deref(), configured, home.as_deref())?;
    debug!(entry = %entry.display(), "agent entry resolved");
    Ok(entry)
}
