//! I/O helpers for gemstack commands.

pub mod config;
pub mod directive_file;
pub mod executor;
pub mod git;
pub mod locator;
pub mod process;
pub mod prompt;
pub mod session_log;
pub mod status;
