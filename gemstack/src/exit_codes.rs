//! Stable exit codes for gemstack CLI commands.

/// Command succeeded; every executed unit succeeded.
pub const OK: i32 = 0;
/// Command failed due to invalid config, unreadable input or other errors.
pub const INVALID: i32 = 1;
/// `gemstack plan` found no units in the directive file.
pub const NO_WORK: i32 = 2;
/// At least one unit (or reflective iteration) failed.
pub const UNIT_FAILED: i32 = 3;
