//! Prompt queue orchestrator for an external coding agent.
//!
//! Directive files (`GemStackQueue.txt`) are parsed into execution units which
//! are fed one at a time to the agent process, falling back through a ranked
//! list of models whenever the backend reports rate-limit or quota exhaustion.
//! The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (directive parsing, model fallback,
//!   output classification). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, git, process execution).
//!   Isolated behind traits to enable scripted doubles in tests.
//!
//! Orchestration modules ([`pipeline`], [`batch`], [`reflect`]) coordinate core
//! logic with I/O to implement the CLI commands.

pub mod batch;
pub mod cooldown;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod queue;
pub mod reflect;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod ui;
