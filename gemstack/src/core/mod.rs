//! Deterministic, pure logic shared by the gemstack core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod directive;
pub mod fallback;
pub mod summary;
pub mod types;
