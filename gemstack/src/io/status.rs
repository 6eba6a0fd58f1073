//! User-facing `[GemStack]` status lines.
//!
//! These are product output, not diagnostics: they are always printed,
//! independent of `RUST_LOG`. Diagnostics go through `tracing`.

pub const STATUS_PREFIX: &str = "[GemStack]";

pub fn status(message: &str) {
    println!("{STATUS_PREFIX} {message}");
}

pub fn status_warn(message: &str) {
    eprintln!("{STATUS_PREFIX} Warning: {message}");
}

pub fn status_error(message: &str) {
    eprintln!("{STATUS_PREFIX} Error: {message}");
}
