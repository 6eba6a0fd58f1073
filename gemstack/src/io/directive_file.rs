//! Loading directive files from disk.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::directive::{ParseOutcome, parse_directives};

/// Read and parse a directive file.
///
/// A missing file means "no file-based work" and yields `Ok(None)`.
pub fn load_directives(path: &Path) -> Result<Option<ParseOutcome>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "directive file not found");
            return Ok(None);
        }
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    let outcome = parse_directives(&text);
    debug!(
        units = outcome.units.len(),
        warnings = outcome.warnings.len(),
        "parsed directive file"
    );
    Ok(Some(outcome))
}
