//! Ranked model list with one-way downgrade.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, bail};

/// Ordered model identifiers (best first) plus the index of the active one.
///
/// The index only moves forward via [`downgrade`](Self::downgrade) and goes
/// back to the top only through an explicit [`reset_to_top`](Self::reset_to_top).
#[derive(Debug)]
pub struct ModelFallbackSelector {
    models: Vec<String>,
    index: AtomicUsize,
}

impl ModelFallbackSelector {
    pub fn new(models: Vec<String>) -> Result<Self> {
        if models.is_empty() {
            bail!("model fallback list must not be empty");
        }
        Ok(Self {
            models,
            index: AtomicUsize::new(0),
        })
    }

    /// Active model. Clamps to the last entry if the index is out of range.
    pub fn current(&self) -> &str {
        let index = self.index.load(Ordering::Acquire);
        let clamped = index.min(self.models.len() - 1);
        &self.models[clamped]
    }

    /// Move to the next lower-ranked model.
    ///
    /// Returns `false` (index unchanged) when the list is exhausted.
    pub fn downgrade(&self) -> bool {
        let last = self.models.len() - 1;
        self.index
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |index| {
                (index < last).then_some(index + 1)
            })
            .is_ok()
    }

    pub fn reset_to_top(&self) {
        self.index.store(0, Ordering::Release);
    }

    pub fn index(&self) -> usize {
        self.index.load(Ordering::Acquire)
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }
}
