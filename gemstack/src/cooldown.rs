//! Optional pause between consecutive agent invocations.

use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::io::config::CooldownConfig;
use crate::io::status;

pub const DEFAULT_COOLDOWN_SECS: i64 = 60;

/// Blocking sleep, swappable in tests.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Per-invocation cooldown overrides (from CLI flags).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CooldownOverrides {
    pub enabled: Option<bool>,
    pub seconds: Option<i64>,
}

/// Resolves cooldown settings and performs the pause.
///
/// Precedence for each value: override, then configuration. Non-positive
/// seconds fall back to [`DEFAULT_COOLDOWN_SECS`].
#[derive(Debug)]
pub struct CooldownGate<S: Sleeper = ThreadSleeper> {
    config: CooldownConfig,
    overrides: CooldownOverrides,
    sleeper: S,
}

impl CooldownGate<ThreadSleeper> {
    pub fn new(config: CooldownConfig, overrides: CooldownOverrides) -> Self {
        Self::with_sleeper(config, overrides, ThreadSleeper)
    }
}

impl<S: Sleeper> CooldownGate<S> {
    pub fn with_sleeper(config: CooldownConfig, overrides: CooldownOverrides, sleeper: S) -> Self {
        Self {
            config,
            overrides,
            sleeper,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.overrides.enabled.unwrap_or(self.config.enabled)
    }

    pub fn effective_seconds(&self) -> u64 {
        let seconds = self.overrides.seconds.unwrap_or(self.config.seconds);
        let seconds = if seconds <= 0 {
            DEFAULT_COOLDOWN_SECS
        } else {
            seconds
        };
        seconds.unsigned_abs()
    }

    /// Sleep for the effective duration when enabled. Returns whether it slept.
    pub fn perform_cooldown(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let seconds = self.effective_seconds();
        debug!(seconds, "cooldown");
        status::status(&format!("Cooling down for {seconds} seconds..."));
        self.sleeper.sleep(Duration::from_secs(seconds));
        true
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }
}
