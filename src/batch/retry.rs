use crate::core::{PersistError, Result};
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

lazy_static! {
    static ref DEADLOCK_PATTERN: Regex = Regex::new(r"(?i)\bdeadlock").unwrap();
}

/// Returns `true` when a driver failure reports a deadlock.
pub fn is_deadlock(err: &PersistError) -> bool {
    err.driver_message()
        .map(|message| DEADLOCK_PATTERN.is_match(message))
        .unwrap_or(false)
}

/// Retries a batch execution exactly once when the driver reports a deadlock.
///
/// Any other failure, and a second deadlock, propagate unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlockRetry {
    enabled: bool,
}

impl Default for DeadlockRetry {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl DeadlockRetry {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn execute<T, F>(&self, operation: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        match attempt() {
            Err(err) if self.enabled && is_deadlock(&err) => {
                warn!("{} hit a deadlock, retrying once: {}", operation, err);
                attempt()
            }
            other => other,
        }
    }
}
