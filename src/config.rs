//! Runtime tunables for the supervisor loop.
//!
//! Loaded once at startup, either from defaults or from environment
//! variables. Nothing here is hot-reloaded.

use serde::{Deserialize, Serialize};

/// Settings that shape how the supervisor drives its collectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// How long the supervisor waits on its task set before re-checking.
    pub lookup_interval_secs: u64,
    /// Consecutive failures after which a collector stops being rescheduled.
    pub max_consecutive_failures: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            lookup_interval_secs: 600, // Re-inspect the task set every 10 minutes
            max_consecutive_failures: 3,
        }
    }
}

impl RuntimeConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            lookup_interval_secs: std::env::var("GATHERER_LOOKUP_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.lookup_interval_secs),
            max_consecutive_failures: std::env::var("GATHERER_MAX_FAILURES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_consecutive_failures),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.lookup_interval_secs, 600);
        assert!(cfg.max_consecutive_failures >= 1);
    }
}
