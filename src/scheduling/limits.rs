//! Buffer overflow policies.
//!
//! A limit decides when the in-memory buffers of a storage must be
//! flushed to the backend. The storage evaluates its limit against a
//! [`BufferStats`] snapshot after every insert.

use chrono::Duration;

use crate::error::ConfigError;

/// Counter snapshot a storage hands to its limit.
#[derive(Debug, Clone, Copy)]
pub struct BufferStats {
    /// Objects pending across all queues.
    pub total_objects: usize,
    /// Serialized size of pending objects, in MiB.
    pub mem_alloc_mib: f64,
    /// Time since the last buffer commit.
    pub since_last_commit: Duration,
}

/// Flush policy attached to a bufferable storage.
#[derive(Debug, Clone)]
pub enum BufferLimit {
    /// Overflow once more than `capacity` objects are pending.
    Count { capacity: usize },
    /// Overflow once pending objects exceed `capacity` MiB.
    Memory { capacity_mib: f64 },
    /// Overflow once the last commit is older than `capacity`.
    Time { capacity: Duration },
    /// Buffering disabled: every batch overflows immediately.
    Unable,
}

impl BufferLimit {
    /// Build a limit from its configuration kind and capacity.
    ///
    /// Kinds: `count`, `memory`, `time` (seconds), `none`/`unable`.
    pub fn from_kind(kind: &str, capacity: f64) -> Result<Self, ConfigError> {
        match kind {
            "count" => Ok(BufferLimit::Count {
                capacity: capacity as usize,
            }),
            "memory" => Ok(BufferLimit::Memory {
                capacity_mib: capacity,
            }),
            "time" => Ok(BufferLimit::Time {
                capacity: Duration::seconds(capacity as i64),
            }),
            "none" | "unable" => Ok(BufferLimit::Unable),
            other => Err(ConfigError::UnknownLimitType(other.to_string())),
        }
    }

    /// Kinds accepted by [`BufferLimit::from_kind`].
    pub fn allowed_kinds() -> &'static [&'static str] {
        &["count", "memory", "time", "none", "unable"]
    }

    pub fn is_overflowed(&self, stats: &BufferStats) -> bool {
        match self {
            BufferLimit::Count { capacity } => stats.total_objects > *capacity,
            BufferLimit::Memory { capacity_mib } => stats.mem_alloc_mib > *capacity_mib,
            BufferLimit::Time { capacity } => stats.since_last_commit > *capacity,
            BufferLimit::Unable => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(objects: usize, mib: f64, secs: i64) -> BufferStats {
        BufferStats {
            total_objects: objects,
            mem_alloc_mib: mib,
            since_last_commit: Duration::seconds(secs),
        }
    }

    #[test]
    fn count_limit_overflows_past_capacity() {
        let limit = BufferLimit::from_kind("count", 10.0).unwrap();
        assert!(!limit.is_overflowed(&stats(10, 0.0, 0)));
        assert!(limit.is_overflowed(&stats(11, 0.0, 0)));
    }

    #[test]
    fn memory_limit_compares_mib() {
        let limit = BufferLimit::from_kind("memory", 1.5).unwrap();
        assert!(!limit.is_overflowed(&stats(0, 1.5, 0)));
        assert!(limit.is_overflowed(&stats(0, 1.6, 0)));
    }

    #[test]
    fn time_limit_uses_commit_age() {
        let limit = BufferLimit::from_kind("time", 30.0).unwrap();
        assert!(!limit.is_overflowed(&stats(0, 0.0, 30)));
        assert!(limit.is_overflowed(&stats(0, 0.0, 31)));
    }

    #[test]
    fn unable_always_overflows() {
        let limit = BufferLimit::from_kind("none", 0.0).unwrap();
        assert!(limit.is_overflowed(&stats(0, 0.0, 0)));
    }

    #[test]
    fn unknown_kind_is_a_config_error() {
        assert!(BufferLimit::from_kind("bytes", 1.0).is_err());
    }
}
