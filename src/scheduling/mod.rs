//! Activation conditions and buffer limits.
//!
//! Collectors are gated by an [`ActionCondition`]: either always
//! runnable or bound to a recurring time window.

pub mod clock;
pub mod limits;
mod time_condition;

pub use clock::{Clock, ManualClock, SystemClock};
pub use limits::{BufferLimit, BufferStats};
pub use time_condition::{SchedulePeriod, TimeCondition};

/// When a collector is allowed to start its next traversal.
pub enum ActionCondition {
    /// No gating: the collector reactivates immediately.
    AlwaysRun,
    /// Gated on a recurring time window.
    Time(TimeCondition),
}

impl Default for ActionCondition {
    fn default() -> Self {
        ActionCondition::AlwaysRun
    }
}

impl std::fmt::Debug for ActionCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionCondition::AlwaysRun => write!(f, "AlwaysRun"),
            ActionCondition::Time(cond) => cond.fmt(f),
        }
    }
}

impl From<TimeCondition> for ActionCondition {
    fn from(cond: TimeCondition) -> Self {
        ActionCondition::Time(cond)
    }
}

impl ActionCondition {
    pub fn is_able(&mut self) -> bool {
        match self {
            ActionCondition::AlwaysRun => true,
            ActionCondition::Time(cond) => cond.is_able(),
        }
    }

    /// Suspend until the condition is met; time conditions re-arm on return.
    pub async fn pending(&mut self) {
        match self {
            ActionCondition::AlwaysRun => {}
            ActionCondition::Time(cond) => cond.pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn always_run_is_immediately_able() {
        let mut cond = ActionCondition::default();
        assert!(cond.is_able());
        tokio::time::timeout(Duration::from_millis(50), cond.pending())
            .await
            .expect("always-run pending returns at once");
    }
}
