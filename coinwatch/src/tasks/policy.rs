//! Background task policies.

use std::time::Duration;

/// What to do with a task that runs too long.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Let the task run to completion.
    #[default]
    None,
    /// Abort the task after the duration.
    Cancel(Duration),
    /// Log a warning once the task finishes past the duration.
    Warn(Duration),
}

#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub timeout_policy: TimeoutPolicy,
    /// Skip spawning a query task while one for the same key is running.
    pub deduplicate: bool,
}

impl Default for TaskConfig {
    fn default() -> Self {
        TaskConfig {
            timeout_policy: TimeoutPolicy::None,
            deduplicate: true,
        }
    }
}

impl TaskConfig {
    pub fn timeout_policy(self, timeout_policy: TimeoutPolicy) -> Self {
        TaskConfig {
            timeout_policy,
            ..self
        }
    }

    /// Cancel tasks after `duration`.
    pub fn timeout(self, duration: Duration) -> Self {
        self.timeout_policy(TimeoutPolicy::Cancel(duration))
    }

    pub fn deduplicate(self, deduplicate: bool) -> Self {
        TaskConfig {
            deduplicate,
            ..self
        }
    }
}
