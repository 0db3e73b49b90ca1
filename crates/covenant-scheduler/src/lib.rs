//! Covenant Notification Scheduler
//!
//! Current time drives state here, but never through implicit background
//! timers: the reconciliation pass takes the clock as an explicit parameter,
//! making it deterministic and testable. The tokio driver is a thin loop that
//! feeds the pass with wall-clock time on an interval.

#![deny(unsafe_code)]

mod driver;
mod scheduler;

pub use driver::*;
pub use scheduler::*;

use covenant_lifecycle::LifecycleError;
use covenant_types::{DeliveryStatus, TaskId};
use thiserror::Error;

/// Scheduler tuning. `lead_time_days` feeds the reminder formula
/// `due_at = termination_date - notice_period_days - lead_time`; each
/// escalation level shortens the lead by `escalation_step_days`.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub lead_time_days: i64,
    pub escalation_step_days: i64,
    pub max_escalation_level: u8,
    pub reconcile_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lead_time_days: 0,
            escalation_step_days: 7,
            max_escalation_level: 2,
            reconcile_interval_secs: 3600,
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("notification task not found: {0}")]
    NotFound(TaskId),

    #[error("task {task_id} is {status:?}, not awaiting delivery")]
    NotDeliverable {
        task_id: TaskId,
        status: DeliveryStatus,
    },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("task store lock poisoned")]
    LockPoisoned,
}

/// Result type alias for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
