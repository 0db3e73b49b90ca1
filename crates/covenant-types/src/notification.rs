//! Notification tasks derived from contract dates and lifecycle state

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ContractId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);
impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Reminder,
    Escalation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Scheduled,
    Sent,
    Failed,
    Superseded,
}

/// What the delivery collaborator reports back for a dispatched task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryOutcome {
    Sent,
    Failed,
}

/// A deliverable reminder/escalation record.
///
/// Tasks are never edited in place: a date recomputation supersedes the stale
/// task and creates a replacement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationTask {
    pub task_id: TaskId,
    pub contract_id: ContractId,
    pub due_at: NaiveDate,
    pub kind: TaskKind,
    pub escalation_level: u8,
    pub delivery_status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
}

impl NotificationTask {
    pub fn scheduled(
        contract_id: ContractId,
        due_at: NaiveDate,
        escalation_level: u8,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: TaskId::generate(),
            contract_id,
            due_at,
            kind: if escalation_level == 0 {
                TaskKind::Reminder
            } else {
                TaskKind::Escalation
            },
            escalation_level,
            delivery_status: DeliveryStatus::Scheduled,
            created_at: now,
        }
    }

    /// Still awaiting delivery.
    pub fn is_pending(&self) -> bool {
        matches!(self.delivery_status, DeliveryStatus::Scheduled)
    }

    /// Counts toward the one-active-task-per-(contract, kind, level) invariant.
    pub fn is_active(&self) -> bool {
        !matches!(self.delivery_status, DeliveryStatus::Superseded)
    }
}
