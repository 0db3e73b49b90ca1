//! The reconciliation pass and the delivery callback surface
//!
//! One pass: fire clock-due lifecycle transitions as the system principal,
//! then make the task set match what the contract dates imply - creating
//! missing tasks, superseding stale ones, escalating past-due reminders.
//! Running the pass again with unchanged input changes nothing, and a lost
//! race against a concurrent duplicate pass is a skip, not a failure.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use covenant_lifecycle::{LifecycleEngine, TransitionRequest};
use covenant_types::{
    Contract, ContractId, ContractState, DeliveryOutcome, DeliveryStatus, NotificationTask,
    Principal, TaskId,
};
use serde::{Deserialize, Serialize};

use crate::{SchedulerConfig, SchedulerError, SchedulerResult};

/// What one reconciliation pass did.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PassOutcome {
    pub created: Vec<TaskId>,
    pub superseded: Vec<TaskId>,
    pub transitions: Vec<(ContractId, ContractState)>,
}

impl PassOutcome {
    /// True when the pass changed nothing - the idempotent steady state.
    pub fn is_quiet(&self) -> bool {
        self.created.is_empty() && self.superseded.is_empty() && self.transitions.is_empty()
    }
}

/// The delivery collaborator. The scheduler owns task state only; sending
/// email/SMS is someone else's job, reported back as an outcome.
#[async_trait]
pub trait NotificationDelivery: Send + Sync {
    async fn deliver(&self, task: &NotificationTask) -> DeliveryOutcome;
}

pub struct NotificationScheduler {
    lifecycle: Arc<LifecycleEngine>,
    tasks: RwLock<Vec<NotificationTask>>,
    config: SchedulerConfig,
    system: Principal,
}

impl NotificationScheduler {
    pub fn new(lifecycle: Arc<LifecycleEngine>, config: SchedulerConfig) -> Self {
        Self {
            lifecycle,
            tasks: RwLock::new(Vec::new()),
            config,
            system: Principal::system(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// One deterministic reconciliation pass at the given instant.
    pub fn run_pass(&self, now: DateTime<Utc>) -> SchedulerResult<PassOutcome> {
        let today = now.date_naive();
        let mut outcome = PassOutcome::default();

        self.fire_clock_transitions(now, today, &mut outcome)?;
        self.reconcile_tasks(now, today, &mut outcome)?;

        if !outcome.is_quiet() {
            tracing::info!(
                created = outcome.created.len(),
                superseded = outcome.superseded.len(),
                transitions = outcome.transitions.len(),
                "reconciliation pass applied changes"
            );
        }
        Ok(outcome)
    }

    /// Pending tasks whose due date has arrived, for the delivery dispatcher.
    pub fn due_tasks(&self, today: NaiveDate) -> SchedulerResult<Vec<NotificationTask>> {
        let tasks = self.tasks.read().map_err(|_| SchedulerError::LockPoisoned)?;
        Ok(tasks
            .iter()
            .filter(|t| t.is_pending() && t.due_at <= today)
            .cloned()
            .collect())
    }

    pub fn tasks_for(&self, contract_id: &ContractId) -> SchedulerResult<Vec<NotificationTask>> {
        let tasks = self.tasks.read().map_err(|_| SchedulerError::LockPoisoned)?;
        Ok(tasks
            .iter()
            .filter(|t| t.contract_id == *contract_id)
            .cloned()
            .collect())
    }

    /// Record the delivery collaborator's callback for one task.
    pub fn record_delivery(
        &self,
        task_id: &TaskId,
        outcome: DeliveryOutcome,
    ) -> SchedulerResult<NotificationTask> {
        let mut tasks = self.tasks.write().map_err(|_| SchedulerError::LockPoisoned)?;
        let task = tasks
            .iter_mut()
            .find(|t| t.task_id == *task_id)
            .ok_or_else(|| SchedulerError::NotFound(task_id.clone()))?;

        if task.delivery_status != DeliveryStatus::Scheduled {
            return Err(SchedulerError::NotDeliverable {
                task_id: task_id.clone(),
                status: task.delivery_status,
            });
        }

        task.delivery_status = match outcome {
            DeliveryOutcome::Sent => DeliveryStatus::Sent,
            DeliveryOutcome::Failed => DeliveryStatus::Failed,
        };
        tracing::debug!(task = %task_id, status = ?task.delivery_status, "delivery recorded");
        Ok(task.clone())
    }

    /// Hand every due task to the delivery collaborator and record the
    /// outcome it reports.
    pub async fn dispatch_due(
        &self,
        now: DateTime<Utc>,
        delivery: &dyn NotificationDelivery,
    ) -> SchedulerResult<usize> {
        let due = self.due_tasks(now.date_naive())?;
        let mut dispatched = 0;
        for task in due {
            let outcome = delivery.deliver(&task).await;
            self.record_delivery(&task.task_id, outcome)?;
            dispatched += 1;
        }
        Ok(dispatched)
    }

    // ── Pass internals ───────────────────────────────────────────────

    fn fire_clock_transitions(
        &self,
        now: DateTime<Utc>,
        today: NaiveDate,
        outcome: &mut PassOutcome,
    ) -> SchedulerResult<()> {
        for contract in self.lifecycle.list()? {
            let attempt = match contract.state {
                ContractState::Active if contract.in_notice_window(today) => Some((
                    ContractState::Expiring,
                    "notice window reached".to_string(),
                )),
                ContractState::Expiring
                    if contract
                        .termination_date
                        .map(|termination| today >= termination)
                        .unwrap_or(false) =>
                {
                    Some((
                        ContractState::Terminated,
                        "termination date reached without renewal".to_string(),
                    ))
                }
                _ => None,
            };

            let Some((target, reason)) = attempt else {
                continue;
            };

            let request = TransitionRequest::clock(target, reason, contract.version);
            match self
                .lifecycle
                .transition(&contract.contract_id, request, &self.system, now)
            {
                Ok(updated) => {
                    outcome
                        .transitions
                        .push((contract.contract_id.clone(), updated.state));
                }
                // A concurrent pass won the race, or a guard said no (e.g. a
                // recorded renewal). Both are skips, not faults.
                Err(error) => {
                    tracing::debug!(
                        contract = %contract.contract_id,
                        target = %target,
                        error = %error,
                        "clock transition skipped"
                    );
                }
            }
        }
        Ok(())
    }

    fn reconcile_tasks(
        &self,
        now: DateTime<Utc>,
        today: NaiveDate,
        outcome: &mut PassOutcome,
    ) -> SchedulerResult<()> {
        let contracts = self.lifecycle.list()?;
        let mut tasks = self.tasks.write().map_err(|_| SchedulerError::LockPoisoned)?;

        for contract in &contracts {
            if !matches!(
                contract.state,
                ContractState::Active | ContractState::Expiring
            ) {
                // Nothing left to remind about; retire pending tasks.
                for task in tasks.iter_mut().filter(|t| {
                    t.contract_id == contract.contract_id && t.is_pending()
                }) {
                    task.delivery_status = DeliveryStatus::Superseded;
                    outcome.superseded.push(task.task_id.clone());
                }
                continue;
            }

            let Some(base_due) = self.due_for_level(contract, 0) else {
                continue;
            };
            Self::ensure_task(&mut tasks, contract, 0, base_due, now, outcome);

            // Escalate past-due levels while no renewal decision exists.
            for level in 0..self.config.max_escalation_level {
                if contract.renewal.intent.is_decided() {
                    break;
                }
                let level_passed = tasks.iter().any(|t| {
                    t.contract_id == contract.contract_id
                        && t.escalation_level == level
                        && t.is_active()
                        && t.due_at < today
                });
                if !level_passed {
                    break;
                }
                let next_level = level + 1;
                let Some(due) = self.due_for_level(contract, next_level) else {
                    break;
                };
                Self::ensure_task(&mut tasks, contract, next_level, due, now, outcome);
            }
        }

        Ok(())
    }

    /// `due_at = termination_date - notice_period_days - lead_time`, with the
    /// lead shrinking by one escalation step per level.
    fn due_for_level(&self, contract: &Contract, level: u8) -> Option<NaiveDate> {
        let termination = contract.termination_date?;
        let notice_days = contract.notice_period_days?;
        let lead = self.config.lead_time_days - i64::from(level) * self.config.escalation_step_days;
        Some(termination - Duration::days(i64::from(notice_days)) - Duration::days(lead))
    }

    /// Make exactly one active task exist at (contract, level) with this due
    /// date: no-op when it already does, supersede-and-replace when the due
    /// date drifted, create otherwise.
    fn ensure_task(
        tasks: &mut Vec<NotificationTask>,
        contract: &Contract,
        level: u8,
        due_at: NaiveDate,
        now: DateTime<Utc>,
        outcome: &mut PassOutcome,
    ) {
        let up_to_date = tasks.iter().any(|t| {
            t.contract_id == contract.contract_id
                && t.escalation_level == level
                && t.is_active()
                && t.due_at == due_at
        });
        if up_to_date {
            return;
        }

        for task in tasks.iter_mut().filter(|t| {
            t.contract_id == contract.contract_id && t.escalation_level == level && t.is_pending()
        }) {
            task.delivery_status = DeliveryStatus::Superseded;
            outcome.superseded.push(task.task_id.clone());
        }

        let task = NotificationTask::scheduled(contract.contract_id.clone(), due_at, level, now);
        tracing::debug!(
            contract = %contract.contract_id,
            task = %task.task_id,
            level = level,
            due = %due_at,
            "notification task scheduled"
        );
        outcome.created.push(task.task_id.clone());
        tasks.push(task);
    }
}
