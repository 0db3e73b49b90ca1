//! Covenant Engine - the unified external surface
//!
//! Composes the contract store, authorization gate, audit ledger, lifecycle
//! state machine, extraction coordinator, and notification scheduler into the
//! minimal operation surface collaborators call: create contract, request
//! transition, submit/approve/reject extraction, query the audit trail, run
//! the notification reconciliation pass.

#![deny(unsafe_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use covenant_gate::{AuthorizationGate, GateDecision};
use covenant_ledger::{AuditLedger, LedgerError, LedgerFault};
use covenant_lifecycle::{
    ContractStore, DraftChanges, LifecycleEngine, LifecycleError, LifecycleStatistics,
    NewContract, TransitionRequest,
};
use covenant_provenance::{
    ExtractionCoordinator, ExtractionService, ProvenanceError, ProvenanceStore,
};
use covenant_scheduler::{
    NotificationDelivery, NotificationScheduler, PassOutcome, SchedulerConfig, SchedulerError,
};
use covenant_types::{
    Action, AuditEvent, BatchId, Contract, ContractId, DeliveryOutcome, DocumentRef,
    ExtractionBatch, FieldRecord, FieldReport, NotificationTask, Principal, ProposedField,
    RenewalDecision, TaskId,
};
use thiserror::Error;

pub struct CovenantEngine {
    gate: Arc<AuthorizationGate>,
    ledger: Arc<AuditLedger>,
    lifecycle: Arc<LifecycleEngine>,
    coordinator: ExtractionCoordinator,
    scheduler: NotificationScheduler,
}

impl CovenantEngine {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        let contracts = Arc::new(ContractStore::new());
        let gate = Arc::new(AuthorizationGate::new());
        let ledger = Arc::new(AuditLedger::new());
        let lifecycle = Arc::new(LifecycleEngine::new(
            Arc::clone(&contracts),
            Arc::clone(&gate),
            Arc::clone(&ledger),
        ));
        let coordinator = ExtractionCoordinator::new(
            Arc::new(ProvenanceStore::new()),
            Arc::clone(&contracts),
            Arc::clone(&gate),
            Arc::clone(&ledger),
        );
        let scheduler = NotificationScheduler::new(Arc::clone(&lifecycle), config);

        Self {
            gate,
            ledger,
            lifecycle,
            coordinator,
            scheduler,
        }
    }

    // ============ Contract Operations ============

    /// Create a contract in Draft.
    pub fn create_contract(
        &self,
        params: NewContract,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Contract, EngineError> {
        Ok(self.lifecycle.create(params, actor, now)?)
    }

    /// Request one lifecycle transition.
    pub fn request_transition(
        &self,
        contract_id: &ContractId,
        request: TransitionRequest,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Contract, EngineError> {
        Ok(self.lifecycle.transition(contract_id, request, actor, now)?)
    }

    /// Correct a Draft in place.
    pub fn update_draft(
        &self,
        contract_id: &ContractId,
        changes: DraftChanges,
        actor: &Principal,
        expected_version: u64,
        now: DateTime<Utc>,
    ) -> Result<Contract, EngineError> {
        Ok(self
            .lifecycle
            .update_draft(contract_id, changes, actor, expected_version, now)?)
    }

    /// Record a renewal decision with its rationale.
    pub fn set_renewal_intent(
        &self,
        contract_id: &ContractId,
        decision: RenewalDecision,
        actor: &Principal,
        expected_version: u64,
        now: DateTime<Utc>,
    ) -> Result<Contract, EngineError> {
        Ok(self
            .lifecycle
            .set_renewal_intent(contract_id, decision, actor, expected_version, now)?)
    }

    /// Authorized read of one contract.
    pub fn get_contract(
        &self,
        contract_id: &ContractId,
        actor: &Principal,
    ) -> Result<Contract, EngineError> {
        let contract = self.lifecycle.get(contract_id)?;
        if let GateDecision::Deny { reason } =
            self.gate.authorize(actor, &Action::ReadContract, &contract)
        {
            return Err(EngineError::Authorization { reason });
        }
        Ok(contract)
    }

    /// Contract counts by state, for the reporting collaborator.
    pub fn statistics(&self) -> Result<LifecycleStatistics, EngineError> {
        Ok(self.lifecycle.statistics()?)
    }

    // ============ Extraction Workflow ============

    /// Submit already-extracted field candidates for a document.
    pub fn submit_extraction(
        &self,
        contract_id: &ContractId,
        document: DocumentRef,
        proposed: Vec<ProposedField>,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> Result<ExtractionBatch, EngineError> {
        Ok(self
            .coordinator
            .submit(contract_id, document, proposed, actor, now)?)
    }

    /// Call the extraction collaborator and submit whatever it proposes.
    pub fn request_extraction(
        &self,
        contract_id: &ContractId,
        document: DocumentRef,
        service: &dyn ExtractionService,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> Result<ExtractionBatch, EngineError> {
        Ok(self
            .coordinator
            .request_extraction(contract_id, document, service, actor, now)?)
    }

    /// Approve one candidate; `final_value` lets the reviewer correct it.
    pub fn approve_extraction(
        &self,
        batch_id: &BatchId,
        field: &str,
        actor: &Principal,
        final_value: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<FieldRecord, EngineError> {
        Ok(self
            .coordinator
            .approve(batch_id, field, actor, final_value, now)?)
    }

    /// Reject one candidate, leaving the field's prior state untouched.
    pub fn reject_extraction(
        &self,
        batch_id: &BatchId,
        field: &str,
        actor: &Principal,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        Ok(self.coordinator.reject(batch_id, field, actor, reason, now)?)
    }

    /// Cancel a batch, discarding its still-pending candidates.
    pub fn cancel_extraction(
        &self,
        batch_id: &BatchId,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> Result<usize, EngineError> {
        Ok(self.coordinator.cancel(batch_id, actor, now)?)
    }

    pub fn get_batch(&self, batch_id: &BatchId) -> Result<ExtractionBatch, EngineError> {
        Ok(self.coordinator.batch(batch_id)?)
    }

    /// Authoritative and provisional field values for one contract.
    pub fn field_report(&self, contract_id: &ContractId) -> Result<FieldReport, EngineError> {
        Ok(self.coordinator.field_report(contract_id)?)
    }

    // ============ Audit Trail ============

    /// Authorized, restartable audit range read. Works on Archived contracts:
    /// audit export is the one operation archival keeps open.
    pub fn query_audit(
        &self,
        contract_id: &ContractId,
        from_seq: u64,
        to_seq: u64,
        actor: &Principal,
    ) -> Result<Vec<AuditEvent>, EngineError> {
        let contract = self.lifecycle.get(contract_id)?;
        if let GateDecision::Deny { reason } =
            self.gate.authorize(actor, &Action::QueryAudit, &contract)
        {
            return Err(EngineError::Authorization { reason });
        }
        Ok(self.ledger.read_range(contract_id, from_seq, to_seq)?)
    }

    /// Recompute payload hashes for one contract's stream.
    pub fn verify_audit(&self, contract_id: &ContractId) -> Result<Option<LedgerFault>, EngineError> {
        Ok(self.ledger.verify(contract_id)?)
    }

    // ============ Notifications ============

    /// Run one reconciliation pass at the given instant.
    pub fn run_reconciliation(&self, now: DateTime<Utc>) -> Result<PassOutcome, EngineError> {
        Ok(self.scheduler.run_pass(now)?)
    }

    /// Dispatch due tasks through the delivery collaborator.
    pub async fn dispatch_notifications(
        &self,
        now: DateTime<Utc>,
        delivery: &dyn NotificationDelivery,
    ) -> Result<usize, EngineError> {
        Ok(self.scheduler.dispatch_due(now, delivery).await?)
    }

    /// Record a delivery callback for one task.
    pub fn record_delivery(
        &self,
        task_id: &TaskId,
        outcome: DeliveryOutcome,
    ) -> Result<NotificationTask, EngineError> {
        Ok(self.scheduler.record_delivery(task_id, outcome)?)
    }

    pub fn notification_tasks(
        &self,
        contract_id: &ContractId,
    ) -> Result<Vec<NotificationTask>, EngineError> {
        Ok(self.scheduler.tasks_for(contract_id)?)
    }

    // ============ Component Access ============

    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    pub fn ledger(&self) -> &AuditLedger {
        &self.ledger
    }

    pub fn lifecycle(&self) -> &LifecycleEngine {
        &self.lifecycle
    }

    pub fn scheduler(&self) -> &NotificationScheduler {
        &self.scheduler
    }

    /// Denied-attempt count from the gate's observability channel.
    pub fn denied_attempts(&self) -> u64 {
        self.gate.denied_attempts()
    }
}

impl Default for CovenantEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine-wide error umbrella over the per-component taxonomies.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("authorization denied: {reason}")]
    Authorization { reason: String },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Provenance(#[from] ProvenanceError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
