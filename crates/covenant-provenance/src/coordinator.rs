//! The extraction workflow: submit, human-approve, reject, cancel
//!
//! Candidates come from the opaque extraction collaborator and stay untrusted
//! until a Reviewer-or-higher approves them. Every decision commits together
//! with its audit event under the contract store's write lock, and an
//! approval is the only path that bumps the contract version (a field commit).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use covenant_gate::{AuthorizationGate, GateDecision};
use covenant_ledger::AuditLedger;
use covenant_lifecycle::ContractStore;
use covenant_types::{
    Action, AuditAction, AuditEvent, AuditPayload, BatchId, ContractId, DocumentRef,
    ExtractionBatch, FieldRecord, FieldReport, Principal, ProposedField,
};

use crate::{ExtractionServiceError, ProvenanceError, ProvenanceResult, ProvenanceStore};

/// The opaque extraction collaborator: a document reference in, field/value/
/// confidence tuples out. Its output is untrusted input to the workflow.
pub trait ExtractionService: Send + Sync {
    fn extract(&self, document: &DocumentRef)
        -> Result<Vec<ProposedField>, ExtractionServiceError>;
}

pub struct ExtractionCoordinator {
    store: Arc<ProvenanceStore>,
    contracts: Arc<ContractStore>,
    gate: Arc<AuthorizationGate>,
    ledger: Arc<AuditLedger>,
}

impl ExtractionCoordinator {
    pub fn new(
        store: Arc<ProvenanceStore>,
        contracts: Arc<ContractStore>,
        gate: Arc<AuthorizationGate>,
        ledger: Arc<AuditLedger>,
    ) -> Self {
        Self {
            store,
            contracts,
            gate,
            ledger,
        }
    }

    pub fn provenance(&self) -> &ProvenanceStore {
        &self.store
    }

    /// Call the extraction collaborator for a document and submit its output
    /// as a new batch.
    pub fn request_extraction(
        &self,
        contract_id: &ContractId,
        document: DocumentRef,
        service: &dyn ExtractionService,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> ProvenanceResult<ExtractionBatch> {
        let proposed = service.extract(&document)?;
        self.submit(contract_id, document, proposed, actor, now)
    }

    /// Record a batch of extracted candidates. Verified fields are untouched.
    pub fn submit(
        &self,
        contract_id: &ContractId,
        document: DocumentRef,
        proposed: Vec<ProposedField>,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> ProvenanceResult<ExtractionBatch> {
        if proposed.is_empty() {
            return Err(ProvenanceError::Validation(
                "an extraction batch must propose at least one field".into(),
            ));
        }

        let store = Arc::clone(&self.store);
        let gate = Arc::clone(&self.gate);
        let ledger = Arc::clone(&self.ledger);

        self.contracts.with_write(|contracts| {
            let contract = contracts
                .get(contract_id)
                .ok_or_else(|| ProvenanceError::ContractNotFound(contract_id.clone()))?;
            if contract.state.is_read_only() {
                return Err(ProvenanceError::ReadOnly(contract_id.clone()));
            }
            if let GateDecision::Deny { reason } =
                gate.authorize(actor, &Action::SubmitExtraction, contract)
            {
                return Err(ProvenanceError::Authorization { reason });
            }

            let batch = ExtractionBatch::new(
                contract_id.clone(),
                document,
                proposed,
                actor.principal_id.clone(),
                now,
            );

            let event = AuditEvent::new(
                ledger.next_sequence(contract_id)?,
                contract_id.clone(),
                actor.principal_id.clone(),
                AuditAction::ExtractionSubmitted,
                contract.state,
                contract.state,
                now,
                AuditPayload::ExtractionSubmitted {
                    batch_id: batch.batch_id.clone(),
                    document_id: batch.document.document_id.clone(),
                    content_hash: batch.document.content_hash.clone(),
                    candidate_count: batch.candidates.len(),
                },
            );
            ledger.append(event)?;
            store.insert_batch(batch.clone())?;

            tracing::info!(
                contract = %contract_id,
                batch = %batch.batch_id,
                candidates = batch.candidates.len(),
                "extraction batch submitted"
            );
            Ok(batch)
        })?
    }

    /// Approve one candidate, making its value (or the reviewer's corrected
    /// `final_value`) the authoritative field record.
    pub fn approve(
        &self,
        batch_id: &BatchId,
        field: &str,
        actor: &Principal,
        final_value: Option<String>,
        now: DateTime<Utc>,
    ) -> ProvenanceResult<FieldRecord> {
        let contract_id = self.store.batch(batch_id)?.contract_id;

        let store = Arc::clone(&self.store);
        let gate = Arc::clone(&self.gate);
        let ledger = Arc::clone(&self.ledger);
        let batch_id = batch_id.clone();
        let field = field.to_string();

        self.contracts.with_write(|contracts| {
            let contract = contracts
                .get(&contract_id)
                .ok_or_else(|| ProvenanceError::ContractNotFound(contract_id.clone()))?;
            if contract.state.is_read_only() {
                return Err(ProvenanceError::ReadOnly(contract_id.clone()));
            }
            if let GateDecision::Deny { reason } =
                gate.authorize(actor, &Action::ApproveExtraction, contract)
            {
                return Err(ProvenanceError::Authorization { reason });
            }
            let contract_state = contract.state;

            let after = store.with_batch_mut(&batch_id, |batch| {
                let candidate = batch.candidate(&field).ok_or_else(|| {
                    ProvenanceError::NoPendingCandidate {
                        batch_id: batch_id.clone(),
                        field: field.clone(),
                    }
                })?;
                if !candidate.is_pending() {
                    return Err(ProvenanceError::NoPendingCandidate {
                        batch_id: batch_id.clone(),
                        field: field.clone(),
                    });
                }

                let value = final_value
                    .clone()
                    .unwrap_or_else(|| candidate.value.clone());
                let before = store.verified_field(&contract_id, &field)?;
                let after = FieldRecord::verified(
                    field.clone(),
                    value,
                    actor.principal_id.clone(),
                    now,
                );

                let event = AuditEvent::new(
                    ledger.next_sequence(&contract_id)?,
                    contract_id.clone(),
                    actor.principal_id.clone(),
                    AuditAction::FieldApproved,
                    contract_state,
                    contract_state,
                    now,
                    AuditPayload::FieldApproved {
                        batch_id: batch_id.clone(),
                        field: field.clone(),
                        before,
                        after: after.clone(),
                    },
                );
                ledger.append(event)?;

                store.set_verified(after.clone(), &contract_id)?;
                let candidate = batch
                    .candidate_mut(&field)
                    .expect("candidate present under batch lock");
                candidate.status = covenant_types::CandidateStatus::Approved;
                batch.recompute_status();

                tracing::info!(
                    contract = %contract_id,
                    batch = %batch_id,
                    field = %field,
                    approver = %actor.principal_id,
                    "field approved"
                );
                Ok(after)
            })?;

            // The approval is a field commit: bump the contract version.
            let contract = contracts
                .get_mut(&contract_id)
                .expect("contract present under write lock");
            contract.version += 1;
            contract.updated_at = now;

            Ok(after)
        })?
    }

    /// Reject one candidate. The field's prior state - verified or absent -
    /// is untouched.
    pub fn reject(
        &self,
        batch_id: &BatchId,
        field: &str,
        actor: &Principal,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> ProvenanceResult<()> {
        let contract_id = self.store.batch(batch_id)?.contract_id;
        let reason = reason.into();

        let store = Arc::clone(&self.store);
        let gate = Arc::clone(&self.gate);
        let ledger = Arc::clone(&self.ledger);
        let batch_id = batch_id.clone();
        let field = field.to_string();

        self.contracts.with_write(|contracts| {
            let contract = contracts
                .get(&contract_id)
                .ok_or_else(|| ProvenanceError::ContractNotFound(contract_id.clone()))?;
            if contract.state.is_read_only() {
                return Err(ProvenanceError::ReadOnly(contract_id.clone()));
            }
            if let GateDecision::Deny { reason } =
                gate.authorize(actor, &Action::RejectExtraction, contract)
            {
                return Err(ProvenanceError::Authorization { reason });
            }
            let contract_state = contract.state;

            store.with_batch_mut(&batch_id, |batch| {
                let candidate = batch.candidate(&field).ok_or_else(|| {
                    ProvenanceError::NoPendingCandidate {
                        batch_id: batch_id.clone(),
                        field: field.clone(),
                    }
                })?;
                if !candidate.is_pending() {
                    return Err(ProvenanceError::NoPendingCandidate {
                        batch_id: batch_id.clone(),
                        field: field.clone(),
                    });
                }

                let event = AuditEvent::new(
                    ledger.next_sequence(&contract_id)?,
                    contract_id.clone(),
                    actor.principal_id.clone(),
                    AuditAction::FieldRejected,
                    contract_state,
                    contract_state,
                    now,
                    AuditPayload::FieldRejected {
                        batch_id: batch_id.clone(),
                        field: field.clone(),
                        reason: reason.clone(),
                    },
                );
                ledger.append(event)?;

                let candidate = batch
                    .candidate_mut(&field)
                    .expect("candidate present under batch lock");
                candidate.status = covenant_types::CandidateStatus::Rejected;
                batch.recompute_status();
                Ok(())
            })
        })?
    }

    /// Cancel a batch before approval: every still-pending candidate is
    /// discarded. Decisions already recorded stay final.
    pub fn cancel(
        &self,
        batch_id: &BatchId,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> ProvenanceResult<usize> {
        let contract_id = self.store.batch(batch_id)?.contract_id;

        let store = Arc::clone(&self.store);
        let gate = Arc::clone(&self.gate);
        let ledger = Arc::clone(&self.ledger);
        let batch_id = batch_id.clone();

        self.contracts.with_write(|contracts| {
            let contract = contracts
                .get(&contract_id)
                .ok_or_else(|| ProvenanceError::ContractNotFound(contract_id.clone()))?;
            if contract.state.is_read_only() {
                return Err(ProvenanceError::ReadOnly(contract_id.clone()));
            }
            if let GateDecision::Deny { reason } =
                gate.authorize(actor, &Action::CancelExtraction, contract)
            {
                return Err(ProvenanceError::Authorization { reason });
            }
            let contract_state = contract.state;

            store.with_batch_mut(&batch_id, |batch| {
                if batch.status == covenant_types::BatchStatus::Cancelled {
                    return Err(ProvenanceError::Validation(format!(
                        "batch {batch_id} is already cancelled"
                    )));
                }
                let discarded = batch.candidates.iter().filter(|c| c.is_pending()).count();

                let event = AuditEvent::new(
                    ledger.next_sequence(&contract_id)?,
                    contract_id.clone(),
                    actor.principal_id.clone(),
                    AuditAction::ExtractionCancelled,
                    contract_state,
                    contract_state,
                    now,
                    AuditPayload::ExtractionCancelled {
                        batch_id: batch_id.clone(),
                        discarded,
                    },
                );
                ledger.append(event)?;

                batch.status = covenant_types::BatchStatus::Cancelled;
                Ok(discarded)
            })
        })?
    }

    pub fn batch(&self, batch_id: &BatchId) -> ProvenanceResult<ExtractionBatch> {
        self.store.batch(batch_id)
    }

    pub fn batches_for(&self, contract_id: &ContractId) -> ProvenanceResult<Vec<ExtractionBatch>> {
        self.store.batches_for(contract_id)
    }

    pub fn field_report(&self, contract_id: &ContractId) -> ProvenanceResult<FieldReport> {
        self.store.field_report(contract_id)
    }
}
