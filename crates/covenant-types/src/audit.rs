//! Audit events: immutable, contract-scoped, gapless
//!
//! An event is written once by the ledger and never updated or deleted;
//! corrections are new events referencing the corrected sequence number.
//! The payload carries the effect's canonical representation, and the ledger
//! stamps `payload_hash` over it at append time for later tamper detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    BatchId, ContractId, ContractState, FieldRecord, PrincipalId, RenewalIntent,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    ContractCreated,
    DraftUpdated,
    RenewalIntentSet,
    StateChanged,
    ExtractionSubmitted,
    FieldApproved,
    FieldRejected,
    ExtractionCancelled,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AuditAction::ContractCreated => "contract_created",
            AuditAction::DraftUpdated => "draft_updated",
            AuditAction::RenewalIntentSet => "renewal_intent_set",
            AuditAction::StateChanged => "state_changed",
            AuditAction::ExtractionSubmitted => "extraction_submitted",
            AuditAction::FieldApproved => "field_approved",
            AuditAction::FieldRejected => "field_rejected",
            AuditAction::ExtractionCancelled => "extraction_cancelled",
        };
        write!(f, "{name}")
    }
}

/// The effect an accepted mutation had, in canonical form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AuditPayload {
    ContractCreated {
        title: String,
        owner_id: PrincipalId,
    },
    DraftUpdated {
        changed: Vec<String>,
    },
    RenewalIntentSet {
        intent: RenewalIntent,
        #[serde(skip_serializing_if = "Option::is_none")]
        rationale: Option<String>,
    },
    StateChanged {
        reason: String,
    },
    ExtractionSubmitted {
        batch_id: BatchId,
        document_id: String,
        content_hash: String,
        candidate_count: usize,
    },
    FieldApproved {
        batch_id: BatchId,
        field: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        before: Option<FieldRecord>,
        after: FieldRecord,
    },
    FieldRejected {
        batch_id: BatchId,
        field: String,
        reason: String,
    },
    ExtractionCancelled {
        batch_id: BatchId,
        discarded: usize,
    },
}

/// One immutable entry in a contract's audit stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Contract-scoped sequence, strictly increasing and gapless from 1.
    pub sequence: u64,
    pub contract_id: ContractId,
    pub actor_id: PrincipalId,
    pub action: AuditAction,
    pub before_state: ContractState,
    pub after_state: ContractState,
    pub timestamp: DateTime<Utc>,
    pub payload: AuditPayload,
    /// Stamped by the ledger at append time; zeroed until then.
    pub payload_hash: [u8; 32],
    /// Sequence of the event this one corrects, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrects: Option<u64>,
}

impl AuditEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sequence: u64,
        contract_id: ContractId,
        actor_id: PrincipalId,
        action: AuditAction,
        before_state: ContractState,
        after_state: ContractState,
        timestamp: DateTime<Utc>,
        payload: AuditPayload,
    ) -> Self {
        Self {
            sequence,
            contract_id,
            actor_id,
            action,
            before_state,
            after_state,
            timestamp,
            payload,
            payload_hash: [0; 32],
            corrects: None,
        }
    }

    pub fn correcting(mut self, sequence: u64) -> Self {
        self.corrects = Some(sequence);
        self
    }
}
