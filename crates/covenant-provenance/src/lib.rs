//! Covenant Provenance Store & Extraction Workflow Coordinator
//!
//! Two truth sources per contract field: machine-extracted candidates and
//! human-verified values. The store keeps them apart; only an explicit,
//! audited approval turns a candidate into the authoritative value, and an
//! unverified field is reported as unverified, never defaulted.

#![deny(unsafe_code)]

mod coordinator;
mod store;

pub use coordinator::*;
pub use store::*;

use covenant_ledger::LedgerError;
use covenant_lifecycle::StoreError;
use covenant_types::{BatchId, ContractId};
use thiserror::Error;

/// Failure reported by the opaque extraction collaborator.
#[derive(Debug, Error)]
#[error("extraction service failed: {0}")]
pub struct ExtractionServiceError(pub String);

#[derive(Debug, Error)]
pub enum ProvenanceError {
    #[error("contract not found: {0}")]
    ContractNotFound(ContractId),

    #[error("extraction batch not found: {0}")]
    BatchNotFound(BatchId),

    #[error("field {field} has no pending candidate in batch {batch_id}")]
    NoPendingCandidate { batch_id: BatchId, field: String },

    #[error("contract {0} is archived and read-only")]
    ReadOnly(ContractId),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("authorization denied: {reason}")]
    Authorization { reason: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Service(#[from] ExtractionServiceError),

    #[error("provenance lock poisoned")]
    LockPoisoned,
}

impl From<StoreError> for ProvenanceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => ProvenanceError::ContractNotFound(id),
            StoreError::AlreadyExists(id) => {
                ProvenanceError::Validation(format!("contract already exists: {id}"))
            }
            StoreError::LockPoisoned => ProvenanceError::LockPoisoned,
        }
    }
}

/// Result type alias for provenance operations.
pub type ProvenanceResult<T> = Result<T, ProvenanceError>;
