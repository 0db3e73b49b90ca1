//! Covenant Lifecycle State Machine
//!
//! Owns the contract store and the fixed transition graph. Every mutation is
//! gated by the authorization policy, validated against the caller's expected
//! version, and committed atomically with exactly one audit event - a failed
//! call leaves the contract and the ledger untouched.

#![deny(unsafe_code)]

mod machine;
mod store;
mod table;

pub use machine::*;
pub use store::*;
pub use table::*;

use covenant_ledger::LedgerError;
use covenant_types::{ContractId, ContractState};
use thiserror::Error;

/// Lifecycle errors, aligned with the engine-wide taxonomy.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("contract not found: {0}")]
    NotFound(ContractId),

    #[error("contract already exists: {0}")]
    AlreadyExists(ContractId),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidState {
        from: ContractState,
        to: ContractState,
    },

    #[error("contract {0} is archived and read-only")]
    ReadOnly(ContractId),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("version conflict: expected {expected}, current {actual}")]
    Conflict { expected: u64, actual: u64 },

    #[error("authorization denied: {reason}")]
    Authorization { reason: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("contract store lock poisoned")]
    LockPoisoned,
}

impl From<StoreError> for LifecycleError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => LifecycleError::NotFound(id),
            StoreError::AlreadyExists(id) => LifecycleError::AlreadyExists(id),
            StoreError::LockPoisoned => LifecycleError::LockPoisoned,
        }
    }
}

/// Result type alias for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;
