//! In-memory contract store, the single shared resource per contract
//!
//! All same-contract mutations run inside `with_write`, so a state change and
//! its ledger append commit as one critical section. Reads take the read lock
//! and may observe a version that a concurrent writer is about to bump; every
//! mutating path re-validates against the current version at commit time.

use std::collections::HashMap;
use std::sync::RwLock;

use covenant_types::{Contract, ContractId};
use thiserror::Error;

pub struct ContractStore {
    contracts: RwLock<HashMap<ContractId, Contract>>,
}

impl ContractStore {
    pub fn new() -> Self {
        Self {
            contracts: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, contract_id: &ContractId) -> Result<Contract, StoreError> {
        let contracts = self.contracts.read().map_err(|_| StoreError::LockPoisoned)?;
        contracts
            .get(contract_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(contract_id.clone()))
    }

    pub fn list(&self) -> Result<Vec<Contract>, StoreError> {
        let contracts = self.contracts.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut all: Vec<_> = contracts.values().cloned().collect();
        all.sort_by(|a, b| a.contract_id.0.cmp(&b.contract_id.0));
        Ok(all)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let contracts = self.contracts.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(contracts.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Run one read-validate-mutate-commit unit under the write lock.
    ///
    /// Writers across components (lifecycle, provenance) funnel through here,
    /// which serializes all mutations of a contract and lets the closure pair
    /// the mutation with its ledger append atomically.
    pub fn with_write<R>(
        &self,
        f: impl FnOnce(&mut HashMap<ContractId, Contract>) -> R,
    ) -> Result<R, StoreError> {
        let mut contracts = self.contracts.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&mut contracts))
    }
}

impl Default for ContractStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("contract not found: {0}")]
    NotFound(ContractId),

    #[error("contract already exists: {0}")]
    AlreadyExists(ContractId),

    #[error("contract store lock poisoned")]
    LockPoisoned,
}
