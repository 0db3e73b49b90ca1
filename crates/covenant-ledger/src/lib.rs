//! Covenant Audit Ledger - immutable record of every accepted mutation
//!
//! `append` is the only mutator. Events for one contract form a strictly
//! increasing, gapless sequence starting at 1, enforced under a single write
//! lock so concurrent writers cannot interleave. Nothing updates or deletes
//! an event; corrections are new events referencing the corrected sequence.
//! `verify` recomputes payload hashes for tamper detection - prevention is
//! the append-only single-writer discipline itself, not the hash.

#![deny(unsafe_code)]

use std::collections::HashMap;
use std::sync::RwLock;

use covenant_types::{AuditEvent, AuditPayload, ContractId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const PAYLOAD_HASH_DOMAIN: &[u8] = b"covenant-audit-event-v1:";

/// Append-only store of audit events, one stream per contract.
pub struct AuditLedger {
    inner: RwLock<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    streams: HashMap<ContractId, Vec<AuditEvent>>,
}

impl AuditLedger {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LedgerState::default()),
        }
    }

    /// Append one event. The caller must supply the next expected sequence
    /// number for the contract; anything else is a `SequenceGap`.
    pub fn append(&self, mut event: AuditEvent) -> Result<AuditEvent, LedgerError> {
        let mut state = self.inner.write().map_err(|_| LedgerError::LockPoisoned)?;

        let stream = state.streams.entry(event.contract_id.clone()).or_default();
        let expected = (stream.len() + 1) as u64;
        if event.sequence != expected {
            return Err(LedgerError::SequenceGap {
                contract_id: event.contract_id.clone(),
                expected,
                found: event.sequence,
            });
        }

        event.payload_hash = hash_payload(&event.payload)?;
        tracing::debug!(
            contract = %event.contract_id,
            sequence = event.sequence,
            action = %event.action,
            "audit event appended"
        );
        stream.push(event.clone());
        Ok(event)
    }

    /// The sequence number the next append for this contract must carry.
    pub fn next_sequence(&self, contract_id: &ContractId) -> Result<u64, LedgerError> {
        let state = self.inner.read().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(state
            .streams
            .get(contract_id)
            .map(|s| (s.len() + 1) as u64)
            .unwrap_or(1))
    }

    /// Read an inclusive sequence range, ordered by sequence. Restartable:
    /// callers resume from any sequence they have already seen.
    pub fn read_range(
        &self,
        contract_id: &ContractId,
        from_seq: u64,
        to_seq: u64,
    ) -> Result<Vec<AuditEvent>, LedgerError> {
        if from_seq == 0 || to_seq == 0 || from_seq > to_seq {
            return Err(LedgerError::InvalidRange {
                from: from_seq,
                to: to_seq,
            });
        }

        let state = self.inner.read().map_err(|_| LedgerError::LockPoisoned)?;
        let Some(stream) = state.streams.get(contract_id) else {
            return Ok(vec![]);
        };

        let start = (from_seq - 1) as usize;
        if start >= stream.len() {
            return Ok(vec![]);
        }

        let end_exclusive = to_seq.min(stream.len() as u64) as usize;
        Ok(stream[start..end_exclusive].to_vec())
    }

    pub fn read_all(&self, contract_id: &ContractId) -> Result<Vec<AuditEvent>, LedgerError> {
        let state = self.inner.read().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(state.streams.get(contract_id).cloned().unwrap_or_default())
    }

    /// Recompute every payload hash and check sequence gaplessness for one
    /// contract. Returns the first fault found, or `None` for a clean stream.
    pub fn verify(&self, contract_id: &ContractId) -> Result<Option<LedgerFault>, LedgerError> {
        let events = self.read_all(contract_id)?;

        for (index, event) in events.iter().enumerate() {
            let expected_seq = (index + 1) as u64;
            if event.sequence != expected_seq {
                return Ok(Some(LedgerFault {
                    sequence: event.sequence,
                    reason: format!("expected sequence {expected_seq}, found {}", event.sequence),
                }));
            }

            let recomputed = hash_payload(&event.payload)?;
            if recomputed != event.payload_hash {
                return Ok(Some(LedgerFault {
                    sequence: event.sequence,
                    reason: "payload hash mismatch".into(),
                }));
            }
        }

        Ok(None)
    }

    /// Contracts with at least one event, for export tooling.
    pub fn contracts(&self) -> Result<Vec<ContractId>, LedgerError> {
        let state = self.inner.read().map_err(|_| LedgerError::LockPoisoned)?;
        let mut ids: Vec<_> = state.streams.keys().cloned().collect();
        ids.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(ids)
    }

    #[cfg(test)]
    fn tamper_with(&self, contract_id: &ContractId, index: usize, payload: AuditPayload) {
        let mut state = self.inner.write().unwrap();
        state.streams.get_mut(contract_id).unwrap()[index].payload = payload;
    }
}

impl Default for AuditLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash of an event payload: blake3 over domain-prefixed canonical JSON.
pub fn hash_payload(payload: &AuditPayload) -> Result<[u8; 32], LedgerError> {
    let encoded = serde_json::to_vec(payload)
        .map_err(|error| LedgerError::Serialization(error.to_string()))?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(PAYLOAD_HASH_DOMAIN);
    hasher.update(&encoded);
    Ok(*hasher.finalize().as_bytes())
}

/// A verification finding: the first event that failed recomputation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerFault {
    pub sequence: u64,
    pub reason: String,
}

/// Ledger errors. `SequenceGap` is an internal-consistency fault: it means a
/// writer bypassed the single-writer discipline and needs operator attention.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("sequence gap for contract {contract_id}: expected {expected}, found {found}")]
    SequenceGap {
        contract_id: ContractId,
        expected: u64,
        found: u64,
    },

    #[error("invalid range: {from}..={to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("ledger lock poisoned")]
    LockPoisoned,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use covenant_types::{AuditAction, ContractState, PrincipalId};

    fn event(contract: &ContractId, sequence: u64) -> AuditEvent {
        AuditEvent::new(
            sequence,
            contract.clone(),
            PrincipalId::new("alice"),
            AuditAction::StateChanged,
            ContractState::Draft,
            ContractState::Active,
            Utc::now(),
            AuditPayload::StateChanged {
                reason: format!("step {sequence}"),
            },
        )
    }

    #[test]
    fn test_append_stamps_hash_and_sequence() {
        let ledger = AuditLedger::new();
        let contract = ContractId::new("c-1");

        let appended = ledger.append(event(&contract, 1)).unwrap();
        assert_ne!(appended.payload_hash, [0; 32]);
        assert_eq!(ledger.next_sequence(&contract).unwrap(), 2);
    }

    #[test]
    fn test_out_of_order_append_is_a_gap() {
        let ledger = AuditLedger::new();
        let contract = ContractId::new("c-1");
        ledger.append(event(&contract, 1)).unwrap();

        let error = ledger.append(event(&contract, 3)).unwrap_err();
        assert!(matches!(
            error,
            LedgerError::SequenceGap {
                expected: 2,
                found: 3,
                ..
            }
        ));
        // The stream is unchanged after a rejected append.
        assert_eq!(ledger.read_all(&contract).unwrap().len(), 1);
    }

    #[test]
    fn test_streams_are_independent_per_contract() {
        let ledger = AuditLedger::new();
        let first = ContractId::new("c-1");
        let second = ContractId::new("c-2");

        ledger.append(event(&first, 1)).unwrap();
        ledger.append(event(&second, 1)).unwrap();
        ledger.append(event(&first, 2)).unwrap();

        assert_eq!(ledger.next_sequence(&first).unwrap(), 3);
        assert_eq!(ledger.next_sequence(&second).unwrap(), 2);
    }

    #[test]
    fn test_read_range_is_inclusive_and_restartable() {
        let ledger = AuditLedger::new();
        let contract = ContractId::new("c-1");
        for seq in 1..=5 {
            ledger.append(event(&contract, seq)).unwrap();
        }

        let head = ledger.read_range(&contract, 1, 3).unwrap();
        assert_eq!(head.len(), 3);
        // Resume from where the previous read stopped.
        let tail = ledger.read_range(&contract, 4, 10).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].sequence, 4);

        let error = ledger.read_range(&contract, 3, 2).unwrap_err();
        assert!(matches!(error, LedgerError::InvalidRange { from: 3, to: 2 }));
    }

    #[test]
    fn test_verify_clean_stream() {
        let ledger = AuditLedger::new();
        let contract = ContractId::new("c-1");
        for seq in 1..=4 {
            ledger.append(event(&contract, seq)).unwrap();
        }
        assert_eq!(ledger.verify(&contract).unwrap(), None);
    }

    #[test]
    fn test_verify_detects_tampering() {
        let ledger = AuditLedger::new();
        let contract = ContractId::new("c-1");
        for seq in 1..=3 {
            ledger.append(event(&contract, seq)).unwrap();
        }

        ledger.tamper_with(
            &contract,
            1,
            AuditPayload::StateChanged {
                reason: "rewritten history".into(),
            },
        );

        let fault = ledger.verify(&contract).unwrap().unwrap();
        assert_eq!(fault.sequence, 2);
        assert_eq!(fault.reason, "payload hash mismatch");
    }

    #[test]
    fn test_contracts_listing() {
        let ledger = AuditLedger::new();
        ledger.append(event(&ContractId::new("c-b"), 1)).unwrap();
        ledger.append(event(&ContractId::new("c-a"), 1)).unwrap();

        let ids = ledger.contracts().unwrap();
        assert_eq!(ids, vec![ContractId::new("c-a"), ContractId::new("c-b")]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Appending n events in order always yields a gapless 1..=n
            /// stream that verifies clean.
            #[test]
            fn appended_streams_are_gapless_and_clean(n in 1usize..40) {
                let ledger = AuditLedger::new();
                let contract = ContractId::new("c-prop");
                for seq in 1..=n as u64 {
                    ledger.append(event(&contract, seq)).unwrap();
                }

                let events = ledger.read_all(&contract).unwrap();
                prop_assert_eq!(events.len(), n);
                for (index, event) in events.iter().enumerate() {
                    prop_assert_eq!(event.sequence, (index + 1) as u64);
                }
                prop_assert_eq!(ledger.verify(&contract).unwrap(), None);
            }

            /// Tampering with any single payload is always pinpointed at
            /// exactly that sequence.
            #[test]
            fn tampering_is_pinpointed(n in 2usize..30, victim in 0usize..30) {
                prop_assume!(victim < n);
                let ledger = AuditLedger::new();
                let contract = ContractId::new("c-prop");
                for seq in 1..=n as u64 {
                    ledger.append(event(&contract, seq)).unwrap();
                }

                ledger.tamper_with(
                    &contract,
                    victim,
                    AuditPayload::StateChanged { reason: "forged".into() },
                );

                let fault = ledger.verify(&contract).unwrap().unwrap();
                prop_assert_eq!(fault.sequence, (victim + 1) as u64);
            }
        }
    }
}
