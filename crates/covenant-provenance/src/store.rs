//! The provenance store: verified field records and extraction batches
//!
//! `fields` holds only `Verified` records - the authoritative view. Extracted
//! candidates live inside their batches until a human decision, so multiple
//! conflicting candidates can coexist without loss.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use covenant_types::{
    BatchId, ContractId, ExtractionBatch, FieldRecord, FieldReport, FieldReportEntry,
    FieldSource, ProvisionalValue, VerifiedValue,
};

use crate::{ProvenanceError, ProvenanceResult};

pub struct ProvenanceStore {
    fields: RwLock<HashMap<ContractId, BTreeMap<String, FieldRecord>>>,
    batches: RwLock<HashMap<BatchId, ExtractionBatch>>,
    contract_index: RwLock<HashMap<ContractId, Vec<BatchId>>>,
}

impl ProvenanceStore {
    pub fn new() -> Self {
        Self {
            fields: RwLock::new(HashMap::new()),
            batches: RwLock::new(HashMap::new()),
            contract_index: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert_batch(&self, batch: ExtractionBatch) -> ProvenanceResult<()> {
        let mut batches = self
            .batches
            .write()
            .map_err(|_| ProvenanceError::LockPoisoned)?;
        let mut index = self
            .contract_index
            .write()
            .map_err(|_| ProvenanceError::LockPoisoned)?;

        index
            .entry(batch.contract_id.clone())
            .or_default()
            .push(batch.batch_id.clone());
        batches.insert(batch.batch_id.clone(), batch);
        Ok(())
    }

    pub fn batch(&self, batch_id: &BatchId) -> ProvenanceResult<ExtractionBatch> {
        let batches = self
            .batches
            .read()
            .map_err(|_| ProvenanceError::LockPoisoned)?;
        batches
            .get(batch_id)
            .cloned()
            .ok_or_else(|| ProvenanceError::BatchNotFound(batch_id.clone()))
    }

    pub fn batches_for(&self, contract_id: &ContractId) -> ProvenanceResult<Vec<ExtractionBatch>> {
        let batches = self
            .batches
            .read()
            .map_err(|_| ProvenanceError::LockPoisoned)?;
        let index = self
            .contract_index
            .read()
            .map_err(|_| ProvenanceError::LockPoisoned)?;

        let ids = match index.get(contract_id) {
            Some(ids) => ids,
            None => return Ok(vec![]),
        };

        Ok(ids
            .iter()
            .filter_map(|id| batches.get(id).cloned())
            .collect())
    }

    /// Mutate one batch under the write lock.
    pub fn with_batch_mut<R>(
        &self,
        batch_id: &BatchId,
        f: impl FnOnce(&mut ExtractionBatch) -> ProvenanceResult<R>,
    ) -> ProvenanceResult<R> {
        let mut batches = self
            .batches
            .write()
            .map_err(|_| ProvenanceError::LockPoisoned)?;
        let batch = batches
            .get_mut(batch_id)
            .ok_or_else(|| ProvenanceError::BatchNotFound(batch_id.clone()))?;
        f(batch)
    }

    pub fn verified_field(
        &self,
        contract_id: &ContractId,
        field: &str,
    ) -> ProvenanceResult<Option<FieldRecord>> {
        let fields = self
            .fields
            .read()
            .map_err(|_| ProvenanceError::LockPoisoned)?;
        Ok(fields
            .get(contract_id)
            .and_then(|map| map.get(field))
            .cloned())
    }

    /// Install a `Verified` record, replacing any prior record for the field.
    pub fn set_verified(&self, record: FieldRecord, contract_id: &ContractId) -> ProvenanceResult<()> {
        debug_assert!(matches!(record.source, FieldSource::Verified { .. }));
        let mut fields = self
            .fields
            .write()
            .map_err(|_| ProvenanceError::LockPoisoned)?;
        fields
            .entry(contract_id.clone())
            .or_default()
            .insert(record.field.clone(), record);
        Ok(())
    }

    /// Merge verified values and still-pending candidates into one report.
    /// Cancelled batches contribute nothing.
    pub fn field_report(&self, contract_id: &ContractId) -> ProvenanceResult<FieldReport> {
        let verified = {
            let fields = self
                .fields
                .read()
                .map_err(|_| ProvenanceError::LockPoisoned)?;
            fields.get(contract_id).cloned().unwrap_or_default()
        };

        let mut entries: BTreeMap<String, FieldReportEntry> = BTreeMap::new();
        for (field, record) in verified {
            let value = match &record.source {
                FieldSource::Verified { approver_id } => VerifiedValue {
                    value: record.value.clone(),
                    approver_id: approver_id.clone(),
                    updated_at: record.updated_at,
                },
                FieldSource::Extracted { .. } => continue,
            };
            entries.insert(
                field.clone(),
                FieldReportEntry {
                    field,
                    verified: Some(value),
                    provisional: Vec::new(),
                },
            );
        }

        for batch in self.batches_for(contract_id)? {
            if batch.status == covenant_types::BatchStatus::Cancelled {
                continue;
            }
            for candidate in batch.candidates.iter().filter(|c| c.is_pending()) {
                let entry = entries
                    .entry(candidate.field.clone())
                    .or_insert_with(|| FieldReportEntry {
                        field: candidate.field.clone(),
                        verified: None,
                        provisional: Vec::new(),
                    });
                entry.provisional.push(ProvisionalValue {
                    batch_id: batch.batch_id.clone(),
                    value: candidate.value.clone(),
                    confidence: candidate.confidence,
                });
            }
        }

        Ok(FieldReport {
            contract_id: contract_id.clone(),
            fields: entries.into_values().collect(),
        })
    }
}

impl Default for ProvenanceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use covenant_types::{DocumentRef, PrincipalId, ProposedField};

    fn store_with_batch(proposed: Vec<ProposedField>) -> (ProvenanceStore, BatchId, ContractId) {
        let store = ProvenanceStore::new();
        let contract_id = ContractId::new("c-1");
        let batch = ExtractionBatch::new(
            contract_id.clone(),
            DocumentRef::new("doc-1", 1, "hash"),
            proposed,
            PrincipalId::new("submitter"),
            Utc::now(),
        );
        let batch_id = batch.batch_id.clone();
        store.insert_batch(batch).unwrap();
        (store, batch_id, contract_id)
    }

    #[test]
    fn test_unverified_field_stays_unverified_in_report() {
        let (store, _batch_id, contract_id) =
            store_with_batch(vec![ProposedField::new("price", "1000", 0.8)]);

        let report = store.field_report(&contract_id).unwrap();
        assert_eq!(report.fields.len(), 1);
        let entry = &report.fields[0];
        assert!(entry.verified.is_none());
        assert!(!entry.is_authoritative());
        assert_eq!(entry.provisional.len(), 1);
        assert_eq!(entry.provisional[0].value, "1000");
    }

    #[test]
    fn test_conflicting_candidates_coexist() {
        let (store, _first, contract_id) =
            store_with_batch(vec![ProposedField::new("price", "1000", 0.8)]);
        let second = ExtractionBatch::new(
            contract_id.clone(),
            DocumentRef::new("doc-1", 2, "hash-2"),
            vec![ProposedField::new("price", "1100", 0.6)],
            PrincipalId::new("submitter"),
            Utc::now(),
        );
        store.insert_batch(second).unwrap();

        let report = store.field_report(&contract_id).unwrap();
        let entry = &report.fields[0];
        // Both provisional values remain visible; nothing auto-resolves.
        assert_eq!(entry.provisional.len(), 2);
        assert!(entry.verified.is_none());
    }

    #[test]
    fn test_verified_value_is_authoritative_next_to_candidates() {
        let (store, _batch_id, contract_id) =
            store_with_batch(vec![ProposedField::new("price", "1000", 0.8)]);
        store
            .set_verified(
                FieldRecord::verified("price", "1200", PrincipalId::new("rev"), Utc::now()),
                &contract_id,
            )
            .unwrap();

        let report = store.field_report(&contract_id).unwrap();
        let entry = &report.fields[0];
        assert_eq!(entry.verified.as_ref().unwrap().value, "1200");
        assert_eq!(entry.provisional.len(), 1);
        assert_eq!(entry.provisional[0].value, "1000");
    }

    #[test]
    fn test_cancelled_batches_drop_out_of_reports() {
        let (store, batch_id, contract_id) =
            store_with_batch(vec![ProposedField::new("price", "1000", 0.8)]);
        store
            .with_batch_mut(&batch_id, |batch| {
                batch.status = covenant_types::BatchStatus::Cancelled;
                Ok(())
            })
            .unwrap();

        let report = store.field_report(&contract_id).unwrap();
        assert!(report.fields.is_empty());
    }
}
