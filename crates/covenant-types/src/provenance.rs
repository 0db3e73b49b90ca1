//! Field provenance: extracted candidates vs. human-verified values
//!
//! A field value is a tagged variant, not a flag: `Extracted` candidates can
//! coexist (even when they conflict) until a human approval produces the one
//! `Verified` record. Nothing ever promotes an extracted value by default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContractId, PrincipalId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub String);
impl BatchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque pointer to one document version held by the document collaborator.
/// The engine attaches `content_hash` as provenance data and never re-derives it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub document_id: String,
    pub version: u32,
    pub content_hash: String,
}

impl DocumentRef {
    pub fn new(document_id: impl Into<String>, version: u32, content_hash: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            version,
            content_hash: content_hash.into(),
        }
    }
}

/// Where a field value came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldSource {
    /// Machine-extracted, provisional until a human approves it.
    Extracted { confidence: f64 },
    /// Human-approved, authoritative.
    Verified { approver_id: PrincipalId },
}

impl FieldSource {
    pub fn is_verified(&self) -> bool {
        matches!(self, FieldSource::Verified { .. })
    }
}

/// The current record for one contract field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub field: String,
    pub value: String,
    pub source: FieldSource,
    pub updated_at: DateTime<Utc>,
}

impl FieldRecord {
    pub fn verified(
        field: impl Into<String>,
        value: impl Into<String>,
        approver_id: PrincipalId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            source: FieldSource::Verified { approver_id },
            updated_at: now,
        }
    }
}

/// A field/value/confidence tuple as returned by the extraction collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposedField {
    pub field: String,
    pub value: String,
    pub confidence: f64,
}

impl ProposedField {
    pub fn new(field: impl Into<String>, value: impl Into<String>, confidence: f64) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            confidence,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateStatus {
    Pending,
    Approved,
    Rejected,
}

/// One proposed field inside an extraction batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldCandidate {
    pub field: String,
    pub value: String,
    pub confidence: f64,
    pub status: CandidateStatus,
}

impl FieldCandidate {
    pub fn pending(proposed: ProposedField) -> Self {
        Self {
            field: proposed.field,
            value: proposed.value,
            confidence: proposed.confidence,
            status: CandidateStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, CandidateStatus::Pending)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    Pending,
    PartiallyApproved,
    Approved,
    Rejected,
    Cancelled,
}

/// One extraction run over one document version, awaiting human review.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionBatch {
    pub batch_id: BatchId,
    pub contract_id: ContractId,
    pub document: DocumentRef,
    pub status: BatchStatus,
    pub candidates: Vec<FieldCandidate>,
    pub submitted_by: PrincipalId,
    pub submitted_at: DateTime<Utc>,
}

impl ExtractionBatch {
    pub fn new(
        contract_id: ContractId,
        document: DocumentRef,
        proposed: Vec<ProposedField>,
        submitted_by: PrincipalId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            batch_id: BatchId::generate(),
            contract_id,
            document,
            status: BatchStatus::Pending,
            candidates: proposed.into_iter().map(FieldCandidate::pending).collect(),
            submitted_by,
            submitted_at: now,
        }
    }

    pub fn candidate(&self, field: &str) -> Option<&FieldCandidate> {
        self.candidates.iter().find(|c| c.field == field)
    }

    pub fn candidate_mut(&mut self, field: &str) -> Option<&mut FieldCandidate> {
        self.candidates.iter_mut().find(|c| c.field == field)
    }

    /// Derive batch status from candidate statuses. Cancelled is sticky.
    pub fn recompute_status(&mut self) {
        if self.status == BatchStatus::Cancelled {
            return;
        }
        let total = self.candidates.len();
        let approved = self
            .candidates
            .iter()
            .filter(|c| c.status == CandidateStatus::Approved)
            .count();
        let rejected = self
            .candidates
            .iter()
            .filter(|c| c.status == CandidateStatus::Rejected)
            .count();

        self.status = if approved == total && total > 0 {
            BatchStatus::Approved
        } else if rejected == total && total > 0 {
            BatchStatus::Rejected
        } else if approved > 0 || rejected > 0 {
            BatchStatus::PartiallyApproved
        } else {
            BatchStatus::Pending
        };
    }
}

/// The authoritative value of one field, for reporting consumers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerifiedValue {
    pub value: String,
    pub approver_id: PrincipalId,
    pub updated_at: DateTime<Utc>,
}

/// A still-provisional candidate visible alongside the authoritative value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProvisionalValue {
    pub batch_id: BatchId,
    pub value: String,
    pub confidence: f64,
}

/// Per-field report entry: `verified = None` means the field is unverified,
/// never that a provisional candidate has been promoted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldReportEntry {
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<VerifiedValue>,
    pub provisional: Vec<ProvisionalValue>,
}

impl FieldReportEntry {
    pub fn is_authoritative(&self) -> bool {
        self.verified.is_some()
    }
}

/// Everything reporting consumers may see about a contract's fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldReport {
    pub contract_id: ContractId,
    pub fields: Vec<FieldReportEntry>,
}
