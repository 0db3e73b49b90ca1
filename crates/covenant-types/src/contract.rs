//! Contract identity, lifecycle state, and renewal intent

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::PrincipalId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractId(pub String);
impl ContractId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
impl std::fmt::Display for ContractId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VendorId(pub String);
impl VendorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}
impl std::fmt::Display for VendorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states, forward-only: Draft -> Active -> Expiring -> Terminated -> Archived
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractState {
    Draft,
    Active,
    Expiring,
    Terminated,
    Archived,
}

impl ContractState {
    /// Archived contracts accept no further mutation, only audit export.
    pub fn is_read_only(&self) -> bool {
        matches!(self, ContractState::Archived)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ContractState::Archived)
    }
}

impl std::fmt::Display for ContractState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ContractState::Draft => "draft",
            ContractState::Active => "active",
            ContractState::Expiring => "expiring",
            ContractState::Terminated => "terminated",
            ContractState::Archived => "archived",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenewalIntent {
    Undecided,
    Renew,
    Terminate,
}

impl RenewalIntent {
    /// Whether a human has recorded a renewal decision either way.
    pub fn is_decided(&self) -> bool {
        !matches!(self, RenewalIntent::Undecided)
    }
}

/// A renewal decision with its free-text rationale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalDecision {
    pub intent: RenewalIntent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl RenewalDecision {
    pub fn undecided() -> Self {
        Self {
            intent: RenewalIntent::Undecided,
            rationale: None,
        }
    }

    pub fn new(intent: RenewalIntent, rationale: impl Into<String>) -> Self {
        Self {
            intent,
            rationale: Some(rationale.into()),
        }
    }
}

/// A contractual agreement under lifecycle management.
///
/// `version` is the optimistic-concurrency token: it increments exactly once
/// per accepted transition or field commit, and every mutating entry point
/// re-validates the caller's expected version against it at commit time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Contract {
    pub contract_id: ContractId,
    pub title: String,
    pub state: ContractState,
    pub owner_id: PrincipalId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<VendorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice_period_days: Option<u32>,
    pub renewal: RenewalDecision,
    pub sensitive: bool,
    pub tags: Vec<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    /// Create a new Draft at version 1.
    pub fn draft(
        contract_id: ContractId,
        title: impl Into<String>,
        owner_id: PrincipalId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            contract_id,
            title: title.into(),
            state: ContractState::Draft,
            owner_id,
            vendor_id: None,
            effective_date: None,
            termination_date: None,
            notice_period_days: None,
            renewal: RenewalDecision::undecided(),
            sensitive: false,
            tags: Vec::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_vendor(mut self, vendor_id: VendorId) -> Self {
        self.vendor_id = Some(vendor_id);
        self
    }

    pub fn with_dates(mut self, effective: NaiveDate, termination: NaiveDate) -> Self {
        self.effective_date = Some(effective);
        self.termination_date = Some(termination);
        self
    }

    pub fn with_notice_period(mut self, days: u32) -> Self {
        self.notice_period_days = Some(days);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn is_owned_by(&self, principal_id: &PrincipalId) -> bool {
        self.owner_id == *principal_id
    }

    /// The first day of the notice window, when termination and notice period
    /// are both set.
    pub fn notice_window_start(&self) -> Option<NaiveDate> {
        let termination = self.termination_date?;
        let notice_days = self.notice_period_days?;
        Some(termination - chrono::Duration::days(i64::from(notice_days)))
    }

    /// Whether `today` falls within the notice window preceding termination.
    pub fn in_notice_window(&self, today: NaiveDate) -> bool {
        match self.notice_window_start() {
            Some(start) => today >= start,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_draft_starts_at_version_one() {
        let contract = Contract::draft(
            ContractId::generate(),
            "MSA",
            PrincipalId::new("alice"),
            Utc::now(),
        );
        assert_eq!(contract.state, ContractState::Draft);
        assert_eq!(contract.version, 1);
        assert!(!contract.sensitive);
    }

    #[test]
    fn test_notice_window() {
        let contract = Contract::draft(
            ContractId::generate(),
            "MSA",
            PrincipalId::new("alice"),
            Utc::now(),
        )
        .with_dates(date(2024, 1, 1), date(2024, 12, 31))
        .with_notice_period(180);

        assert_eq!(contract.notice_window_start(), Some(date(2024, 7, 4)));
        assert!(!contract.in_notice_window(date(2024, 6, 15)));
        assert!(contract.in_notice_window(date(2024, 7, 4)));
        assert!(contract.in_notice_window(date(2024, 10, 1)));
    }

    #[test]
    fn test_notice_window_requires_dates() {
        let contract = Contract::draft(
            ContractId::generate(),
            "MSA",
            PrincipalId::new("alice"),
            Utc::now(),
        );
        assert!(contract.notice_window_start().is_none());
        assert!(!contract.in_notice_window(date(2024, 7, 4)));
    }

    #[test]
    fn test_only_archived_is_read_only() {
        assert!(ContractState::Archived.is_read_only());
        assert!(!ContractState::Terminated.is_read_only());
        assert!(!ContractState::Draft.is_read_only());
    }
}
