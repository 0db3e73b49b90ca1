//! The fixed transition graph: an explicit table, not a rule engine
//!
//! Each edge carries its guard as a plain function so the guards stay
//! auditable and testable in isolation. Forward-only; there is no edge back
//! to Draft and no edge out of Archived.

use chrono::NaiveDate;
use covenant_types::{Contract, ContractState, RenewalIntent};
use serde::{Deserialize, Serialize};

/// How a transition was initiated. Clock-initiated edges check their date
/// window; a manual trigger carries the initiating principal's judgement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionTrigger {
    Manual,
    Clock,
}

/// Caller-supplied input for one transition attempt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub target: ContractState,
    pub reason: String,
    /// Optimistic-concurrency token; must match the contract's current version.
    pub expected_version: u64,
    pub trigger: TransitionTrigger,
    /// Replacement dates for a renewal (Expiring -> Active).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_effective_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_termination_date: Option<NaiveDate>,
    /// External retention-policy input for Terminated -> Archived.
    pub retention_hold_expired: bool,
}

impl TransitionRequest {
    pub fn manual(target: ContractState, reason: impl Into<String>, expected_version: u64) -> Self {
        Self {
            target,
            reason: reason.into(),
            expected_version,
            trigger: TransitionTrigger::Manual,
            new_effective_date: None,
            new_termination_date: None,
            retention_hold_expired: false,
        }
    }

    pub fn clock(target: ContractState, reason: impl Into<String>, expected_version: u64) -> Self {
        Self {
            trigger: TransitionTrigger::Clock,
            ..Self::manual(target, reason, expected_version)
        }
    }

    pub fn with_renewal_dates(mut self, effective: NaiveDate, termination: NaiveDate) -> Self {
        self.new_effective_date = Some(effective);
        self.new_termination_date = Some(termination);
        self
    }

    pub fn with_retention_hold_expired(mut self) -> Self {
        self.retention_hold_expired = true;
        self
    }
}

/// Guard predicate: `Err` carries the human-readable refusal.
pub type Guard = fn(&Contract, &TransitionRequest, NaiveDate) -> Result<(), String>;

/// One edge of the transition graph.
pub struct TransitionEdge {
    pub from: ContractState,
    pub to: ContractState,
    pub guard: Guard,
}

/// The whole graph. Authorization per edge lives in the gate crate; the
/// guards here check data preconditions only.
pub static TRANSITION_TABLE: &[TransitionEdge] = &[
    TransitionEdge {
        from: ContractState::Draft,
        to: ContractState::Active,
        guard: guard_draft_to_active,
    },
    TransitionEdge {
        from: ContractState::Active,
        to: ContractState::Expiring,
        guard: guard_active_to_expiring,
    },
    TransitionEdge {
        from: ContractState::Expiring,
        to: ContractState::Terminated,
        guard: guard_expiring_to_terminated,
    },
    TransitionEdge {
        from: ContractState::Expiring,
        to: ContractState::Active,
        guard: guard_expiring_to_active,
    },
    TransitionEdge {
        from: ContractState::Terminated,
        to: ContractState::Archived,
        guard: guard_terminated_to_archived,
    },
];

pub fn find_edge(from: ContractState, to: ContractState) -> Option<&'static TransitionEdge> {
    TRANSITION_TABLE
        .iter()
        .find(|edge| edge.from == from && edge.to == to)
}

fn guard_draft_to_active(
    contract: &Contract,
    _request: &TransitionRequest,
    _today: NaiveDate,
) -> Result<(), String> {
    if contract.vendor_id.is_none() {
        return Err("activation requires a vendor".into());
    }
    if contract.effective_date.is_none() {
        return Err("activation requires an effective date".into());
    }
    Ok(())
}

fn guard_active_to_expiring(
    contract: &Contract,
    request: &TransitionRequest,
    today: NaiveDate,
) -> Result<(), String> {
    match request.trigger {
        TransitionTrigger::Manual => Ok(()),
        TransitionTrigger::Clock => {
            if contract.termination_date.is_none() || contract.notice_period_days.is_none() {
                return Err("clock trigger requires termination date and notice period".into());
            }
            if contract.in_notice_window(today) {
                Ok(())
            } else {
                Err("current date is outside the notice window".into())
            }
        }
    }
}

fn guard_expiring_to_terminated(
    contract: &Contract,
    _request: &TransitionRequest,
    today: NaiveDate,
) -> Result<(), String> {
    match contract.renewal.intent {
        RenewalIntent::Terminate => Ok(()),
        RenewalIntent::Renew => {
            Err("a renewal was recorded; transition to Active instead".into())
        }
        RenewalIntent::Undecided => {
            let reached = contract
                .termination_date
                .map(|termination| today >= termination)
                .unwrap_or(false);
            if reached {
                Ok(())
            } else {
                Err("no renewal decision and the termination date has not been reached".into())
            }
        }
    }
}

fn guard_expiring_to_active(
    contract: &Contract,
    request: &TransitionRequest,
    _today: NaiveDate,
) -> Result<(), String> {
    if contract.renewal.intent != RenewalIntent::Renew {
        return Err("renewal requires renewalIntent = renew".into());
    }
    if request.new_effective_date.is_none() || request.new_termination_date.is_none() {
        return Err("renewal requires new effective and termination dates".into());
    }
    Ok(())
}

fn guard_terminated_to_archived(
    _contract: &Contract,
    request: &TransitionRequest,
    _today: NaiveDate,
) -> Result<(), String> {
    if request.retention_hold_expired {
        Ok(())
    } else {
        Err("retention hold has not expired".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use covenant_types::{ContractId, PrincipalId, RenewalDecision, VendorId};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn base_contract() -> Contract {
        Contract::draft(
            ContractId::new("c-1"),
            "MSA",
            PrincipalId::new("alice"),
            Utc::now(),
        )
        .with_vendor(VendorId::new("v-1"))
        .with_dates(date(2024, 1, 1), date(2024, 12, 31))
        .with_notice_period(180)
    }

    #[test]
    fn test_table_is_forward_only() {
        assert_eq!(TRANSITION_TABLE.len(), 5);
        assert!(find_edge(ContractState::Draft, ContractState::Active).is_some());
        assert!(find_edge(ContractState::Draft, ContractState::Terminated).is_none());
        assert!(find_edge(ContractState::Active, ContractState::Draft).is_none());
        assert!(find_edge(ContractState::Archived, ContractState::Active).is_none());
    }

    #[test]
    fn test_draft_activation_guard() {
        let request = TransitionRequest::manual(ContractState::Active, "activate", 1);
        assert!(guard_draft_to_active(&base_contract(), &request, date(2024, 1, 1)).is_ok());

        let mut no_vendor = base_contract();
        no_vendor.vendor_id = None;
        assert!(guard_draft_to_active(&no_vendor, &request, date(2024, 1, 1)).is_err());

        let mut no_date = base_contract();
        no_date.effective_date = None;
        assert!(guard_draft_to_active(&no_date, &request, date(2024, 1, 1)).is_err());
    }

    #[test]
    fn test_expiring_guard_clock_vs_manual() {
        let contract = base_contract();
        let clock = TransitionRequest::clock(ContractState::Expiring, "window opened", 1);
        // Outside the window (starts 2024-07-04).
        assert!(guard_active_to_expiring(&contract, &clock, date(2024, 6, 15)).is_err());
        assert!(guard_active_to_expiring(&contract, &clock, date(2024, 7, 4)).is_ok());

        // Manual trigger does not consult the clock.
        let manual = TransitionRequest::manual(ContractState::Expiring, "early review", 1);
        assert!(guard_active_to_expiring(&contract, &manual, date(2024, 2, 1)).is_ok());
    }

    #[test]
    fn test_termination_guard_follows_renewal_intent() {
        let request = TransitionRequest::manual(ContractState::Terminated, "wind down", 1);

        let mut terminate = base_contract();
        terminate.renewal = RenewalDecision::new(RenewalIntent::Terminate, "cost");
        assert!(guard_expiring_to_terminated(&terminate, &request, date(2024, 8, 1)).is_ok());

        let mut renew = base_contract();
        renew.renewal = RenewalDecision::new(RenewalIntent::Renew, "keep");
        assert!(guard_expiring_to_terminated(&renew, &request, date(2025, 1, 1)).is_err());

        // Undecided terminates only once the termination date is reached.
        let undecided = base_contract();
        assert!(guard_expiring_to_terminated(&undecided, &request, date(2024, 12, 30)).is_err());
        assert!(guard_expiring_to_terminated(&undecided, &request, date(2024, 12, 31)).is_ok());
    }

    #[test]
    fn test_renewal_guard_needs_intent_and_dates() {
        let mut contract = base_contract();
        contract.renewal = RenewalDecision::new(RenewalIntent::Renew, "good vendor");

        let bare = TransitionRequest::manual(ContractState::Active, "renew", 1);
        assert!(guard_expiring_to_active(&contract, &bare, date(2024, 8, 1)).is_err());

        let with_dates = bare
            .clone()
            .with_renewal_dates(date(2025, 1, 1), date(2025, 12, 31));
        assert!(guard_expiring_to_active(&contract, &with_dates, date(2024, 8, 1)).is_ok());

        contract.renewal = RenewalDecision::undecided();
        assert!(guard_expiring_to_active(&contract, &with_dates, date(2024, 8, 1)).is_err());
    }

    #[test]
    fn test_archival_guard_is_the_retention_input() {
        let contract = base_contract();
        let held = TransitionRequest::manual(ContractState::Archived, "archive", 1);
        assert!(guard_terminated_to_archived(&contract, &held, date(2025, 6, 1)).is_err());

        let released = held.clone().with_retention_hold_expired();
        assert!(guard_terminated_to_archived(&contract, &released, date(2025, 6, 1)).is_ok());
    }
}
