//! The lifecycle engine: validated, gated, audited contract mutations
//!
//! Validation order per attempt: read-only check, edge lookup, guard, gate,
//! version token. Only after all of them pass does the closure append the
//! audit event and apply the mutation, still inside the store's write lock,
//! so no failure mode leaves a state change without its event or vice versa.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use covenant_gate::AuthorizationGate;
use covenant_ledger::AuditLedger;
use covenant_types::{
    Action, AuditAction, AuditEvent, AuditPayload, Contract, ContractId, ContractState, Principal,
    PrincipalId, RenewalDecision, VendorId,
};
use serde::{Deserialize, Serialize};

use crate::{find_edge, ContractStore, LifecycleError, LifecycleResult, TransitionRequest};

/// Parameters for creating a new Draft.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewContract {
    pub title: String,
    pub owner_id: PrincipalId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<VendorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice_period_days: Option<u32>,
    pub sensitive: bool,
    pub tags: Vec<String>,
}

impl NewContract {
    pub fn new(title: impl Into<String>, owner_id: PrincipalId) -> Self {
        Self {
            title: title.into(),
            owner_id,
            vendor_id: None,
            effective_date: None,
            termination_date: None,
            notice_period_days: None,
            sensitive: false,
            tags: Vec::new(),
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

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// In-place corrections to a Draft. `None` leaves a field untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DraftChanges {
    pub title: Option<String>,
    pub vendor_id: Option<VendorId>,
    pub effective_date: Option<NaiveDate>,
    pub termination_date: Option<NaiveDate>,
    pub notice_period_days: Option<u32>,
    pub sensitive: Option<bool>,
    pub tags: Option<Vec<String>>,
}

impl DraftChanges {
    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    pub fn changed_fields(&self) -> Vec<String> {
        let mut changed = Vec::new();
        if self.title.is_some() {
            changed.push("title".into());
        }
        if self.vendor_id.is_some() {
            changed.push("vendor_id".into());
        }
        if self.effective_date.is_some() {
            changed.push("effective_date".into());
        }
        if self.termination_date.is_some() {
            changed.push("termination_date".into());
        }
        if self.notice_period_days.is_some() {
            changed.push("notice_period_days".into());
        }
        if self.sensitive.is_some() {
            changed.push("sensitive".into());
        }
        if self.tags.is_some() {
            changed.push("tags".into());
        }
        changed
    }
}

/// Contract counts by state, for the reporting dashboard.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LifecycleStatistics {
    pub total: usize,
    pub by_state: HashMap<String, usize>,
}

pub struct LifecycleEngine {
    store: Arc<ContractStore>,
    gate: Arc<AuthorizationGate>,
    ledger: Arc<AuditLedger>,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<ContractStore>,
        gate: Arc<AuthorizationGate>,
        ledger: Arc<AuditLedger>,
    ) -> Self {
        Self {
            store,
            gate,
            ledger,
        }
    }

    pub fn store(&self) -> &ContractStore {
        &self.store
    }

    /// Create a new contract in Draft at version 1, with its creation event
    /// as sequence 1 of the audit stream.
    pub fn create(
        &self,
        params: NewContract,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> LifecycleResult<Contract> {
        if params.title.trim().is_empty() {
            return Err(LifecycleError::Validation("title must not be empty".into()));
        }
        if let covenant_gate::GateDecision::Deny { reason } = self.gate.authorize_create(actor) {
            return Err(LifecycleError::Authorization { reason });
        }

        let mut contract = Contract::draft(
            ContractId::generate(),
            params.title,
            params.owner_id,
            now,
        );
        contract.vendor_id = params.vendor_id;
        contract.effective_date = params.effective_date;
        contract.termination_date = params.termination_date;
        contract.notice_period_days = params.notice_period_days;
        contract.sensitive = params.sensitive;
        contract.tags = params.tags;

        let ledger = Arc::clone(&self.ledger);
        let actor_id = actor.principal_id.clone();
        self.store.with_write(|contracts| {
            let event = AuditEvent::new(
                ledger.next_sequence(&contract.contract_id)?,
                contract.contract_id.clone(),
                actor_id,
                AuditAction::ContractCreated,
                ContractState::Draft,
                ContractState::Draft,
                now,
                AuditPayload::ContractCreated {
                    title: contract.title.clone(),
                    owner_id: contract.owner_id.clone(),
                },
            );
            ledger.append(event)?;
            contracts.insert(contract.contract_id.clone(), contract.clone());
            tracing::info!(contract = %contract.contract_id, owner = %contract.owner_id, "contract created");
            Ok(contract.clone())
        })?
    }

    /// Execute one lifecycle transition.
    pub fn transition(
        &self,
        contract_id: &ContractId,
        request: TransitionRequest,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> LifecycleResult<Contract> {
        let today = now.date_naive();
        let ledger = Arc::clone(&self.ledger);
        let gate = Arc::clone(&self.gate);

        self.store.with_write(|contracts| {
            let contract = contracts
                .get(contract_id)
                .ok_or_else(|| LifecycleError::NotFound(contract_id.clone()))?;

            if contract.state.is_read_only() {
                return Err(LifecycleError::ReadOnly(contract_id.clone()));
            }

            let from = contract.state;
            let to = request.target;
            let edge = find_edge(from, to).ok_or(LifecycleError::InvalidState { from, to })?;

            (edge.guard)(contract, &request, today).map_err(LifecycleError::Validation)?;

            let action = Action::Transition { from, to };
            if let covenant_gate::GateDecision::Deny { reason } =
                gate.authorize(actor, &action, contract)
            {
                return Err(LifecycleError::Authorization { reason });
            }

            if contract.version != request.expected_version {
                return Err(LifecycleError::Conflict {
                    expected: request.expected_version,
                    actual: contract.version,
                });
            }

            let event = AuditEvent::new(
                ledger.next_sequence(contract_id)?,
                contract_id.clone(),
                actor.principal_id.clone(),
                AuditAction::StateChanged,
                from,
                to,
                now,
                AuditPayload::StateChanged {
                    reason: request.reason.clone(),
                },
            );
            ledger.append(event)?;

            let contract = contracts
                .get_mut(contract_id)
                .expect("contract present under write lock");
            contract.state = to;
            contract.version += 1;
            contract.updated_at = now;
            if from == ContractState::Expiring && to == ContractState::Active {
                // Renewal installs the new term and resets the next decision.
                contract.effective_date = request.new_effective_date;
                contract.termination_date = request.new_termination_date;
                contract.renewal = RenewalDecision::undecided();
            }

            tracing::info!(
                contract = %contract_id,
                from = %from,
                to = %to,
                version = contract.version,
                "lifecycle transition applied"
            );
            Ok(contract.clone())
        })?
    }

    /// Correct a Draft in place. Drafts have no back-transition; edits bump
    /// the version and audit the changed field names.
    pub fn update_draft(
        &self,
        contract_id: &ContractId,
        changes: DraftChanges,
        actor: &Principal,
        expected_version: u64,
        now: DateTime<Utc>,
    ) -> LifecycleResult<Contract> {
        if changes.is_empty() {
            return Err(LifecycleError::Validation("no changes supplied".into()));
        }

        let ledger = Arc::clone(&self.ledger);
        let gate = Arc::clone(&self.gate);

        self.store.with_write(|contracts| {
            let contract = contracts
                .get(contract_id)
                .ok_or_else(|| LifecycleError::NotFound(contract_id.clone()))?;

            if contract.state != ContractState::Draft {
                return Err(LifecycleError::InvalidState {
                    from: contract.state,
                    to: ContractState::Draft,
                });
            }

            if let covenant_gate::GateDecision::Deny { reason } =
                gate.authorize(actor, &Action::UpdateDraft, contract)
            {
                return Err(LifecycleError::Authorization { reason });
            }

            if contract.version != expected_version {
                return Err(LifecycleError::Conflict {
                    expected: expected_version,
                    actual: contract.version,
                });
            }

            let event = AuditEvent::new(
                ledger.next_sequence(contract_id)?,
                contract_id.clone(),
                actor.principal_id.clone(),
                AuditAction::DraftUpdated,
                ContractState::Draft,
                ContractState::Draft,
                now,
                AuditPayload::DraftUpdated {
                    changed: changes.changed_fields(),
                },
            );
            ledger.append(event)?;

            let contract = contracts
                .get_mut(contract_id)
                .expect("contract present under write lock");
            if let Some(title) = changes.title {
                contract.title = title;
            }
            if let Some(vendor_id) = changes.vendor_id {
                contract.vendor_id = Some(vendor_id);
            }
            if let Some(effective) = changes.effective_date {
                contract.effective_date = Some(effective);
            }
            if let Some(termination) = changes.termination_date {
                contract.termination_date = Some(termination);
            }
            if let Some(days) = changes.notice_period_days {
                contract.notice_period_days = Some(days);
            }
            if let Some(sensitive) = changes.sensitive {
                contract.sensitive = sensitive;
            }
            if let Some(tags) = changes.tags {
                contract.tags = tags;
            }
            contract.version += 1;
            contract.updated_at = now;

            Ok(contract.clone())
        })?
    }

    /// Record a renewal decision. A field commit: version bump plus event.
    pub fn set_renewal_intent(
        &self,
        contract_id: &ContractId,
        decision: RenewalDecision,
        actor: &Principal,
        expected_version: u64,
        now: DateTime<Utc>,
    ) -> LifecycleResult<Contract> {
        let ledger = Arc::clone(&self.ledger);
        let gate = Arc::clone(&self.gate);

        self.store.with_write(|contracts| {
            let contract = contracts
                .get(contract_id)
                .ok_or_else(|| LifecycleError::NotFound(contract_id.clone()))?;

            if !matches!(
                contract.state,
                ContractState::Active | ContractState::Expiring
            ) {
                return Err(LifecycleError::InvalidState {
                    from: contract.state,
                    to: contract.state,
                });
            }

            if let covenant_gate::GateDecision::Deny { reason } =
                gate.authorize(actor, &Action::SetRenewalIntent, contract)
            {
                return Err(LifecycleError::Authorization { reason });
            }

            if contract.version != expected_version {
                return Err(LifecycleError::Conflict {
                    expected: expected_version,
                    actual: contract.version,
                });
            }

            let event = AuditEvent::new(
                ledger.next_sequence(contract_id)?,
                contract_id.clone(),
                actor.principal_id.clone(),
                AuditAction::RenewalIntentSet,
                contract.state,
                contract.state,
                now,
                AuditPayload::RenewalIntentSet {
                    intent: decision.intent,
                    rationale: decision.rationale.clone(),
                },
            );
            ledger.append(event)?;

            let contract = contracts
                .get_mut(contract_id)
                .expect("contract present under write lock");
            contract.renewal = decision;
            contract.version += 1;
            contract.updated_at = now;

            Ok(contract.clone())
        })?
    }

    pub fn get(&self, contract_id: &ContractId) -> LifecycleResult<Contract> {
        Ok(self.store.get(contract_id)?)
    }

    pub fn list(&self) -> LifecycleResult<Vec<Contract>> {
        Ok(self.store.list()?)
    }

    pub fn statistics(&self) -> LifecycleResult<LifecycleStatistics> {
        let contracts = self.store.list()?;
        let mut by_state: HashMap<String, usize> = HashMap::new();
        for contract in &contracts {
            *by_state.entry(contract.state.to_string()).or_insert(0) += 1;
        }
        Ok(LifecycleStatistics {
            total: contracts.len(),
            by_state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_types::{RenewalIntent, Role};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        date(y, m, d).and_hms_opt(9, 0, 0).unwrap().and_utc()
    }

    struct Fixture {
        engine: LifecycleEngine,
        ledger: Arc<AuditLedger>,
        owner: Principal,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(ContractStore::new());
        let gate = Arc::new(AuthorizationGate::new());
        let ledger = Arc::new(AuditLedger::new());
        Fixture {
            engine: LifecycleEngine::new(store, gate, Arc::clone(&ledger)),
            ledger,
            owner: Principal::new("alice", Role::ContractOwner),
        }
    }

    fn activatable(owner: &PrincipalId) -> NewContract {
        NewContract::new("MSA", owner.clone())
            .with_vendor(VendorId::new("v-1"))
            .with_dates(date(2024, 1, 1), date(2024, 12, 31))
            .with_notice_period(180)
    }

    #[test]
    fn test_create_starts_the_audit_stream() {
        let fx = fixture();
        let contract = fx
            .engine
            .create(activatable(&fx.owner.principal_id), &fx.owner, at(2024, 1, 1))
            .unwrap();

        assert_eq!(contract.state, ContractState::Draft);
        assert_eq!(contract.version, 1);

        let events = fx.ledger.read_all(&contract.contract_id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence, 1);
        assert_eq!(events[0].action, AuditAction::ContractCreated);
    }

    #[test]
    fn test_valid_transition_bumps_version_and_audits_once() {
        let fx = fixture();
        let contract = fx
            .engine
            .create(activatable(&fx.owner.principal_id), &fx.owner, at(2024, 1, 1))
            .unwrap();

        let activated = fx
            .engine
            .transition(
                &contract.contract_id,
                TransitionRequest::manual(ContractState::Active, "signed", contract.version),
                &fx.owner,
                at(2024, 1, 2),
            )
            .unwrap();

        assert_eq!(activated.state, ContractState::Active);
        assert_eq!(activated.version, contract.version + 1);

        let events = fx.ledger.read_all(&contract.contract_id).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].before_state, ContractState::Draft);
        assert_eq!(events[1].after_state, ContractState::Active);
    }

    #[test]
    fn test_invalid_edge_changes_nothing() {
        let fx = fixture();
        let contract = fx
            .engine
            .create(activatable(&fx.owner.principal_id), &fx.owner, at(2024, 1, 1))
            .unwrap();

        let error = fx
            .engine
            .transition(
                &contract.contract_id,
                TransitionRequest::manual(ContractState::Terminated, "skip ahead", 1),
                &fx.owner,
                at(2024, 1, 2),
            )
            .unwrap_err();
        assert!(matches!(error, LifecycleError::InvalidState { .. }));

        let unchanged = fx.engine.get(&contract.contract_id).unwrap();
        assert_eq!(unchanged.state, ContractState::Draft);
        assert_eq!(unchanged.version, 1);
        assert_eq!(fx.ledger.read_all(&contract.contract_id).unwrap().len(), 1);
    }

    #[test]
    fn test_stale_version_conflicts_and_retry_succeeds() {
        let fx = fixture();
        let contract = fx
            .engine
            .create(activatable(&fx.owner.principal_id), &fx.owner, at(2024, 1, 1))
            .unwrap();

        fx.engine
            .transition(
                &contract.contract_id,
                TransitionRequest::manual(ContractState::Active, "signed", 1),
                &fx.owner,
                at(2024, 1, 2),
            )
            .unwrap();

        // A second caller still holding version 1 loses.
        let error = fx
            .engine
            .transition(
                &contract.contract_id,
                TransitionRequest::manual(ContractState::Expiring, "review", 1),
                &fx.owner,
                at(2024, 1, 3),
            )
            .unwrap_err();
        assert!(matches!(
            error,
            LifecycleError::Conflict {
                expected: 1,
                actual: 2
            }
        ));

        // Refetch and retry against the current version.
        let refreshed = fx.engine.get(&contract.contract_id).unwrap();
        fx.engine
            .transition(
                &contract.contract_id,
                TransitionRequest::manual(ContractState::Expiring, "review", refreshed.version),
                &fx.owner,
                at(2024, 1, 3),
            )
            .unwrap();
    }

    #[test]
    fn test_reviewer_transition_is_denied_without_a_trace() {
        let fx = fixture();
        let contract = fx
            .engine
            .create(activatable(&fx.owner.principal_id), &fx.owner, at(2024, 1, 1))
            .unwrap();

        let reviewer = Principal::new("rev", Role::Reviewer);
        let error = fx
            .engine
            .transition(
                &contract.contract_id,
                TransitionRequest::manual(ContractState::Active, "reviewing", 1),
                &reviewer,
                at(2024, 1, 2),
            )
            .unwrap_err();
        assert!(matches!(error, LifecycleError::Authorization { .. }));

        // No state change and no audit event for the denial.
        assert_eq!(
            fx.engine.get(&contract.contract_id).unwrap().state,
            ContractState::Draft
        );
        assert_eq!(fx.ledger.read_all(&contract.contract_id).unwrap().len(), 1);
    }

    #[test]
    fn test_renewal_installs_new_term() {
        let fx = fixture();
        let contract = fx
            .engine
            .create(activatable(&fx.owner.principal_id), &fx.owner, at(2024, 1, 1))
            .unwrap();
        fx.engine
            .transition(
                &contract.contract_id,
                TransitionRequest::manual(ContractState::Active, "signed", 1),
                &fx.owner,
                at(2024, 1, 2),
            )
            .unwrap();
        fx.engine
            .transition(
                &contract.contract_id,
                TransitionRequest::manual(ContractState::Expiring, "review window", 2),
                &fx.owner,
                at(2024, 7, 4),
            )
            .unwrap();
        fx.engine
            .set_renewal_intent(
                &contract.contract_id,
                RenewalDecision::new(RenewalIntent::Renew, "vendor performing well"),
                &fx.owner,
                3,
                at(2024, 8, 1),
            )
            .unwrap();

        let renewed = fx
            .engine
            .transition(
                &contract.contract_id,
                TransitionRequest::manual(ContractState::Active, "renewed", 4)
                    .with_renewal_dates(date(2025, 1, 1), date(2025, 12, 31)),
                &fx.owner,
                at(2024, 8, 2),
            )
            .unwrap();

        assert_eq!(renewed.state, ContractState::Active);
        assert_eq!(renewed.effective_date, Some(date(2025, 1, 1)));
        assert_eq!(renewed.termination_date, Some(date(2025, 12, 31)));
        assert_eq!(renewed.renewal.intent, RenewalIntent::Undecided);
    }

    #[test]
    fn test_archived_contract_is_read_only() {
        let fx = fixture();
        let it_admin = Principal::new("root", Role::ItAdmin);
        let contract = fx
            .engine
            .create(activatable(&fx.owner.principal_id), &fx.owner, at(2024, 1, 1))
            .unwrap();

        for (target, version) in [
            (ContractState::Active, 1),
            (ContractState::Expiring, 2),
            (ContractState::Terminated, 3),
        ] {
            let mut request = TransitionRequest::manual(target, "step", version);
            if target == ContractState::Terminated {
                fx.engine
                    .set_renewal_intent(
                        &contract.contract_id,
                        RenewalDecision::new(RenewalIntent::Terminate, "done"),
                        &fx.owner,
                        version,
                        at(2024, 9, 1),
                    )
                    .unwrap();
                request.expected_version = version + 1;
            }
            fx.engine
                .transition(&contract.contract_id, request, &fx.owner, at(2024, 9, 2))
                .unwrap();
        }

        let terminated = fx.engine.get(&contract.contract_id).unwrap();
        fx.engine
            .transition(
                &contract.contract_id,
                TransitionRequest::manual(ContractState::Archived, "retention over", terminated.version)
                    .with_retention_hold_expired(),
                &it_admin,
                at(2025, 9, 2),
            )
            .unwrap();

        let error = fx
            .engine
            .update_draft(
                &contract.contract_id,
                DraftChanges {
                    title: Some("rename".into()),
                    ..DraftChanges::default()
                },
                &it_admin,
                6,
                at(2025, 9, 3),
            )
            .unwrap_err();
        assert!(matches!(error, LifecycleError::InvalidState { .. }));

        let error = fx
            .engine
            .transition(
                &contract.contract_id,
                TransitionRequest::manual(ContractState::Active, "undo", 6),
                &it_admin,
                at(2025, 9, 3),
            )
            .unwrap_err();
        assert!(matches!(error, LifecycleError::ReadOnly(_)));
    }

    #[test]
    fn test_draft_update_is_audited_and_versioned() {
        let fx = fixture();
        let contract = fx
            .engine
            .create(activatable(&fx.owner.principal_id), &fx.owner, at(2024, 1, 1))
            .unwrap();

        let updated = fx
            .engine
            .update_draft(
                &contract.contract_id,
                DraftChanges {
                    title: Some("MSA v2".into()),
                    tags: Some(vec!["procurement".into()]),
                    ..DraftChanges::default()
                },
                &fx.owner,
                1,
                at(2024, 1, 5),
            )
            .unwrap();

        assert_eq!(updated.title, "MSA v2");
        assert_eq!(updated.version, 2);

        let events = fx.ledger.read_all(&contract.contract_id).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1].payload,
            AuditPayload::DraftUpdated { changed } if changed.contains(&"title".to_string())
        ));
    }

    #[test]
    fn test_statistics_counts_by_state() {
        let fx = fixture();
        for _ in 0..3 {
            fx.engine
                .create(activatable(&fx.owner.principal_id), &fx.owner, at(2024, 1, 1))
                .unwrap();
        }
        let one = fx
            .engine
            .create(activatable(&fx.owner.principal_id), &fx.owner, at(2024, 1, 1))
            .unwrap();
        fx.engine
            .transition(
                &one.contract_id,
                TransitionRequest::manual(ContractState::Active, "signed", 1),
                &fx.owner,
                at(2024, 1, 2),
            )
            .unwrap();

        let stats = fx.engine.statistics().unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.by_state.get("draft"), Some(&3));
        assert_eq!(stats.by_state.get("active"), Some(&1));
    }
}
