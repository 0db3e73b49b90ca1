//! Covenant Authorization Gate - allow/deny for (principal, action, contract)
//!
//! The decision function is pure and stateless per call: every mutating entry
//! point re-invokes it against the current contract, never a cached decision.
//! Denials are counted and traced as an observability signal; they are never
//! written to the audit ledger, which records accepted actions only.

#![deny(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};

use covenant_types::{Action, Capability, Contract, ContractState, Principal, Role};
use serde::{Deserialize, Serialize};

/// The gate's answer for one call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateDecision {
    Allow,
    Deny { reason: String },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow)
    }

    fn deny(reason: impl Into<String>) -> Self {
        GateDecision::Deny {
            reason: reason.into(),
        }
    }
}

/// Wraps the pure policy with a denied-attempt counter.
pub struct AuthorizationGate {
    denied_attempts: AtomicU64,
}

impl AuthorizationGate {
    pub fn new() -> Self {
        Self {
            denied_attempts: AtomicU64::new(0),
        }
    }

    /// Decide one (principal, action, contract) triple.
    pub fn authorize(
        &self,
        principal: &Principal,
        action: &Action,
        contract: &Contract,
    ) -> GateDecision {
        let decision = evaluate(principal, action, contract);
        if let GateDecision::Deny { reason } = &decision {
            self.denied_attempts.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                principal = %principal.principal_id,
                role = ?principal.role,
                action = %action,
                contract = %contract.contract_id,
                reason = %reason,
                "authorization denied"
            );
        }
        decision
    }

    /// Contract creation has no target contract yet; it is role-gated only.
    pub fn authorize_create(&self, principal: &Principal) -> GateDecision {
        let decision = match principal.role {
            Role::ItAdmin | Role::BusinessAdmin | Role::ContractOwner => GateDecision::Allow,
            Role::Reviewer => GateDecision::deny("reviewers cannot create contracts"),
            Role::System => GateDecision::deny("system principal cannot create contracts"),
        };
        if let GateDecision::Deny { reason } = &decision {
            self.denied_attempts.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                principal = %principal.principal_id,
                role = ?principal.role,
                reason = %reason,
                "contract creation denied"
            );
        }
        decision
    }

    /// Denied-attempt count since construction, for the observability channel.
    pub fn denied_attempts(&self) -> u64 {
        self.denied_attempts.load(Ordering::Relaxed)
    }
}

impl Default for AuthorizationGate {
    fn default() -> Self {
        Self::new()
    }
}

/// The pure policy decision, no counters or logging.
pub fn evaluate(principal: &Principal, action: &Action, contract: &Contract) -> GateDecision {
    match principal.role {
        // IT Admin: all actions.
        Role::ItAdmin => GateDecision::Allow,

        // The clock/scheduled-job actor fires clock-guarded transitions only.
        Role::System => match action {
            Action::Transition { from, to } if is_clock_edge(*from, *to) => GateDecision::Allow,
            Action::ReadContract | Action::QueryAudit => GateDecision::Allow,
            _ => GateDecision::deny("system principal is limited to clock-driven transitions"),
        },

        // Reviewer: approve/reject extraction only, never lifecycle actions.
        Role::Reviewer => match action {
            Action::ApproveExtraction | Action::RejectExtraction => GateDecision::Allow,
            _ => GateDecision::deny("reviewers may only approve or reject extractions"),
        },

        // Business Admin: all CRUD and reporting, but extraction approval is
        // limited to owned or explicitly shared contracts.
        Role::BusinessAdmin => match action {
            Action::ApproveExtraction | Action::RejectExtraction => {
                if contract.is_owned_by(&principal.principal_id)
                    || principal.has_grant(&contract.contract_id, Capability::ApproveExtraction)
                {
                    GateDecision::Allow
                } else {
                    GateDecision::deny(
                        "business admins cannot approve extractions on contracts they do not own",
                    )
                }
            }
            Action::Transition { from, to } => evaluate_owner_edge(principal, contract, *from, *to),
            _ => GateDecision::Allow,
        },

        // Contract Owner: full control of owned contracts, read-only
        // elsewhere unless a grant says otherwise.
        Role::ContractOwner => {
            if contract.is_owned_by(&principal.principal_id) {
                match action {
                    Action::Transition { from, to } => {
                        evaluate_owner_edge(principal, contract, *from, *to)
                    }
                    _ => GateDecision::Allow,
                }
            } else {
                match action {
                    Action::ReadContract | Action::QueryAudit => GateDecision::Allow,
                    // A Transition grant stands in for ownership but still
                    // goes through the per-edge matrix.
                    Action::Transition { from, to } => {
                        if principal.has_grant(&contract.contract_id, Capability::Transition) {
                            evaluate_owner_edge(principal, contract, *from, *to)
                        } else {
                            GateDecision::deny("no grant for this contract; read-only access")
                        }
                    }
                    _ => {
                        if principal
                            .has_grant(&contract.contract_id, required_capability(action))
                        {
                            GateDecision::Allow
                        } else {
                            GateDecision::deny("no grant for this contract; read-only access")
                        }
                    }
                }
            }
        }
    }
}

/// Per-edge role matrix, applied to owners, business admins, and grant
/// holders.
fn evaluate_owner_edge(
    principal: &Principal,
    contract: &Contract,
    from: ContractState,
    to: ContractState,
) -> GateDecision {
    let owns = contract.is_owned_by(&principal.principal_id)
        || principal.has_grant(&contract.contract_id, Capability::Transition);

    match (from, to) {
        // Draft -> Active: owner or business admin.
        (ContractState::Draft, ContractState::Active) => {
            if owns || principal.role == Role::BusinessAdmin {
                GateDecision::Allow
            } else {
                GateDecision::deny("activation requires the owner or a business admin")
            }
        }
        // Active -> Expiring: manual trigger is owner-only.
        (ContractState::Active, ContractState::Expiring) => {
            if owns {
                GateDecision::Allow
            } else {
                GateDecision::deny("manual expiring trigger requires the owner")
            }
        }
        // Expiring -> Terminated: owner or business admin.
        (ContractState::Expiring, ContractState::Terminated) => {
            if owns || principal.role == Role::BusinessAdmin {
                GateDecision::Allow
            } else {
                GateDecision::deny("termination requires the owner or a business admin")
            }
        }
        // Expiring -> Active (renewal): owner only.
        (ContractState::Expiring, ContractState::Active) => {
            if owns {
                GateDecision::Allow
            } else {
                GateDecision::deny("renewal requires the owner")
            }
        }
        // Terminated -> Archived: IT admin or the scheduled job, not owners.
        (ContractState::Terminated, ContractState::Archived) => {
            GateDecision::deny("archival requires an IT admin or the scheduled job")
        }
        _ => GateDecision::deny("transition not permitted for this principal"),
    }
}

/// Edges the clock/scheduled-job actor may fire on its own.
fn is_clock_edge(from: ContractState, to: ContractState) -> bool {
    matches!(
        (from, to),
        (ContractState::Active, ContractState::Expiring)
            | (ContractState::Expiring, ContractState::Terminated)
            | (ContractState::Terminated, ContractState::Archived)
    )
}

/// Which grant capability unlocks an action for a non-owner.
fn required_capability(action: &Action) -> Capability {
    match action {
        Action::ReadContract | Action::QueryAudit => Capability::Read,
        Action::UpdateDraft | Action::SetRenewalIntent => Capability::EditFields,
        Action::Transition { .. } => Capability::Transition,
        Action::SubmitExtraction | Action::CancelExtraction => Capability::SubmitExtraction,
        Action::ApproveExtraction | Action::RejectExtraction => Capability::ApproveExtraction,
    }
}
