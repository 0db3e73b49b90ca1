//! Principals, roles, and per-contract capability grants
//!
//! Identity is an external collaborator: every call into the engine carries
//! an already-authenticated principal with a role claim and its grant list.
//! The fixed role set is not extensible at runtime.

use serde::{Deserialize, Serialize};

use crate::ContractId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalId(pub String);
impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}
impl std::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed role set.
///
/// `System` is the internal actor for clock-driven transitions and scheduled
/// jobs; the identity collaborator never issues it to a caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    ItAdmin,
    BusinessAdmin,
    ContractOwner,
    Reviewer,
    System,
}

/// A named permission a role or explicit grant confers on one contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    Read,
    EditFields,
    Transition,
    SubmitExtraction,
    ApproveExtraction,
}

/// An explicit share: one capability on one contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub contract_id: ContractId,
    pub capability: Capability,
}

impl Grant {
    pub fn new(contract_id: ContractId, capability: Capability) -> Self {
        Self {
            contract_id,
            capability,
        }
    }
}

/// An authenticated caller: identity, role claim, and explicit grants.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub role: Role,
    pub grants: Vec<Grant>,
}

impl Principal {
    pub fn new(principal_id: impl Into<String>, role: Role) -> Self {
        Self {
            principal_id: PrincipalId::new(principal_id),
            role,
            grants: Vec::new(),
        }
    }

    /// The internal clock/scheduled-job actor.
    pub fn system() -> Self {
        Self::new("system", Role::System)
    }

    pub fn with_grant(mut self, grant: Grant) -> Self {
        self.grants.push(grant);
        self
    }

    pub fn is_system(&self) -> bool {
        matches!(self.role, Role::System)
    }

    pub fn has_grant(&self, contract_id: &ContractId, capability: Capability) -> bool {
        self.grants
            .iter()
            .any(|g| g.contract_id == *contract_id && g.capability == capability)
    }
}

/// The operations the authorization gate decides on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    ReadContract,
    UpdateDraft,
    SetRenewalIntent,
    Transition {
        from: crate::ContractState,
        to: crate::ContractState,
    },
    SubmitExtraction,
    ApproveExtraction,
    RejectExtraction,
    CancelExtraction,
    QueryAudit,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::ReadContract => write!(f, "read_contract"),
            Action::UpdateDraft => write!(f, "update_draft"),
            Action::SetRenewalIntent => write!(f, "set_renewal_intent"),
            Action::Transition { from, to } => write!(f, "transition:{from}->{to}"),
            Action::SubmitExtraction => write!(f, "submit_extraction"),
            Action::ApproveExtraction => write!(f, "approve_extraction"),
            Action::RejectExtraction => write!(f, "reject_extraction"),
            Action::CancelExtraction => write!(f, "cancel_extraction"),
            Action::QueryAudit => write!(f, "query_audit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_lookup() {
        let contract_id = ContractId::new("c-1");
        let other = ContractId::new("c-2");
        let principal = Principal::new("bob", Role::ContractOwner)
            .with_grant(Grant::new(contract_id.clone(), Capability::ApproveExtraction));

        assert!(principal.has_grant(&contract_id, Capability::ApproveExtraction));
        assert!(!principal.has_grant(&contract_id, Capability::Transition));
        assert!(!principal.has_grant(&other, Capability::ApproveExtraction));
    }

    #[test]
    fn test_system_principal() {
        let system = Principal::system();
        assert!(system.is_system());
        assert_eq!(system.principal_id, PrincipalId::new("system"));
    }
}
