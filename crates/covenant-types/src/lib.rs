//! Covenant domain types - contracts as lifecycle-gated, provenance-tracked records
//!
//! Every other crate in the workspace builds on these types. They carry no
//! behavior beyond constructors and small predicates; the lifecycle rules,
//! authorization policy, and ledger discipline live in their own crates.

#![deny(unsafe_code)]

mod audit;
mod contract;
mod notification;
mod principal;
mod provenance;

pub use audit::*;
pub use contract::*;
pub use notification::*;
pub use principal::*;
pub use provenance::*;
