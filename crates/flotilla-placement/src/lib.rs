//! flotilla-placement — which hosts can, and which hosts should, run a request.
//!
//! Two pluggable seams, both pure decision logic over in-memory host sets:
//!
//! - **`elector`** — structural eligibility (status, labels, capacity)
//! - **`selector`** — picking targets among the eligible (round-robin)
//!
//! Neither touches the registry or the backend; the reconciliation engine
//! feeds them host snapshots and acts on their answers.

pub mod elector;
pub mod selector;

pub use elector::{DefaultElector, Elector, SwarmElector, is_eligible};
pub use selector::{RoundRobinSelector, Selector};
