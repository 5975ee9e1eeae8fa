//! flotilla-engine — the reconciliation control loop.
//!
//! Computes the gap between desired replica counts and the instances
//! actually running, and closes it through host-scoped deploy/remove
//! operations. Every step is recorded in the action ledger.
//!
//! # Architecture
//!
//! ```text
//! Reconciler
//!   ├── FleetRegistry (read hosts + instances; written via Executor)
//!   ├── Elector / Selector (which hosts can / should receive work)
//!   ├── Executor
//!   │     └── HostBackend (create/remove containers, bounded by timeout)
//!   └── Ledger (root event ← per-request event ← per-host attempt)
//! ```
//!
//! Failures talking to one host never abort work on its siblings; the
//! caller re-invokes `ensure_scale` to retry whatever is still missing.

pub mod backend;
pub mod error;
pub mod executor;
pub mod reconciler;
pub mod refresh;

pub use backend::{BackendError, BackendResult, HostBackend, InMemoryBackend};
pub use error::{DeployError, EngineError, EngineResult, HostOpError, RemoveError};
pub use executor::{DEFAULT_OP_TIMEOUT, Executor};
pub use reconciler::{ReconcileReport, Reconciler, RequestOutcome};
pub use refresh::{RefreshSummary, sync_fleet};
