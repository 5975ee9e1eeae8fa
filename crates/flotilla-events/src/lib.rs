//! flotilla-events — the append-only action ledger.
//!
//! Reconciliation progress is recorded as typed events with a tracked
//! lifecycle state, composed into trees via parent references, and
//! dispatched in-process to subscribed observers:
//!
//! - **`event`** — `Event`, `EventKind` hierarchy, terminal-state contract
//! - **`ledger`** — `Ledger` publish/subscribe with hierarchical dispatch
//!
//! The ledger owns no wire format; forwarding events to logging or
//! metrics collaborators is the listeners' business.

pub mod event;
pub mod ledger;

pub use event::{Event, EventError, EventId, EventKind, EventResult, EventState, Severity};
pub use ledger::{EventListener, Ledger};
