//! The action ledger — synchronous hierarchical publish/subscribe.
//!
//! Listeners subscribe on an `EventKind` tag; publishing an event
//! delivers it to the listeners of its exact kind and of every ancestor
//! kind up to the root (`Action`), in registration order per tag.
//! Delivery happens inline on the publisher's thread. A listener that
//! returns an error or panics is logged and skipped — it never stops
//! delivery to the remaining listeners.
//!
//! Published events are retained in an append-only history so a finished
//! reconciliation can be audited after the fact.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

use crate::event::{Event, EventId, EventKind};

/// An observer of ledger events.
///
/// Implementations must not block for long; delivery is synchronous on
/// the publisher's thread.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &Event) -> anyhow::Result<()>;
}

#[derive(Default)]
struct LedgerState {
    /// Registration order is preserved per tag.
    subscribers: HashMap<EventKind, Vec<Arc<dyn EventListener>>>,
    history: Vec<Event>,
}

/// Shared handle to the ledger.
#[derive(Clone, Default)]
pub struct Ledger {
    inner: Arc<RwLock<LedgerState>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `kind` (and, transitively, nothing else —
    /// subscribe on `EventKind::Action` to observe every event).
    pub fn subscribe(&self, kind: EventKind, listener: Arc<dyn EventListener>) {
        let mut state = self.write();
        state.subscribers.entry(kind).or_default().push(listener);
    }

    /// Remove a previously registered listener from `kind`.
    ///
    /// Identity is `Arc` pointer equality; returns whether a registration
    /// was removed.
    pub fn unsubscribe(&self, kind: EventKind, listener: &Arc<dyn EventListener>) -> bool {
        let mut state = self.write();
        match state.subscribers.get_mut(&kind) {
            Some(listeners) => {
                let before = listeners.len();
                listeners.retain(|registered| !Arc::ptr_eq(registered, listener));
                listeners.len() != before
            }
            None => false,
        }
    }

    /// Record `event` and dispatch it to all interested listeners.
    pub fn publish(&self, event: &Event) {
        let recipients: Vec<Arc<dyn EventListener>> = {
            let mut state = self.write();
            state.history.push(event.clone());
            event
                .kind()
                .lineage()
                .into_iter()
                .flat_map(|kind| {
                    state
                        .subscribers
                        .get(&kind)
                        .into_iter()
                        .flatten()
                        .cloned()
                        .collect::<Vec<_>>()
                })
                .collect()
        };

        for listener in recipients {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    warn!(event = %event.id(), %error, "event listener failed");
                }
                Err(_) => {
                    warn!(event = %event.id(), "event listener panicked");
                }
            }
        }
    }

    /// All published events, in publication order.
    pub fn history(&self) -> Vec<Event> {
        self.read().history.clone()
    }

    /// Published events parented under `parent`, in publication order.
    pub fn children_of(&self, parent: &EventId) -> Vec<Event> {
        self.read()
            .history
            .iter()
            .filter(|event| event.parent() == Some(parent))
            .cloned()
            .collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, LedgerState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, LedgerState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
