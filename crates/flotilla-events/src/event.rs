//! Typed, state-tracked action events.
//!
//! Every reconciliation step is recorded as an `Event`: a tagged,
//! timestamped record with a payload bag, an append-only trace log, and a
//! lifecycle state. Once an event reaches a terminal state (`Success`,
//! `Failed`, `Aborted`) it is a closed log of a finished action — every
//! further mutation attempt fails and leaves the event untouched.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique event identifier (`evt-N`).
pub type EventId = String;

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// The kind of action an event records.
///
/// Kinds form an explicit two-level hierarchy rooted at `Action`; the
/// ledger dispatches an event to listeners of its kind and of every
/// ancestor kind. `ScaleUp` and `ScaleDown` sit under the `Scale`
/// category, everything else directly under the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Root catch-all tag. Listeners here see every event.
    Action,
    /// One whole reconciliation pass over a deployment.
    Reconcile,
    /// A single instance placement on one host.
    Deploy,
    /// A single instance removal on one host.
    Undeploy,
    /// Category tag for scale adjustments.
    Scale,
    ScaleUp,
    ScaleDown,
    /// A host appearing in, or vanishing from, the fleet.
    HostLifecycle,
}

impl EventKind {
    pub fn is_root(self) -> bool {
        self == EventKind::Action
    }

    /// The immediate supertype tag, `None` for the root.
    pub fn parent(self) -> Option<EventKind> {
        match self {
            EventKind::Action => None,
            EventKind::ScaleUp | EventKind::ScaleDown => Some(EventKind::Scale),
            _ => Some(EventKind::Action),
        }
    }

    /// This kind followed by its ancestors, ending at the root.
    pub fn lineage(self) -> Vec<EventKind> {
        let mut chain = vec![self];
        let mut current = self;
        while let Some(parent) = current.parent() {
            chain.push(parent);
            current = parent;
        }
        chain
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Lifecycle state of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    New,
    InProgress,
    Success,
    Failed,
    Aborted,
}

impl EventState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EventState::Success | EventState::Failed | EventState::Aborted
        )
    }
}

/// Contract violations on the event lifecycle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    /// Mutation attempted on an event in a terminal state.
    #[error("event {id} is terminal ({state:?}) and cannot be mutated")]
    Terminal { id: EventId, state: EventState },
}

pub type EventResult<T> = Result<T, EventError>;

/// A single recorded action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    /// Unix timestamp (seconds) of creation.
    created_at: u64,
    kind: EventKind,
    severity: Severity,
    description: String,
    payload: BTreeMap<String, String>,
    /// Append-only, human-readable progress log.
    trace: Vec<String>,
    state: EventState,
    parent: Option<EventId>,
}

impl Event {
    /// A fresh event in state `New` with severity `Info`.
    pub fn new(kind: EventKind, description: &str) -> Self {
        let id = format!("evt-{}", NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            id,
            created_at: epoch_secs(),
            kind,
            severity: Severity::Info,
            description: description.to_string(),
            payload: BTreeMap::new(),
            trace: Vec::new(),
            state: EventState::New,
            parent: None,
        }
    }

    /// Attach this event under a parent event.
    pub fn with_parent(mut self, parent: &EventId) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn id(&self) -> &EventId {
        &self.id
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn payload(&self) -> &BTreeMap<String, String> {
        &self.payload
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    pub fn state(&self) -> EventState {
        self.state
    }

    pub fn parent(&self) -> Option<&EventId> {
        self.parent.as_ref()
    }

    // ── Mutators (rejected once terminal) ─────────────────────────

    fn guard(&self) -> EventResult<()> {
        if self.state.is_terminal() {
            return Err(EventError::Terminal {
                id: self.id.clone(),
                state: self.state,
            });
        }
        Ok(())
    }

    /// Mark the action as started.
    pub fn begin(&mut self) -> EventResult<()> {
        self.guard()?;
        self.state = EventState::InProgress;
        Ok(())
    }

    pub fn succeed(&mut self) -> EventResult<()> {
        self.guard()?;
        self.state = EventState::Success;
        Ok(())
    }

    pub fn fail(&mut self) -> EventResult<()> {
        self.guard()?;
        self.state = EventState::Failed;
        if self.severity < Severity::Error {
            self.severity = Severity::Error;
        }
        Ok(())
    }

    pub fn abort(&mut self) -> EventResult<()> {
        self.guard()?;
        self.state = EventState::Aborted;
        Ok(())
    }

    /// Append a trace message.
    pub fn record(&mut self, message: &str) -> EventResult<()> {
        self.guard()?;
        self.trace.push(message.to_string());
        Ok(())
    }

    /// Set a payload entry.
    pub fn annotate(&mut self, key: &str, value: &str) -> EventResult<()> {
        self.guard()?;
        self.payload.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn set_severity(&mut self, severity: Severity) -> EventResult<()> {
        self.guard()?;
        self.severity = severity;
        Ok(())
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = Event::new(EventKind::Deploy, "one");
        let b = Event::new(EventKind::Deploy, "two");
        assert_ne!(a.id(), b.id());
        assert!(a.id().starts_with("evt-"));
    }

    #[test]
    fn lifecycle_happy_path() {
        let mut event = Event::new(EventKind::ScaleUp, "scale app:1 to 3");
        assert_eq!(event.state(), EventState::New);

        event.begin().unwrap();
        assert_eq!(event.state(), EventState::InProgress);

        event.record("deploying to host a").unwrap();
        event.annotate("image", "app:1").unwrap();
        event.succeed().unwrap();
        assert_eq!(event.state(), EventState::Success);
        assert_eq!(event.trace(), ["deploying to host a"]);
    }

    #[test]
    fn terminal_events_reject_all_mutation() {
        for terminal in [Event::succeed as fn(&mut Event) -> EventResult<()>, Event::fail, Event::abort] {
            let mut event = Event::new(EventKind::Deploy, "x");
            terminal(&mut event).unwrap();
            let snapshot = event.clone();

            assert!(matches!(event.begin(), Err(EventError::Terminal { .. })));
            assert!(matches!(event.record("late"), Err(EventError::Terminal { .. })));
            assert!(matches!(event.annotate("k", "v"), Err(EventError::Terminal { .. })));
            assert!(matches!(event.succeed(), Err(EventError::Terminal { .. })));
            assert!(matches!(event.set_severity(Severity::Warning), Err(EventError::Terminal { .. })));

            // Failed mutations leave the event unchanged.
            assert_eq!(event, snapshot);
        }
    }

    #[test]
    fn fail_raises_severity_to_error() {
        let mut event = Event::new(EventKind::Deploy, "x");
        event.fail().unwrap();
        assert_eq!(event.severity(), Severity::Error);
    }

    #[test]
    fn lineage_walks_to_root() {
        assert_eq!(
            EventKind::ScaleUp.lineage(),
            vec![EventKind::ScaleUp, EventKind::Scale, EventKind::Action]
        );
        assert_eq!(
            EventKind::Deploy.lineage(),
            vec![EventKind::Deploy, EventKind::Action]
        );
        assert_eq!(EventKind::Action.lineage(), vec![EventKind::Action]);
        assert!(EventKind::Action.is_root());
        assert!(!EventKind::Scale.is_root());
    }

    #[test]
    fn parent_reference_is_kept() {
        let root = Event::new(EventKind::Reconcile, "pass");
        let child = Event::new(EventKind::Deploy, "to a").with_parent(root.id());
        assert_eq!(child.parent(), Some(root.id()));
    }
}
