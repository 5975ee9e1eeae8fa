//! Target selection across eligible hosts.
//!
//! Given the eligible host set for a request, a selector decides which
//! hosts actually receive new instances. Selection must be deterministic
//! for a given (eligible set, cursor state, desired count) so that
//! reconciliation runs are reproducible.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use flotilla_fleet::{ContainerRequest, Host};

/// Picks up to `desired` target hosts from the eligible set.
pub trait Selector: Send + Sync {
    /// Returns an ordered list of targets, length ≤ `desired`.
    ///
    /// When fewer hosts are eligible than desired, all of them are
    /// returned — partial placement is expected and reported by the
    /// caller, not an error.
    fn select_targets(
        &self,
        eligible: &[Host],
        request: &ContainerRequest,
        desired: u32,
    ) -> Vec<Host>;
}

/// Round-robin selection with a rotating cursor.
///
/// Eligible hosts are ordered by name (lexicographic) so ties are stable,
/// then handed out starting at the cursor position. The cursor advances
/// by the number of hosts selected, spreading successive placements
/// across the fleet.
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    cursor: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cursor value (for diagnostics and reproducibility tests).
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Pin the cursor to a known position.
    pub fn set_cursor(&self, position: usize) {
        self.cursor.store(position, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.set_cursor(0);
    }
}

impl Selector for RoundRobinSelector {
    fn select_targets(
        &self,
        eligible: &[Host],
        request: &ContainerRequest,
        desired: u32,
    ) -> Vec<Host> {
        if eligible.is_empty() || desired == 0 {
            return Vec::new();
        }

        let mut ordered: Vec<&Host> = eligible.iter().collect();
        ordered.sort_by(|a, b| a.name.cmp(&b.name));

        let take = (desired as usize).min(ordered.len());
        let start = self.cursor.fetch_add(take, Ordering::Relaxed);

        let targets: Vec<Host> = (0..take)
            .map(|offset| ordered[(start + offset) % ordered.len()].clone())
            .collect();

        debug!(
            image = %request.image(),
            desired,
            selected = targets.len(),
            cursor = start,
            "targets selected"
        );
        targets
    }
}
