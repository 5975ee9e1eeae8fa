//! Host eligibility filtering.
//!
//! An elector answers one question: which registered hosts are
//! structurally capable of running a request? Eligibility is independent
//! of current load, and an empty answer is a normal outcome ("cannot
//! place now"), never an error.
//!
//! Electors must be monotonic in the host set: removing a host from the
//! input can only shrink the result, never grow it. Per-host predicates
//! satisfy this by construction.

use tracing::debug;

use flotilla_fleet::{ContainerRequest, Host, HostStatus};

/// Filters a host set down to the hosts able to run a request.
pub trait Elector: Send + Sync {
    fn select_eligible(&self, request: &ContainerRequest, hosts: &[Host]) -> Vec<Host>;
}

/// Whether a single host can structurally satisfy a request.
///
/// A host qualifies iff it is `Running`, carries every required label,
/// and (when the request declares a resource footprint) its declared
/// capacity covers it.
pub fn is_eligible(host: &Host, request: &ContainerRequest) -> bool {
    if host.status != HostStatus::Running {
        return false;
    }
    if !request.required_labels().is_subset(&host.labels) {
        return false;
    }
    if let Some(hint) = request.resources()
        && !host.capacity.can_fit(hint)
    {
        return false;
    }
    true
}

/// The standard elector: status, labels, and capacity hints.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultElector;

impl Elector for DefaultElector {
    fn select_eligible(&self, request: &ContainerRequest, hosts: &[Host]) -> Vec<Host> {
        let eligible: Vec<Host> = hosts
            .iter()
            .filter(|host| is_eligible(host, request))
            .cloned()
            .collect();
        debug!(
            image = %request.image(),
            candidates = hosts.len(),
            eligible = eligible.len(),
            "eligibility filter applied"
        );
        eligible
    }
}

/// Adds swarm affinity on top of another elector.
///
/// When the request carries a swarm id, hosts must also carry the
/// `swarm:<id>` label. Requests without a swarm id pass through to the
/// inner elector unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwarmElector<E = DefaultElector> {
    inner: E,
}

impl<E: Elector> SwarmElector<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }
}

impl<E: Elector> Elector for SwarmElector<E> {
    fn select_eligible(&self, request: &ContainerRequest, hosts: &[Host]) -> Vec<Host> {
        let mut eligible = self.inner.select_eligible(request, hosts);
        if let Some(swarm) = request.swarm() {
            let tag = format!("swarm:{swarm}");
            eligible.retain(|host| host.labels.contains(&tag));
        }
        eligible
    }
}
