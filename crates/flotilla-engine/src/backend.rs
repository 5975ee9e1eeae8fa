//! Host-management backend capability.
//!
//! The engine drives hosts and containers exclusively through the
//! [`HostBackend`] trait: every call returns a typed result, and the
//! engine never sees the collaborator's wire format. Production
//! implementations wrap whatever actually manages the machines; the
//! bundled [`InMemoryBackend`] simulates a fleet for tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use flotilla_fleet::{ContainerInstance, ContainerRequest, Host, HostName, InstanceId};

/// Failures reported by the host-management collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("host {host} is unreachable: {reason}")]
    Unreachable { host: HostName, reason: String },

    #[error("operation on host {host} failed: {reason}")]
    Failed { host: HostName, reason: String },

    #[error("unknown host: {0}")]
    UnknownHost(HostName),

    #[error("unknown instance: {0}")]
    UnknownInstance(InstanceId),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Capability to manage hosts and the containers running on them.
///
/// All methods are host-scoped: a failure concerns one host and is
/// recovered locally by the caller, never escalated to sibling hosts.
pub trait HostBackend: Send + Sync + 'static {
    /// Provision a new host. Returns the host as the backend sees it.
    fn create_host(&self, host: &Host) -> impl Future<Output = BackendResult<Host>> + Send;

    fn start_host(&self, name: &str) -> impl Future<Output = BackendResult<()>> + Send;

    fn stop_host(&self, name: &str) -> impl Future<Output = BackendResult<()>> + Send;

    fn remove_host(&self, name: &str) -> impl Future<Output = BackendResult<()>> + Send;

    /// Current host inventory, used by the fleet refresh path.
    fn list_hosts(&self) -> impl Future<Output = BackendResult<Vec<Host>>> + Send;

    /// Create one container for `request` on the named host.
    fn create_container(
        &self,
        host: &str,
        request: &ContainerRequest,
    ) -> impl Future<Output = BackendResult<ContainerInstance>> + Send;

    fn remove_container(
        &self,
        instance: &ContainerInstance,
    ) -> impl Future<Output = BackendResult<()>> + Send;

    /// Containers currently running on the named host.
    fn list_containers(
        &self,
        host: &str,
    ) -> impl Future<Output = BackendResult<Vec<ContainerInstance>>> + Send;
}

// ── In-memory simulation ──────────────────────────────────────────

#[derive(Debug)]
struct SimHost {
    host: Host,
    containers: Vec<ContainerInstance>,
    /// When set, container operations on this host fail.
    failing: bool,
    /// Artificial latency applied to container operations.
    delay: Option<Duration>,
}

impl SimHost {
    fn new(host: Host) -> Self {
        Self {
            host,
            containers: Vec::new(),
            failing: false,
            delay: None,
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    hosts: HashMap<HostName, SimHost>,
}

/// Simulated host-management backend.
///
/// Holds the whole "fleet" in memory with generated `ctr-N` instance
/// ids. Supports per-host failure injection and artificial latency, and
/// counts container operations so tests can assert that an
/// already-converged reconciliation performs no work.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Mutex<SimState>,
    next_id: AtomicU64,
    deploy_attempts: AtomicU64,
    remove_attempts: AtomicU64,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a host without going through `create_host`.
    pub fn add_host(&self, host: Host) {
        let mut state = self.lock();
        state.hosts.insert(host.name.clone(), SimHost::new(host));
    }

    /// Make container operations on `host` fail (or succeed again).
    pub fn set_failing(&self, host: &str, failing: bool) {
        let mut state = self.lock();
        if let Some(sim) = state.hosts.get_mut(host) {
            sim.failing = failing;
        }
    }

    /// Delay container operations on `host` by `delay`.
    pub fn set_delay(&self, host: &str, delay: Duration) {
        let mut state = self.lock();
        if let Some(sim) = state.hosts.get_mut(host) {
            sim.delay = Some(delay);
        }
    }

    /// Number of `create_container` calls observed, successful or not.
    pub fn deploy_attempts(&self) -> u64 {
        self.deploy_attempts.load(Ordering::Relaxed)
    }

    /// Number of `remove_container` calls observed, successful or not.
    pub fn remove_attempts(&self) -> u64 {
        self.remove_attempts.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn host_gate(&self, host: &str) -> BackendResult<Option<Duration>> {
        let state = self.lock();
        let sim = state
            .hosts
            .get(host)
            .ok_or_else(|| BackendError::UnknownHost(host.to_string()))?;
        if sim.failing {
            return Err(BackendError::Unreachable {
                host: host.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(sim.delay)
    }
}

impl HostBackend for InMemoryBackend {
    async fn create_host(&self, host: &Host) -> BackendResult<Host> {
        let mut state = self.lock();
        let stored = host.clone();
        state.hosts.insert(host.name.clone(), SimHost::new(stored.clone()));
        Ok(stored)
    }

    async fn start_host(&self, name: &str) -> BackendResult<()> {
        let mut state = self.lock();
        let sim = state
            .hosts
            .get_mut(name)
            .ok_or_else(|| BackendError::UnknownHost(name.to_string()))?;
        sim.host.status = flotilla_fleet::HostStatus::Running;
        Ok(())
    }

    async fn stop_host(&self, name: &str) -> BackendResult<()> {
        let mut state = self.lock();
        let sim = state
            .hosts
            .get_mut(name)
            .ok_or_else(|| BackendError::UnknownHost(name.to_string()))?;
        sim.host.status = flotilla_fleet::HostStatus::Stopped;
        Ok(())
    }

    async fn remove_host(&self, name: &str) -> BackendResult<()> {
        let mut state = self.lock();
        state
            .hosts
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BackendError::UnknownHost(name.to_string()))
    }

    async fn list_hosts(&self) -> BackendResult<Vec<Host>> {
        let state = self.lock();
        Ok(state.hosts.values().map(|sim| sim.host.clone()).collect())
    }

    async fn create_container(
        &self,
        host: &str,
        request: &ContainerRequest,
    ) -> BackendResult<ContainerInstance> {
        self.deploy_attempts.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.host_gate(host)? {
            tokio::time::sleep(delay).await;
        }

        let id = format!("ctr-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let instance = ContainerInstance::new(&id, request.image(), host);

        let mut state = self.lock();
        let sim = state
            .hosts
            .get_mut(host)
            .ok_or_else(|| BackendError::UnknownHost(host.to_string()))?;
        sim.containers.push(instance.clone());
        debug!(%id, %host, image = %request.image(), "container created");
        Ok(instance)
    }

    async fn remove_container(&self, instance: &ContainerInstance) -> BackendResult<()> {
        self.remove_attempts.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.host_gate(&instance.host)? {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        let sim = state
            .hosts
            .get_mut(&instance.host)
            .ok_or_else(|| BackendError::UnknownHost(instance.host.clone()))?;
        let before = sim.containers.len();
        sim.containers.retain(|c| c.id != instance.id);
        if sim.containers.len() == before {
            return Err(BackendError::UnknownInstance(instance.id.clone()));
        }
        debug!(id = %instance.id, host = %instance.host, "container removed");
        Ok(())
    }

    async fn list_containers(&self, host: &str) -> BackendResult<Vec<ContainerInstance>> {
        let state = self.lock();
        let sim = state
            .hosts
            .get(host)
            .ok_or_else(|| BackendError::UnknownHost(host.to_string()))?;
        Ok(sim.containers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_fleet::HostStatus;

    fn running_host(name: &str) -> Host {
        Host::new(name, "10.0.0.1").with_status(HostStatus::Running)
    }

    fn request(image: &str) -> ContainerRequest {
        ContainerRequest::new(image, 1).unwrap()
    }

    #[tokio::test]
    async fn create_and_list_containers() {
        let backend = InMemoryBackend::new();
        backend.add_host(running_host("a"));

        let first = backend.create_container("a", &request("app:1")).await.unwrap();
        let second = backend.create_container("a", &request("app:1")).await.unwrap();
        assert_ne!(first.id, second.id);

        let listed = backend.list_containers("a").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(backend.deploy_attempts(), 2);
    }

    #[tokio::test]
    async fn unknown_host_is_a_typed_failure() {
        let backend = InMemoryBackend::new();
        assert_eq!(
            backend.create_container("ghost", &request("app:1")).await,
            Err(BackendError::UnknownHost("ghost".to_string()))
        );
        assert!(backend.list_containers("ghost").await.is_err());
    }

    #[tokio::test]
    async fn injected_failure_is_host_scoped() {
        let backend = InMemoryBackend::new();
        backend.add_host(running_host("a"));
        backend.add_host(running_host("b"));
        backend.set_failing("a", true);

        assert!(matches!(
            backend.create_container("a", &request("app:1")).await,
            Err(BackendError::Unreachable { .. })
        ));
        assert!(backend.create_container("b", &request("app:1")).await.is_ok());

        backend.set_failing("a", false);
        assert!(backend.create_container("a", &request("app:1")).await.is_ok());
    }

    #[tokio::test]
    async fn remove_container_requires_a_live_instance() {
        let backend = InMemoryBackend::new();
        backend.add_host(running_host("a"));
        let instance = backend.create_container("a", &request("app:1")).await.unwrap();

        backend.remove_container(&instance).await.unwrap();
        assert_eq!(
            backend.remove_container(&instance).await,
            Err(BackendError::UnknownInstance(instance.id.clone()))
        );
        assert_eq!(backend.remove_attempts(), 2);
    }

    #[tokio::test]
    async fn host_lifecycle_transitions() {
        let backend = InMemoryBackend::new();
        backend
            .create_host(&Host::new("a", "10.0.0.1"))
            .await
            .unwrap();
        backend.start_host("a").await.unwrap();

        let hosts = backend.list_hosts().await.unwrap();
        assert_eq!(hosts[0].status, HostStatus::Running);

        backend.stop_host("a").await.unwrap();
        backend.remove_host("a").await.unwrap();
        assert!(backend.list_hosts().await.unwrap().is_empty());
    }
}
