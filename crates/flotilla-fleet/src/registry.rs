//! FleetRegistry — authoritative in-memory view of hosts and instances.
//!
//! The registry is the only mutable shared state in the system. It is
//! written by the deployment executor (after a backend call confirmed
//! success) and by the fleet refresh path, and read by everything else.
//!
//! The handle is `Clone` (backed by `Arc<RwLock<…>>`) and can be shared
//! freely across async tasks. Host lookup is O(1) by name. There is no
//! ordering guarantee across hosts; within one host, instance order
//! follows a registry-assigned monotonic sequence, which also defines
//! "oldest" for drain decisions.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::types::{ContainerInstance, Host, HostName, HostStatus, InstanceId};

/// An instance plus the sequence number stamped when it was recorded.
#[derive(Debug, Clone)]
struct InstanceRecord {
    seq: u64,
    instance: ContainerInstance,
}

#[derive(Debug, Default)]
struct FleetState {
    hosts: HashMap<HostName, Host>,
    instances: HashMap<InstanceId, InstanceRecord>,
    next_seq: u64,
}

/// Shared, concurrency-safe fleet state.
#[derive(Clone, Default)]
pub struct FleetRegistry {
    inner: Arc<RwLock<FleetState>>,
}

impl FleetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Hosts ──────────────────────────────────────────────────────

    /// Register a host, or replace the stored record for its name.
    pub async fn upsert_host(&self, host: Host) {
        let mut state = self.inner.write().await;
        let name = host.name.clone();
        let replaced = state.hosts.insert(name.clone(), host).is_some();
        debug!(host = %name, replaced, "host upserted");
    }

    /// Remove a host and every instance recorded on it.
    ///
    /// Returns the removed host, or `None` if the name was unknown.
    pub async fn remove_host(&self, name: &str) -> Option<Host> {
        let mut state = self.inner.write().await;
        let removed = state.hosts.remove(name)?;
        state.instances.retain(|_, record| record.instance.host != name);
        info!(host = %name, "host removed from fleet");
        Some(removed)
    }

    /// Transition a host to a new status. Returns false for unknown hosts.
    pub async fn set_host_status(&self, name: &str, status: HostStatus) -> bool {
        let mut state = self.inner.write().await;
        match state.hosts.get_mut(name) {
            Some(host) => {
                debug!(host = %name, from = ?host.status, to = ?status, "host status changed");
                host.status = status;
                true
            }
            None => false,
        }
    }

    pub async fn get_host(&self, name: &str) -> Option<Host> {
        let state = self.inner.read().await;
        state.hosts.get(name).cloned()
    }

    /// Snapshot of all registered hosts, in no particular order.
    pub async fn list_hosts(&self) -> Vec<Host> {
        let state = self.inner.read().await;
        state.hosts.values().cloned().collect()
    }

    pub async fn host_count(&self) -> usize {
        let state = self.inner.read().await;
        state.hosts.len()
    }

    // ── Instances ──────────────────────────────────────────────────

    /// Record a confirmed-running instance.
    ///
    /// Stamps the record with the next sequence number; re-recording an
    /// existing id keeps its original position in the creation order.
    pub async fn record_instance(&self, instance: ContainerInstance) {
        let mut state = self.inner.write().await;
        if let Some(existing) = state.instances.get_mut(&instance.id) {
            existing.instance = instance;
            return;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        debug!(id = %instance.id, host = %instance.host, "instance recorded");
        state.instances.insert(instance.id.clone(), InstanceRecord { seq, instance });
    }

    pub async fn remove_instance(&self, id: &str) -> Option<ContainerInstance> {
        let mut state = self.inner.write().await;
        let record = state.instances.remove(id)?;
        debug!(%id, "instance removed");
        Some(record.instance)
    }

    /// Instances on one host, in creation order.
    pub async fn list_instances(&self, host: &str) -> Vec<ContainerInstance> {
        let state = self.inner.read().await;
        let mut records: Vec<&InstanceRecord> = state
            .instances
            .values()
            .filter(|record| record.instance.host == host)
            .collect();
        records.sort_by_key(|record| record.seq);
        records.iter().map(|record| record.instance.clone()).collect()
    }

    /// Instances created from `image` across the whole fleet, oldest first.
    pub async fn instances_for_image(&self, image: &str) -> Vec<ContainerInstance> {
        let state = self.inner.read().await;
        let mut records: Vec<&InstanceRecord> = state
            .instances
            .values()
            .filter(|record| record.instance.image == image)
            .collect();
        records.sort_by_key(|record| record.seq);
        records.iter().map(|record| record.instance.clone()).collect()
    }

    pub async fn instance_count_for_image(&self, image: &str) -> usize {
        let state = self.inner.read().await;
        state
            .instances
            .values()
            .filter(|record| record.instance.image == image)
            .count()
    }
}
