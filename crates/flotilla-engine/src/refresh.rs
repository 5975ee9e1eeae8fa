//! Fleet refresh — resynchronize the registry from the backend.
//!
//! The registry is authoritative between refreshes, but hosts come and
//! go underneath us. `sync_fleet` pulls the backend's inventory, upserts
//! what it reports, drops what vanished, and reconciles the per-host
//! instance sets. Periodic triggering is a caller concern (a cron-like
//! collaborator); this is one synchronous pass.

use serde::Serialize;
use tracing::{info, warn};

use flotilla_events::{Event, EventKind, Ledger};
use flotilla_fleet::FleetRegistry;

use crate::backend::HostBackend;
use crate::error::EngineResult;

/// What one refresh pass changed.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RefreshSummary {
    pub hosts_added: usize,
    pub hosts_removed: usize,
    pub instances_recorded: usize,
    pub instances_dropped: usize,
}

/// Bring the registry in line with the backend's view of the fleet.
///
/// A host whose container listing fails is skipped (host-scoped failure,
/// logged and isolated); an unreachable inventory as a whole is a hard
/// error.
pub async fn sync_fleet<B: HostBackend>(
    backend: &B,
    fleet: &FleetRegistry,
    ledger: &Ledger,
) -> EngineResult<RefreshSummary> {
    let mut summary = RefreshSummary::default();
    let reported = backend.list_hosts().await?;

    // Drop hosts the backend no longer knows; their instances go with them.
    for known in fleet.list_hosts().await {
        if !reported.iter().any(|host| host.name == known.name) {
            let dropped = fleet.list_instances(&known.name).await.len();
            fleet.remove_host(&known.name).await;
            summary.hosts_removed += 1;
            summary.instances_dropped += dropped;

            let mut event = Event::new(
                EventKind::HostLifecycle,
                &format!("host {} vanished from the fleet", known.name),
            );
            event.annotate("host", &known.name)?;
            event.succeed()?;
            ledger.publish(&event);
        }
    }

    for host in reported {
        let name = host.name.clone();
        let is_new = fleet.get_host(&name).await.is_none();
        fleet.upsert_host(host).await;
        if is_new {
            summary.hosts_added += 1;
            let mut event = Event::new(
                EventKind::HostLifecycle,
                &format!("host {name} joined the fleet"),
            );
            event.annotate("host", &name)?;
            event.succeed()?;
            ledger.publish(&event);
        }

        let live = match backend.list_containers(&name).await {
            Ok(live) => live,
            Err(error) => {
                warn!(host = %name, %error, "skipping instance sync for host");
                continue;
            }
        };
        let recorded = fleet.list_instances(&name).await;

        for instance in &live {
            if !recorded.iter().any(|known| known.id == instance.id) {
                fleet.record_instance(instance.clone()).await;
                summary.instances_recorded += 1;
            }
        }
        for known in &recorded {
            if !live.iter().any(|instance| instance.id == known.id) {
                fleet.remove_instance(&known.id).await;
                summary.instances_dropped += 1;
            }
        }
    }

    info!(
        hosts_added = summary.hosts_added,
        hosts_removed = summary.hosts_removed,
        instances_recorded = summary.instances_recorded,
        instances_dropped = summary.instances_dropped,
        "fleet refreshed"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HostBackend, InMemoryBackend};
    use flotilla_events::EventState;
    use flotilla_fleet::{ContainerRequest, Host, HostStatus};

    fn running_host(name: &str) -> Host {
        Host::new(name, "10.0.0.1").with_status(HostStatus::Running)
    }

    #[tokio::test]
    async fn refresh_imports_hosts_and_instances() {
        let backend = InMemoryBackend::new();
        backend.add_host(running_host("a"));
        backend.add_host(running_host("b"));
        let request = ContainerRequest::new("app:1", 1).unwrap();
        backend.create_container("a", &request).await.unwrap();

        let fleet = FleetRegistry::new();
        let ledger = Ledger::new();
        let summary = sync_fleet(&backend, &fleet, &ledger).await.unwrap();

        assert_eq!(summary.hosts_added, 2);
        assert_eq!(summary.instances_recorded, 1);
        assert_eq!(fleet.host_count().await, 2);
        assert_eq!(fleet.instance_count_for_image("app:1").await, 1);

        let lifecycle: Vec<_> = ledger
            .history()
            .into_iter()
            .filter(|event| event.kind() == EventKind::HostLifecycle)
            .collect();
        assert_eq!(lifecycle.len(), 2);
        assert!(lifecycle.iter().all(|e| e.state() == EventState::Success));
    }

    #[tokio::test]
    async fn vanished_host_is_dropped_with_its_instances() {
        let backend = InMemoryBackend::new();
        backend.add_host(running_host("a"));
        backend.add_host(running_host("b"));
        let request = ContainerRequest::new("app:1", 1).unwrap();
        backend.create_container("b", &request).await.unwrap();

        let fleet = FleetRegistry::new();
        let ledger = Ledger::new();
        sync_fleet(&backend, &fleet, &ledger).await.unwrap();

        backend.remove_host("b").await.unwrap();
        let summary = sync_fleet(&backend, &fleet, &ledger).await.unwrap();

        assert_eq!(summary.hosts_removed, 1);
        assert_eq!(summary.instances_dropped, 1);
        assert!(fleet.get_host("b").await.is_none());
        assert_eq!(fleet.instance_count_for_image("app:1").await, 0);
    }

    #[tokio::test]
    async fn refresh_is_idempotent_on_a_stable_fleet() {
        let backend = InMemoryBackend::new();
        backend.add_host(running_host("a"));

        let fleet = FleetRegistry::new();
        let ledger = Ledger::new();
        sync_fleet(&backend, &fleet, &ledger).await.unwrap();
        let second = sync_fleet(&backend, &fleet, &ledger).await.unwrap();

        assert_eq!(second.hosts_added, 0);
        assert_eq!(second.hosts_removed, 0);
        assert_eq!(second.instances_recorded, 0);
        assert_eq!(second.instances_dropped, 0);
    }

    #[tokio::test]
    async fn stale_registry_instance_is_dropped() {
        let backend = InMemoryBackend::new();
        backend.add_host(running_host("a"));
        let request = ContainerRequest::new("app:1", 1).unwrap();
        let instance = backend.create_container("a", &request).await.unwrap();

        let fleet = FleetRegistry::new();
        let ledger = Ledger::new();
        sync_fleet(&backend, &fleet, &ledger).await.unwrap();

        // The container dies outside our control.
        backend.remove_container(&instance).await.unwrap();
        let summary = sync_fleet(&backend, &fleet, &ledger).await.unwrap();

        assert_eq!(summary.instances_dropped, 1);
        assert_eq!(fleet.instance_count_for_image("app:1").await, 0);
    }
}
