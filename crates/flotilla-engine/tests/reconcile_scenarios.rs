//! End-to-end reconciliation scenarios against the simulated backend.

use std::sync::Arc;

use flotilla_engine::{Executor, HostBackend, InMemoryBackend, Reconciler, sync_fleet};
use flotilla_events::{EventState, Ledger};
use flotilla_fleet::{ContainerRequest, Deployment, FleetRegistry, Host, HostStatus};

fn running_host(name: &str) -> Host {
    Host::new(name, "10.0.0.1").with_status(HostStatus::Running)
}

/// Backend + registry + reconciler wired together over the given hosts.
async fn harness(hosts: Vec<Host>) -> (Arc<InMemoryBackend>, FleetRegistry, Reconciler<InMemoryBackend>) {
    let backend = Arc::new(InMemoryBackend::new());
    let fleet = FleetRegistry::new();
    for host in hosts {
        backend.add_host(host.clone());
        fleet.upsert_host(host).await;
    }
    let executor = Executor::new(backend.clone(), fleet.clone());
    let reconciler = Reconciler::new(fleet.clone(), executor, Ledger::new());
    (backend, fleet, reconciler)
}

fn single_request(image: &str, scale: u32) -> Deployment {
    Deployment::new(vec![ContainerRequest::new(image, scale).unwrap()]).unwrap()
}

fn root_event_state(reconciler: &Reconciler<InMemoryBackend>, id: &str) -> EventState {
    reconciler
        .ledger()
        .history()
        .into_iter()
        .find(|event| event.id() == id)
        .expect("root event published")
        .state()
}

#[tokio::test]
async fn scale_up_converges_on_a_stable_fleet() {
    let (_, fleet, reconciler) =
        harness(vec![running_host("a"), running_host("b"), running_host("c")]).await;

    for desired in [1, 3, 5] {
        let report = reconciler
            .ensure_scale(&single_request("app:1", desired))
            .await
            .unwrap();
        assert!(report.converged(), "desired {desired} should converge");
        assert_eq!(
            fleet.instance_count_for_image("app:1").await,
            desired as usize
        );
    }
}

#[tokio::test]
async fn example_scenario_scale_two_then_one() {
    // Fleet {A (gpu), B, C}, all running. Scale 2 with no required labels
    // must deploy to exactly two hosts; scaling to 1 must drain the
    // oldest instance and leave one.
    let (_, fleet, reconciler) = harness(vec![
        running_host("a").with_label("gpu"),
        running_host("b"),
        running_host("c"),
    ])
    .await;

    let report = reconciler
        .ensure_scale(&single_request("app:1", 2))
        .await
        .unwrap();
    assert!(report.converged());
    assert_eq!(report.requests[0].deployed.len(), 2);
    assert_eq!(fleet.instance_count_for_image("app:1").await, 2);

    let oldest = fleet.instances_for_image("app:1").await[0].clone();

    let report = reconciler
        .ensure_scale(&single_request("app:1", 1))
        .await
        .unwrap();
    assert!(report.converged());
    assert_eq!(report.requests[0].removed, vec![oldest.id.clone()]);

    let remaining = fleet.instances_for_image("app:1").await;
    assert_eq!(remaining.len(), 1);
    assert_ne!(remaining[0].id, oldest.id);
}

#[tokio::test]
async fn second_pass_on_converged_deployment_does_nothing() {
    let (backend, _, reconciler) =
        harness(vec![running_host("a"), running_host("b")]).await;
    let deployment = single_request("app:1", 2);

    reconciler.ensure_scale(&deployment).await.unwrap();
    let deploys_after_first = backend.deploy_attempts();

    let report = reconciler.ensure_scale(&deployment).await.unwrap();
    assert!(report.converged());
    assert!(report.requests[0].deployed.is_empty());
    assert!(report.requests[0].removed.is_empty());
    assert_eq!(backend.deploy_attempts(), deploys_after_first);
    assert_eq!(backend.remove_attempts(), 0);
}

#[tokio::test]
async fn one_failing_host_of_three_leaves_a_partial_pass() {
    let (backend, fleet, reconciler) =
        harness(vec![running_host("a"), running_host("b"), running_host("c")]).await;
    backend.set_failing("b", true);

    let report = reconciler
        .ensure_scale(&single_request("app:1", 3))
        .await
        .unwrap();

    // The two healthy hosts got their instances; the pass is partial,
    // not failed.
    assert!(report.partial);
    assert_eq!(report.requests[0].deployed.len(), 2);
    assert_eq!(report.requests[0].failures.len(), 1);
    assert_eq!(report.requests[0].shortfall, 1);
    assert_eq!(fleet.instance_count_for_image("app:1").await, 2);
    assert_eq!(root_event_state(&reconciler, &report.event), EventState::Success);

    // Re-invoking once the host recovers finishes the job.
    backend.set_failing("b", false);
    let report = reconciler
        .ensure_scale(&single_request("app:1", 3))
        .await
        .unwrap();
    assert!(report.converged());
    assert_eq!(fleet.instance_count_for_image("app:1").await, 3);
}

#[tokio::test]
async fn zero_progress_fails_the_root_event() {
    let (backend, _, reconciler) = harness(vec![running_host("a")]).await;
    backend.set_failing("a", true);

    let report = reconciler
        .ensure_scale(&single_request("app:1", 2))
        .await
        .unwrap();

    assert!(report.partial);
    assert!(report.requests[0].deployed.is_empty());
    assert_eq!(root_event_state(&reconciler, &report.event), EventState::Failed);
}

#[tokio::test]
async fn no_eligible_hosts_is_reported_not_raised() {
    let (_, _, reconciler) = harness(vec![running_host("a")]).await;
    let deployment = Deployment::new(vec![
        ContainerRequest::new("app:1", 2)
            .unwrap()
            .with_required_labels(["gpu"]),
    ])
    .unwrap();

    let report = reconciler.ensure_scale(&deployment).await.unwrap();
    assert!(report.partial);
    assert_eq!(report.requests[0].shortfall, 2);
    assert!(report.requests[0].failures.is_empty());

    // The placement step is recorded as aborted: nothing to try.
    let children = reconciler.ledger().children_of(&report.event);
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].state(), EventState::Aborted);
}

#[tokio::test]
async fn fewer_eligible_hosts_than_desired_is_a_partial_scale_up() {
    let (_, fleet, reconciler) =
        harness(vec![running_host("a"), running_host("b")]).await;

    let report = reconciler
        .ensure_scale(&single_request("app:1", 5))
        .await
        .unwrap();

    assert!(report.partial);
    assert_eq!(report.requests[0].deployed.len(), 2);
    assert_eq!(report.requests[0].shortfall, 3);
    assert_eq!(fleet.instance_count_for_image("app:1").await, 2);
    assert_eq!(root_event_state(&reconciler, &report.event), EventState::Success);
}

#[tokio::test]
async fn drain_removes_oldest_instances_first() {
    let (backend, fleet, reconciler) = harness(vec![running_host("a")]).await;

    // Seed three instances with a known creation order.
    let request = ContainerRequest::new("app:1", 1).unwrap();
    for _ in 0..3 {
        let instance = backend.create_container("a", &request).await.unwrap();
        fleet.record_instance(instance).await;
    }
    let ordered: Vec<String> = fleet
        .instances_for_image("app:1")
        .await
        .into_iter()
        .map(|instance| instance.id)
        .collect();

    let report = reconciler
        .ensure_scale(&single_request("app:1", 1))
        .await
        .unwrap();

    assert!(report.converged());
    assert_eq!(report.requests[0].removed, ordered[..2].to_vec());
    let remaining = fleet.instances_for_image("app:1").await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, ordered[2]);
}

#[tokio::test]
async fn failed_removals_do_not_abort_the_drain_accounting() {
    let (backend, fleet, reconciler) = harness(vec![running_host("a")]).await;
    let request = ContainerRequest::new("app:1", 1).unwrap();
    for _ in 0..3 {
        let instance = backend.create_container("a", &request).await.unwrap();
        fleet.record_instance(instance).await;
    }

    backend.set_failing("a", true);
    let report = reconciler
        .ensure_scale(&single_request("app:1", 1))
        .await
        .unwrap();

    assert!(report.partial);
    assert!(report.requests[0].removed.is_empty());
    assert_eq!(report.requests[0].failures.len(), 2);
    assert_eq!(fleet.instance_count_for_image("app:1").await, 3);
    assert_eq!(root_event_state(&reconciler, &report.event), EventState::Failed);
}

#[tokio::test]
async fn scale_to_zero_drains_everything() {
    let (_, fleet, reconciler) =
        harness(vec![running_host("a"), running_host("b")]).await;

    reconciler
        .ensure_scale(&single_request("app:1", 2))
        .await
        .unwrap();
    let report = reconciler
        .ensure_scale(&single_request("app:1", 0))
        .await
        .unwrap();

    assert!(report.converged());
    assert_eq!(fleet.instance_count_for_image("app:1").await, 0);
}

#[tokio::test]
async fn requests_are_reconciled_independently() {
    let (backend, fleet, reconciler) =
        harness(vec![running_host("a"), running_host("b")]).await;
    backend.set_failing("b", true);

    // app wants 2 (one will fail on b), web wants 1 (lands on a).
    let deployment = Deployment::new(vec![
        ContainerRequest::new("app:1", 2).unwrap(),
        ContainerRequest::new("web:1", 1).unwrap(),
    ])
    .unwrap();

    let report = reconciler.ensure_scale(&deployment).await.unwrap();

    let app = &report.requests[0];
    let web = &report.requests[1];
    assert_eq!(app.deployed.len() + app.failures.len(), 2);
    assert_eq!(web.image, "web:1");
    assert_eq!(fleet.instance_count_for_image("web:1").await, 1);
}

#[tokio::test]
async fn bring_up_places_unconditionally() {
    let (_, fleet, reconciler) =
        harness(vec![running_host("a"), running_host("b")]).await;
    let deployment = single_request("app:1", 2);

    reconciler.deploy(&deployment).await.unwrap();
    assert_eq!(fleet.instance_count_for_image("app:1").await, 2);

    // Unlike ensure_scale, a second bring-up stacks more instances.
    reconciler.deploy(&deployment).await.unwrap();
    assert_eq!(fleet.instance_count_for_image("app:1").await, 4);
}

#[tokio::test]
async fn refresh_then_reconcile_round_trip() {
    // Start from an empty registry: discover the fleet, then scale on it.
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_host(running_host("a"));
    backend.add_host(running_host("b"));

    let fleet = FleetRegistry::new();
    let ledger = Ledger::new();
    sync_fleet(backend.as_ref(), &fleet, &ledger).await.unwrap();
    assert_eq!(fleet.host_count().await, 2);

    let executor = Executor::new(backend.clone(), fleet.clone());
    let reconciler = Reconciler::new(fleet.clone(), executor, ledger);
    let report = reconciler
        .ensure_scale(&single_request("app:1", 2))
        .await
        .unwrap();

    assert!(report.converged());
    // The backend agrees with the registry.
    let mut live = 0;
    for host in ["a", "b"] {
        live += backend.list_containers(host).await.unwrap().len();
    }
    assert_eq!(live, 2);
}

#[tokio::test]
async fn audit_trail_names_every_touched_host() {
    let (backend, _, reconciler) =
        harness(vec![running_host("a"), running_host("b"), running_host("c")]).await;
    backend.set_failing("c", true);

    let report = reconciler
        .ensure_scale(&single_request("app:1", 3))
        .await
        .unwrap();

    let ledger = reconciler.ledger();
    let scale_event = &ledger.children_of(&report.event)[0];
    let attempts = ledger.children_of(scale_event.id());
    assert_eq!(attempts.len(), 3);

    let mut touched: Vec<String> = attempts
        .iter()
        .filter_map(|event| event.payload().get("host").cloned())
        .collect();
    touched.sort();
    assert_eq!(touched, vec!["a", "b", "c"]);

    let failed: Vec<_> = attempts
        .iter()
        .filter(|event| event.state() == EventState::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].payload().get("host").map(String::as_str), Some("c"));
}

#[tokio::test]
async fn stopped_hosts_receive_no_work() {
    let (_, fleet, reconciler) = harness(vec![
        running_host("a"),
        Host::new("b", "10.0.0.2").with_status(HostStatus::Stopped),
    ])
    .await;

    let report = reconciler
        .ensure_scale(&single_request("app:1", 2))
        .await
        .unwrap();

    assert!(report.partial);
    assert_eq!(report.requests[0].deployed.len(), 1);
    let instances = fleet.instances_for_image("app:1").await;
    assert!(instances.iter().all(|instance| instance.host == "a"));
}
