//! Reconciliation engine — converges actual instances toward desired scale.
//!
//! One `ensure_scale` invocation is a best-effort, one-shot pass:
//!
//! 1. Group live instances by the request owning them (image equality)
//! 2. Per request, compute `diff = desired − actual`
//! 3. `diff > 0`: elect hosts, select targets, deploy to each concurrently
//! 4. `diff < 0`: drain oldest instances first, re-checking the live
//!    count after every attempt and stopping as soon as it matches
//! 5. Record every step in the ledger, parented under one root event
//!
//! Host-local failures are recovered locally and summarized in the
//! report; re-invoking `ensure_scale` is the retry mechanism. Concurrent
//! invocations for *different* deployments are safe; callers needing
//! at-most-one reconciliation per deployment must serialize externally.
//! Dropping the returned future abandons the pass between steps —
//! already-spawned per-host operations run to completion.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use flotilla_events::{Event, EventId, EventKind, Ledger, Severity};
use flotilla_fleet::{
    ContainerRequest, Deployment, FleetRegistry, InstanceId,
};
use flotilla_placement::{DefaultElector, Elector, RoundRobinSelector, Selector};

use crate::backend::HostBackend;
use crate::error::EngineResult;
use crate::executor::Executor;

/// Per-request outcome of one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct RequestOutcome {
    pub image: String,
    pub desired: u32,
    /// Instance count when the pass started.
    pub before: usize,
    /// Instance count when the pass finished.
    pub after: usize,
    pub deployed: Vec<InstanceId>,
    pub removed: Vec<InstanceId>,
    /// Human-readable per-host failures.
    pub failures: Vec<String>,
    /// Replicas still missing (or still surplus) after the pass.
    pub shortfall: u32,
}

impl RequestOutcome {
    fn converged(image: &str, desired: u32, count: usize) -> Self {
        Self {
            image: image.to_string(),
            desired,
            before: count,
            after: count,
            deployed: Vec::new(),
            removed: Vec::new(),
            failures: Vec::new(),
            shortfall: 0,
        }
    }
}

/// Outcome of a whole `ensure_scale` or `deploy` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    /// Id of the root ledger event for this pass.
    pub event: EventId,
    /// True when any request missed its target.
    pub partial: bool,
    pub requests: Vec<RequestOutcome>,
}

impl ReconcileReport {
    pub fn converged(&self) -> bool {
        !self.partial && self.requests.iter().all(|outcome| outcome.failures.is_empty())
    }
}

/// The control loop driving elector, selector, and executor.
pub struct Reconciler<B> {
    fleet: FleetRegistry,
    executor: Executor<B>,
    ledger: Ledger,
    elector: Arc<dyn Elector>,
    selector: Arc<dyn Selector>,
}

impl<B: HostBackend> Reconciler<B> {
    /// A reconciler with the standard elector and round-robin selector.
    pub fn new(fleet: FleetRegistry, executor: Executor<B>, ledger: Ledger) -> Self {
        Self {
            fleet,
            executor,
            ledger,
            elector: Arc::new(DefaultElector),
            selector: Arc::new(RoundRobinSelector::new()),
        }
    }

    pub fn with_elector(mut self, elector: Arc<dyn Elector>) -> Self {
        self.elector = elector;
        self
    }

    pub fn with_selector(mut self, selector: Arc<dyn Selector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// One reconciliation pass: close the gap between desired and actual
    /// scale for every request in the deployment.
    pub async fn ensure_scale(&self, deployment: &Deployment) -> EngineResult<ReconcileReport> {
        let mut root = Event::new(
            EventKind::Reconcile,
            &format!("reconcile deployment of {} request(s)", deployment.requests().len()),
        );
        root.begin()?;

        let mut outcomes = Vec::new();
        let mut needed: u32 = 0;
        for request in deployment.requests() {
            let image = request.image();
            let desired = request.scale();
            let before = self.fleet.instance_count_for_image(image).await;

            let outcome = if before as u32 == desired {
                root.record(&format!("{image}: converged at {desired}"))?;
                RequestOutcome::converged(image, desired, before)
            } else if (before as u32) < desired {
                let count = desired - before as u32;
                needed += count;
                let outcome = self
                    .place(request, count, before, root.id(), EventKind::ScaleUp)
                    .await?;
                root.record(&format!(
                    "{image}: scaled up {} of {count} (now {})",
                    outcome.deployed.len(),
                    outcome.after
                ))?;
                outcome
            } else {
                let count = before as u32 - desired;
                needed += count;
                let outcome = self.drain(request, count, before, root.id()).await?;
                root.record(&format!(
                    "{image}: drained {} of {count} (now {})",
                    outcome.removed.len(),
                    outcome.after
                ))?;
                outcome
            };
            outcomes.push(outcome);
        }

        self.finish(root, outcomes, needed)
    }

    /// Unconditional bring-up: place one instance per request per
    /// selected host, regardless of what is already running.
    pub async fn deploy(&self, deployment: &Deployment) -> EngineResult<ReconcileReport> {
        let mut root = Event::new(
            EventKind::Reconcile,
            &format!("bring-up of {} request(s)", deployment.requests().len()),
        );
        root.begin()?;

        let mut outcomes = Vec::new();
        let mut needed: u32 = 0;
        for request in deployment.requests() {
            let before = self.fleet.instance_count_for_image(request.image()).await;
            needed += request.scale();
            let outcome = self
                .place(request, request.scale(), before, root.id(), EventKind::Deploy)
                .await?;
            root.record(&format!(
                "{}: placed {} of {}",
                outcome.image,
                outcome.deployed.len(),
                request.scale()
            ))?;
            outcomes.push(outcome);
        }

        self.finish(root, outcomes, needed)
    }

    // ── Internal steps ─────────────────────────────────────────────

    /// Deploy up to `count` new instances of `request`.
    ///
    /// Per-host deploys run as separate tasks and are all joined before
    /// this returns; each is fault-isolated and recorded as its own
    /// sub-event.
    async fn place(
        &self,
        request: &ContainerRequest,
        count: u32,
        before: usize,
        parent: &EventId,
        kind: EventKind,
    ) -> EngineResult<RequestOutcome> {
        let image = request.image().to_string();
        let desired = request.scale();
        let mut event =
            Event::new(kind, &format!("place {count} instance(s) of {image}")).with_parent(parent);
        event.begin()?;
        event.annotate("image", &image)?;

        if count == 0 {
            event.record("nothing requested")?;
            event.succeed()?;
            self.ledger.publish(&event);
            return Ok(RequestOutcome::converged(&image, desired, before));
        }

        let hosts = self.fleet.list_hosts().await;
        let eligible = self.elector.select_eligible(request, &hosts);
        if eligible.is_empty() {
            // A legitimate "cannot place now", not a failure of any host.
            event.record("no eligible hosts")?;
            event.annotate("shortfall", &count.to_string())?;
            event.set_severity(Severity::Warning)?;
            event.abort()?;
            self.ledger.publish(&event);
            warn!(%image, "no eligible hosts for placement");
            return Ok(RequestOutcome {
                shortfall: count,
                ..RequestOutcome::converged(&image, desired, before)
            });
        }

        let targets = self.selector.select_targets(&eligible, request, count);
        if (targets.len() as u32) < count {
            event.record(&format!(
                "only {} of {count} placements have a target host",
                targets.len()
            ))?;
        }

        let mut handles = Vec::with_capacity(targets.len());
        for host in &targets {
            let executor = self.executor.clone();
            let host = host.clone();
            let request = request.clone();
            let host_name = host.name.clone();
            handles.push((
                host_name,
                tokio::spawn(async move { executor.deploy(&host, &request).await }),
            ));
        }

        let mut deployed = Vec::new();
        let mut failures = Vec::new();
        for (host_name, handle) in handles {
            let mut attempt =
                Event::new(EventKind::Deploy, &format!("deploy {image} to {host_name}"))
                    .with_parent(event.id());
            attempt.begin()?;
            attempt.annotate("host", &host_name)?;
            match handle.await {
                Ok(Ok(instance)) => {
                    attempt.annotate("instance", &instance.id)?;
                    attempt.succeed()?;
                    deployed.push(instance.id);
                }
                Ok(Err(error)) => {
                    attempt.record(&error.to_string())?;
                    attempt.fail()?;
                    failures.push(error.to_string());
                }
                Err(join_error) => {
                    attempt.record(&format!("deploy task failed: {join_error}"))?;
                    attempt.fail()?;
                    failures.push(format!("deploy to {host_name}: task failed"));
                }
            }
            self.ledger.publish(&attempt);
        }

        let after = self.fleet.instance_count_for_image(&image).await;
        let shortfall = count - deployed.len() as u32;
        event.annotate("placed", &deployed.len().to_string())?;
        if deployed.is_empty() {
            event.fail()?;
        } else {
            if shortfall > 0 {
                event.annotate("shortfall", &shortfall.to_string())?;
                event.set_severity(Severity::Warning)?;
            }
            event.succeed()?;
        }
        self.ledger.publish(&event);

        Ok(RequestOutcome {
            image,
            desired,
            before,
            after,
            deployed,
            removed: Vec::new(),
            failures,
            shortfall,
        })
    }

    /// Remove up to `count` surplus instances of `request`, oldest first.
    ///
    /// Removals run sequentially: the live count is re-evaluated after
    /// every attempt so the drain stops as soon as the fleet converged,
    /// even if earlier removals failed.
    async fn drain(
        &self,
        request: &ContainerRequest,
        count: u32,
        before: usize,
        parent: &EventId,
    ) -> EngineResult<RequestOutcome> {
        let image = request.image().to_string();
        let desired = request.scale();
        let mut event = Event::new(
            EventKind::ScaleDown,
            &format!("drain {count} instance(s) of {image}"),
        )
        .with_parent(parent);
        event.begin()?;
        event.annotate("image", &image)?;

        let candidates: Vec<_> = self
            .fleet
            .instances_for_image(&image)
            .await
            .into_iter()
            .take(count as usize)
            .collect();

        let mut removed = Vec::new();
        let mut failures = Vec::new();
        for victim in candidates {
            if self.fleet.instance_count_for_image(&image).await <= desired as usize {
                event.record("converged early, stopping drain")?;
                break;
            }

            let mut attempt = Event::new(
                EventKind::Undeploy,
                &format!("remove {} from {}", victim.id, victim.host),
            )
            .with_parent(event.id());
            attempt.begin()?;
            attempt.annotate("host", &victim.host)?;
            match self.executor.remove(&victim).await {
                Ok(()) => {
                    attempt.succeed()?;
                    removed.push(victim.id.clone());
                }
                Err(error) => {
                    attempt.record(&error.to_string())?;
                    attempt.fail()?;
                    failures.push(error.to_string());
                }
            }
            self.ledger.publish(&attempt);
        }

        let after = self.fleet.instance_count_for_image(&image).await;
        let shortfall = (after as u32).abs_diff(desired);
        event.annotate("drained", &removed.len().to_string())?;
        if removed.is_empty() && after > desired as usize {
            event.fail()?;
        } else {
            if shortfall > 0 {
                event.annotate("shortfall", &shortfall.to_string())?;
                event.set_severity(Severity::Warning)?;
            }
            event.succeed()?;
        }
        self.ledger.publish(&event);

        Ok(RequestOutcome {
            image,
            desired,
            before,
            after,
            deployed: Vec::new(),
            removed,
            failures,
            shortfall,
        })
    }

    /// Settle the root event and assemble the report.
    ///
    /// The pass as a whole fails only when work was needed and none of
    /// it succeeded; a missed target with partial progress is reported,
    /// not escalated.
    fn finish(
        &self,
        mut root: Event,
        outcomes: Vec<RequestOutcome>,
        needed: u32,
    ) -> EngineResult<ReconcileReport> {
        let done: u32 = outcomes
            .iter()
            .map(|outcome| (outcome.deployed.len() + outcome.removed.len()) as u32)
            .sum();
        let partial = outcomes.iter().any(|outcome| outcome.shortfall > 0);

        if partial {
            root.annotate("partial", "true")?;
            root.set_severity(Severity::Warning)?;
        }
        if needed > 0 && done == 0 {
            root.fail()?;
        } else {
            root.succeed()?;
        }

        info!(
            event = %root.id(),
            needed,
            done,
            partial,
            "reconciliation pass finished"
        );

        let report = ReconcileReport {
            event: root.id().clone(),
            partial,
            requests: outcomes,
        };
        self.ledger.publish(&root);
        Ok(report)
    }
}
