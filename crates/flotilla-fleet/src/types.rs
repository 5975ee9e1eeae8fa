//! Domain types for the Flotilla fleet.
//!
//! These types describe hosts, the workloads callers ask for, and the
//! container instances actually running. Requests and deployments are
//! validated once at construction and immutable afterwards.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::RequestError;

/// Unique name of a host in the fleet.
pub type HostName = String;

/// Opaque instance identifier assigned by the host-management backend.
pub type InstanceId = String;

// ── Host ──────────────────────────────────────────────────────────

/// Lifecycle status of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Unknown,
    Creating,
    Running,
    Stopped,
    Error,
    Removed,
}

/// Declared resource capacity of a host, or the footprint a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Resources {
    pub cpus: u32,
    pub memory_bytes: u64,
    pub disk_bytes: u64,
}

impl Resources {
    /// Whether this capacity covers `hint`, component-wise.
    pub fn can_fit(&self, hint: &Resources) -> bool {
        self.cpus >= hint.cpus
            && self.memory_bytes >= hint.memory_bytes
            && self.disk_bytes >= hint.disk_bytes
    }
}

/// A container-hosting node registered with the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub name: HostName,
    /// Network address (ip or hostname, as reported by the backend).
    pub address: String,
    pub capacity: Resources,
    /// Arbitrary labels for placement constraints.
    pub labels: BTreeSet<String>,
    pub status: HostStatus,
}

impl Host {
    /// A host with the given name and address, no labels, status `Unknown`.
    pub fn new(name: &str, address: &str) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            capacity: Resources::default(),
            labels: BTreeSet::new(),
            status: HostStatus::Unknown,
        }
    }

    pub fn with_status(mut self, status: HostStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_capacity(mut self, capacity: Resources) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.labels.insert(label.to_string());
        self
    }
}

// ── Requests ──────────────────────────────────────────────────────

/// What a caller wants running: an image at a desired scale.
///
/// Immutable after construction. The desired scale is a `u32`, so a
/// negative replica count is unrepresentable; the constructor rejects an
/// empty image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerRequest {
    image: String,
    scale: u32,
    swarm: Option<String>,
    required_labels: BTreeSet<String>,
    env: BTreeMap<String, String>,
    resources: Option<Resources>,
}

impl ContainerRequest {
    /// Validate and build a request for `scale` replicas of `image`.
    pub fn new(image: &str, scale: u32) -> Result<Self, RequestError> {
        if image.trim().is_empty() {
            return Err(RequestError::EmptyImage);
        }
        Ok(Self {
            image: image.to_string(),
            scale,
            swarm: None,
            required_labels: BTreeSet::new(),
            env: BTreeMap::new(),
            resources: None,
        })
    }

    /// Require all of `labels` on any host this request is placed on.
    pub fn with_required_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_labels.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_swarm(mut self, swarm: &str) -> Self {
        self.swarm = Some(swarm.to_string());
        self
    }

    /// Attach a resource footprint hint checked against host capacity.
    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn swarm(&self) -> Option<&str> {
        self.swarm.as_deref()
    }

    pub fn required_labels(&self) -> &BTreeSet<String> {
        &self.required_labels
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn resources(&self) -> Option<&Resources> {
        self.resources.as_ref()
    }
}

/// An ordered batch of requests reconciled together.
///
/// Instances are matched back to their owning request by image-reference
/// equality, so two requests in one deployment must not share an image:
/// `new` rejects duplicates instead of guessing which request owns what.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deployment {
    requests: Vec<ContainerRequest>,
}

impl Deployment {
    pub fn new(requests: Vec<ContainerRequest>) -> Result<Self, RequestError> {
        let mut seen = BTreeSet::new();
        for request in &requests {
            if !seen.insert(request.image().to_string()) {
                return Err(RequestError::DuplicateImage(request.image().to_string()));
            }
        }
        Ok(Self { requests })
    }

    pub fn requests(&self) -> &[ContainerRequest] {
        &self.requests
    }
}

// ── Instances ─────────────────────────────────────────────────────

/// A running container as reported by the host-management backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInstance {
    /// Backend-assigned id, opaque to the engine.
    pub id: InstanceId,
    /// Image reference this instance was created from.
    pub image: String,
    /// Name of the host it runs on.
    pub host: HostName,
}

impl ContainerInstance {
    pub fn new(id: &str, image: &str, host: &str) -> Self {
        Self {
            id: id.to_string(),
            image: image.to_string(),
            host: host.to_string(),
        }
    }
}
