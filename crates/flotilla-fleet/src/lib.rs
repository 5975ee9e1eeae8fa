//! flotilla-fleet — domain types and the in-memory fleet registry.
//!
//! The fleet is the set of registered container-hosting nodes plus the
//! live instances running on them. This crate owns:
//!
//! - **`types`** — hosts, container requests, deployments, instances
//! - **`registry`** — the concurrency-safe `FleetRegistry`
//!
//! The `FleetRegistry` handle is `Clone + Send + Sync` and is shared by
//! the placement and reconciliation crates. Mutation is reserved for the
//! deployment executor (on confirmed success) and the fleet refresh path.

pub mod error;
pub mod registry;
pub mod types;

pub use error::RequestError;
pub use registry::FleetRegistry;
pub use types::{
    ContainerInstance, ContainerRequest, Deployment, Host, HostName, HostStatus, InstanceId,
    Resources,
};
