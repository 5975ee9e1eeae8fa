//! Engine error types.
//!
//! Deploy/remove failures are host-scoped and recovered locally by the
//! reconciler; only ledger-contract violations and refresh-time backend
//! failures surface as hard `EngineError`s.

use std::time::Duration;

use thiserror::Error;

use flotilla_fleet::{HostName, InstanceId};
use flotilla_events::EventError;

use crate::backend::BackendError;

/// Why a single host-scoped operation failed.
#[derive(Debug, Error)]
pub enum HostOpError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// A failed instance placement on one host.
#[derive(Debug, Error)]
#[error("deploy of {image} to {host} failed: {cause}")]
pub struct DeployError {
    pub host: HostName,
    pub image: String,
    #[source]
    pub cause: HostOpError,
}

/// A failed instance removal on one host.
#[derive(Debug, Error)]
#[error("removal of {instance} on {host} failed: {cause}")]
pub struct RemoveError {
    pub host: HostName,
    pub instance: InstanceId,
    #[source]
    pub cause: HostOpError,
}

/// Hard failures surfaced to the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Programming-contract violation on the event ledger.
    #[error(transparent)]
    Event(#[from] EventError),

    /// The backend could not be queried at all (fleet refresh).
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type EngineResult<T> = Result<T, EngineError>;
