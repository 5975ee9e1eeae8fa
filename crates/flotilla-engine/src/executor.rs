//! Deployment executor — one deploy or removal against one host.
//!
//! Every backend call is bounded by the configured timeout; a timeout is
//! a failure for that host, never for the batch. The fleet registry is
//! updated only after the backend confirmed success, so it never holds
//! speculative state. The executor performs no retries — re-invoking the
//! reconciler is the retry mechanism.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};

use flotilla_fleet::{ContainerInstance, ContainerRequest, FleetRegistry, Host};

use crate::backend::HostBackend;
use crate::error::{DeployError, HostOpError, RemoveError};

/// Default bound on a single backend call.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes host-scoped deploy/remove operations.
pub struct Executor<B> {
    backend: Arc<B>,
    fleet: FleetRegistry,
    op_timeout: Duration,
}

impl<B> Clone for Executor<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            fleet: self.fleet.clone(),
            op_timeout: self.op_timeout,
        }
    }
}

impl<B: HostBackend> Executor<B> {
    pub fn new(backend: Arc<B>, fleet: FleetRegistry) -> Self {
        Self {
            backend,
            fleet,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    /// Bound every backend call by `op_timeout`.
    pub fn with_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    /// Place one instance of `request` on `host`.
    ///
    /// At-most-once per call: no internal retry. On success the new
    /// instance is recorded in the registry before returning.
    pub async fn deploy(
        &self,
        host: &Host,
        request: &ContainerRequest,
    ) -> Result<ContainerInstance, DeployError> {
        let call = self.backend.create_container(&host.name, request);
        let result = match timeout(self.op_timeout, call).await {
            Err(_) => Err(HostOpError::Timeout(self.op_timeout)),
            Ok(Err(backend_error)) => Err(HostOpError::Backend(backend_error)),
            Ok(Ok(instance)) => Ok(instance),
        };

        match result {
            Ok(instance) => {
                self.fleet.record_instance(instance.clone()).await;
                info!(
                    id = %instance.id,
                    host = %host.name,
                    image = %request.image(),
                    "instance deployed"
                );
                Ok(instance)
            }
            Err(cause) => {
                warn!(host = %host.name, image = %request.image(), error = %cause, "deploy failed");
                Err(DeployError {
                    host: host.name.clone(),
                    image: request.image().to_string(),
                    cause,
                })
            }
        }
    }

    /// Remove a running instance from its host.
    ///
    /// On success the instance is deleted from the registry.
    pub async fn remove(&self, instance: &ContainerInstance) -> Result<(), RemoveError> {
        let call = self.backend.remove_container(instance);
        let result = match timeout(self.op_timeout, call).await {
            Err(_) => Err(HostOpError::Timeout(self.op_timeout)),
            Ok(Err(backend_error)) => Err(HostOpError::Backend(backend_error)),
            Ok(Ok(())) => Ok(()),
        };

        match result {
            Ok(()) => {
                self.fleet.remove_instance(&instance.id).await;
                info!(id = %instance.id, host = %instance.host, "instance removed");
                Ok(())
            }
            Err(cause) => {
                warn!(id = %instance.id, host = %instance.host, error = %cause, "remove failed");
                Err(RemoveError {
                    host: instance.host.clone(),
                    instance: instance.id.clone(),
                    cause,
                })
            }
        }
    }
}
