//! cluster.toml parser.
//!
//! Describes the fleet to simulate (`[[hosts]]`) and the workloads to
//! reconcile (`[[requests]]`). Conversion into domain types goes through
//! the validating constructors, so a bad definition is rejected before
//! anything runs.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use flotilla_fleet::{ContainerRequest, Deployment, Host, HostStatus, Resources};

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
    #[serde(default)]
    pub requests: Vec<RequestConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub cpus: u32,
    #[serde(default)]
    pub memory_bytes: u64,
    #[serde(default)]
    pub disk_bytes: u64,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default = "default_status")]
    pub status: HostStatus,
}

fn default_status() -> HostStatus {
    HostStatus::Running
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestConfig {
    pub image: String,
    pub scale: u32,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub swarm: Option<String>,
    pub resources: Option<ResourcesConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourcesConfig {
    #[serde(default)]
    pub cpus: u32,
    #[serde(default)]
    pub memory_bytes: u64,
    #[serde(default)]
    pub disk_bytes: u64,
}

impl ClusterConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: ClusterConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// The fleet described by `[[hosts]]`.
    pub fn hosts(&self) -> Vec<Host> {
        self.hosts
            .iter()
            .map(|config| {
                let mut host = Host::new(&config.name, &config.address)
                    .with_status(config.status)
                    .with_capacity(Resources {
                        cpus: config.cpus,
                        memory_bytes: config.memory_bytes,
                        disk_bytes: config.disk_bytes,
                    });
                for label in &config.labels {
                    host = host.with_label(label);
                }
                host
            })
            .collect()
    }

    /// The deployment described by `[[requests]]`, fully validated.
    pub fn deployment(&self) -> anyhow::Result<Deployment> {
        let mut requests = Vec::with_capacity(self.requests.len());
        for config in &self.requests {
            let mut request = ContainerRequest::new(&config.image, config.scale)?
                .with_required_labels(config.labels.iter().cloned());
            for (key, value) in &config.env {
                request = request.with_env(key, value);
            }
            if let Some(swarm) = &config.swarm {
                request = request.with_swarm(swarm);
            }
            if let Some(resources) = &config.resources {
                request = request.with_resources(Resources {
                    cpus: resources.cpus,
                    memory_bytes: resources.memory_bytes,
                    disk_bytes: resources.disk_bytes,
                });
            }
            requests.push(request);
        }
        Ok(Deployment::new(requests)?)
    }
}
