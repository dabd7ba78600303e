//! The shell-and-SSH/Kubernetes cluster provisioner (spec.md §1: "treated
//! as a `ClusterManager` interface"). This crate only depends on the
//! interface — provisioning is carried out by an external collaborator
//! process; what lives here is the contract `controllers::cluster` programs
//! against plus the per-operation timeouts spec.md §5 assigns each call.

pub mod http;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::entities::cluster::ClusterSpec;

pub const TIMEOUT_UP: Duration = Duration::from_secs(30 * 60);
pub const TIMEOUT_DOWN: Duration = Duration::from_secs(30 * 60);
pub const TIMEOUT_START_NODE: Duration = Duration::from_secs(10 * 60);
pub const TIMEOUT_STOP_NODE: Duration = Duration::from_secs(2 * 60);
pub const TIMEOUT_DRAIN: Duration = Duration::from_secs(5 * 60);
pub const TIMEOUT_STATUS: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum Error {
    #[error("cluster provisioning failed: {0}")]
    Provisioning(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Default)]
pub struct ClusterStatusReport {
    pub dashboard_url: Option<String>,
    pub node_ips: Vec<String>,
    pub ready: bool,
}

/// Implemented by the out-of-process provisioner this crate delegates
/// cluster lifecycle operations to (spec.md §1 Out of scope).
#[async_trait]
pub trait ClusterManager: Send + Sync {
    async fn up(&self, name: &str, spec: &ClusterSpec) -> Result<(), Error>;
    async fn down(&self, name: &str) -> Result<(), Error>;
    async fn start_node(&self, name: &str, node_ip: &str) -> Result<(), Error>;
    async fn stop_node(&self, name: &str, node_ip: &str) -> Result<(), Error>;
    async fn drain(&self, name: &str, node_ip: &str) -> Result<(), Error>;
    async fn status(&self, name: &str) -> Result<ClusterStatusReport, Error>;
}
