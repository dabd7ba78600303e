use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Entity, HasPhase, Resource};

pub struct Cluster;

impl Entity for Cluster {
    const KIND: &'static str = "Cluster";
    type Spec = ClusterSpec;
    type Status = ClusterStatus;
}

pub type ClusterResource = Resource<Cluster>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSpec {
    #[serde(rename = "type")]
    pub cluster_type: ClusterType,
    pub version: String,
    pub image_registry: String,
    #[serde(default)]
    pub ssh: Option<SshClusterConfig>,
    #[serde(default)]
    pub kubernetes: Option<KubernetesClusterConfig>,
    #[serde(default)]
    pub model_caches: Vec<ModelCacheConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterType {
    Ssh,
    Kubernetes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshClusterConfig {
    pub head_ip: String,
    #[serde(default)]
    pub worker_ips: Vec<String>,
    pub auth: SshAuth,
    #[serde(default)]
    pub docker: Option<SshDockerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshAuth {
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshDockerConfig {
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubernetesClusterConfig {
    pub kubeconfig: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// One entry of `spec.modelCaches`: a shared cache volume mounted into
/// every endpoint on this cluster at `/models-cache/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCacheConfig {
    pub name: String,
    #[serde(flatten)]
    pub source: ModelCacheSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ModelCacheSource {
    HostPath { path: String },
    Nfs { server: String, path: String },
    Pvc { claim_name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ClusterPhase {
    Pending,
    Initializing,
    Running,
    Failed,
    Deleting,
    Deleted,
}

impl Default for ClusterPhase {
    fn default() -> Self {
        Self::Pending
    }
}

impl ClusterPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Initializing => "Initializing",
            Self::Running => "Running",
            Self::Failed => "Failed",
            Self::Deleting => "Deleting",
            Self::Deleted => "Deleted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub phase: ClusterPhase,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Becomes true once the backend has finished first-time provisioning;
    /// never reset back to false by a later reconcile.
    #[serde(default)]
    pub initialized: bool,
    /// Ray dashboard URL, set once the backend reports it. Its presence is
    /// what routes a `kubernetes`-typed cluster to the Ray Serve
    /// orchestrator instead of the Kubernetes-native one (spec.md §9 Open
    /// Questions, resolved explicitly in `orchestrator::select`).
    #[serde(default)]
    pub dashboard_url: Option<String>,
    #[serde(default)]
    pub node_ips: Vec<String>,
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl HasPhase for ClusterStatus {
    fn phase(&self) -> &str {
        self.phase.as_str()
    }

    fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}
