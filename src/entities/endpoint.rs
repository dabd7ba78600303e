use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Entity, HasPhase, Resource};

pub struct Endpoint;

impl Entity for Endpoint {
    const KIND: &'static str = "Endpoint";
    type Spec = EndpointSpec;
    type Status = EndpointStatus;
}

pub type EndpointResource = Resource<Endpoint>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub cluster: String,
    pub engine: EndpointEngineRef,
    pub model: EndpointModelRef,
    #[serde(default)]
    pub resources: EndpointResources,
    pub replicas: EndpointReplicas,
    #[serde(default)]
    pub deployment_options: DeploymentOptions,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointEngineRef {
    pub engine: String,
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelTask {
    TextGeneration,
    Embedding,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointModelRef {
    pub registry: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub task: Option<ModelTask>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointResources {
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub gpu: Option<f64>,
    #[serde(default)]
    pub accelerator: Option<AcceleratorRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceleratorRequest {
    #[serde(rename = "type")]
    pub accelerator_type: String,
    #[serde(default)]
    pub product: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointReplicas {
    pub num: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentOptions {
    #[serde(default)]
    pub scheduler: SchedulerOptions,
    #[serde(default)]
    pub backend: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub controller: serde_json::Map<String, serde_json::Value>,
    /// Anything else passed through verbatim into the rendered app/args.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerOptions {
    #[serde(rename = "type", default = "default_scheduler_type")]
    pub scheduler_type: String,
}

fn default_scheduler_type() -> String {
    "roundrobin".to_string()
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            scheduler_type: default_scheduler_type(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EndpointPhase {
    Pending,
    Deploying,
    Running,
    Paused,
    Failed,
    Deleting,
    Deleted,
}

impl Default for EndpointPhase {
    fn default() -> Self {
        Self::Pending
    }
}

impl EndpointPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Deploying => "Deploying",
            Self::Running => "Running",
            Self::Paused => "Paused",
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
pub struct EndpointStatus {
    pub phase: EndpointPhase,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub service_url: Option<String>,
    /// The last desired artifact successfully applied, used to skip
    /// no-op converges (spec.md §8 law "Two successive applies with an
    /// unchanged desired set perform zero mutating calls").
    #[serde(default)]
    pub last_applied_hash: Option<String>,
}

impl HasPhase for EndpointStatus {
    fn phase(&self) -> &str {
        self.phase.as_str()
    }

    fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

impl EndpointSpec {
    pub fn is_paused(&self) -> bool {
        self.replicas.num == 0
    }
}
