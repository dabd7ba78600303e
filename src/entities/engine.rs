use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Entity, HasPhase, Resource};

pub struct Engine;

impl Entity for Engine {
    const KIND: &'static str = "Engine";
    type Spec = EngineSpec;
    type Status = EngineStatus;
}

pub type EngineResource = Resource<Engine>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSpec {
    pub name: String,
    #[serde(default)]
    pub versions: Vec<EngineVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineVersion {
    pub version: String,
    /// accelerator type -> image reference. A `"cpu"` entry is the fallback
    /// used when an endpoint requests no accelerator.
    #[serde(default)]
    pub images: HashMap<String, EngineImage>,
    /// orchestrator ("kubernetes") -> variant ("default") -> base64-encoded
    /// deploy template (spec.md §4.2.2).
    #[serde(default)]
    pub deploy_template: HashMap<String, HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineImage {
    pub image_name: String,
    pub tag: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EnginePhase {
    Pending,
    Created,
}

impl Default for EnginePhase {
    fn default() -> Self {
        Self::Pending
    }
}

impl EnginePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Created => "Created",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStatus {
    pub phase: EnginePhase,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl HasPhase for EngineStatus {
    fn phase(&self) -> &str {
        self.phase.as_str()
    }

    fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

impl EngineSpec {
    pub fn version(&self, version: &str) -> Option<&EngineVersion> {
        self.versions.iter().find(|v| v.version == version)
    }
}

impl EngineVersion {
    /// Resolve the image for an accelerator type, falling back to `"cpu"`.
    pub fn image_for(&self, accelerator_type: Option<&str>) -> Option<&EngineImage> {
        let key = accelerator_type.unwrap_or("cpu");
        self.images.get(key).or_else(|| self.images.get("cpu"))
    }
}
