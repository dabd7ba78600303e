use serde::{Deserialize, Serialize};

use super::{Entity, HasPhase, Resource};

pub struct ModelRegistry;

impl Entity for ModelRegistry {
    const KIND: &'static str = "ModelRegistry";
    type Spec = ModelRegistrySpec;
    type Status = ModelRegistryStatus;
}

pub type ModelRegistryResource = Resource<ModelRegistry>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelRegistryType {
    Bentoml,
    HuggingFace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRegistrySpec {
    #[serde(rename = "type")]
    pub registry_type: ModelRegistryType,
    pub url: String,
    #[serde(default)]
    pub credentials: ModelRegistryCredentials,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelRegistryCredentials {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ModelRegistryPhase {
    Pending,
    Connected,
    Failed,
}

impl Default for ModelRegistryPhase {
    fn default() -> Self {
        Self::Pending
    }
}

impl ModelRegistryPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Connected => "Connected",
            Self::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelRegistryStatus {
    pub phase: ModelRegistryPhase,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl HasPhase for ModelRegistryStatus {
    fn phase(&self) -> &str {
        self.phase.as_str()
    }

    fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}
