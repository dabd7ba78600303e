use serde::{Deserialize, Serialize};

use super::{Entity, HasPhase, Resource};

/// An OCI registry endpoint clusters pull images from (spec.md §3).
pub struct ImageRegistry;

impl Entity for ImageRegistry {
    const KIND: &'static str = "ImageRegistry";
    type Spec = ImageRegistrySpec;
    type Status = ImageRegistryStatus;
}

pub type ImageRegistryResource = Resource<ImageRegistry>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRegistrySpec {
    pub url: String,
    pub repository: String,
    #[serde(default)]
    pub auth: ImageRegistryAuth,
    #[serde(default)]
    pub ca: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageRegistryAuth {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ImageRegistryPhase {
    Pending,
    Connected,
    Failed,
}

impl Default for ImageRegistryPhase {
    fn default() -> Self {
        Self::Pending
    }
}

impl ImageRegistryPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Connected => "Connected",
            Self::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageRegistryStatus {
    pub phase: ImageRegistryPhase,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl HasPhase for ImageRegistryStatus {
    fn phase(&self) -> &str {
        self.phase.as_str()
    }

    fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}
