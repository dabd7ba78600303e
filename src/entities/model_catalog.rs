use serde::{Deserialize, Serialize};

use super::{Entity, HasPhase, Resource};

/// A curated, browsable listing of models available across the registries
/// configured in a workspace.
pub struct ModelCatalog;

impl Entity for ModelCatalog {
    const KIND: &'static str = "ModelCatalog";
    type Spec = ModelCatalogSpec;
    type Status = ModelCatalogStatus;
}

pub type ModelCatalogResource = Resource<ModelCatalog>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCatalogSpec {
    pub registry: String,
    #[serde(default)]
    pub entries: Vec<ModelCatalogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCatalogEntry {
    pub name: String,
    #[serde(default)]
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ModelCatalogPhase {
    Pending,
    Created,
    Failed,
}

impl Default for ModelCatalogPhase {
    fn default() -> Self {
        Self::Pending
    }
}

impl ModelCatalogPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Created => "Created",
            Self::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelCatalogStatus {
    pub phase: ModelCatalogPhase,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl HasPhase for ModelCatalogStatus {
    fn phase(&self) -> &str {
        self.phase.as_str()
    }

    fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}
