use serde::{Deserialize, Serialize};

use super::{Entity, HasPhase, Resource};

pub struct Workspace;

impl Entity for Workspace {
    const KIND: &'static str = "Workspace";
    type Spec = WorkspaceSpec;
    type Status = WorkspaceStatus;
}

pub type WorkspaceResource = Resource<Workspace>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceSpec {
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum WorkspacePhase {
    Pending,
    Created,
    Deleting,
    Deleted,
}

impl Default for WorkspacePhase {
    fn default() -> Self {
        Self::Pending
    }
}

impl WorkspacePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Created => "Created",
            Self::Deleting => "Deleting",
            Self::Deleted => "Deleted",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceStatus {
    pub phase: WorkspacePhase,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl HasPhase for WorkspaceStatus {
    fn phase(&self) -> &str {
        self.phase.as_str()
    }

    fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}
