use serde::{Deserialize, Serialize};

use super::{Entity, HasPhase, Resource};

pub struct RoleAssignment;

impl Entity for RoleAssignment {
    const KIND: &'static str = "RoleAssignment";
    type Spec = RoleAssignmentSpec;
    type Status = RoleAssignmentStatus;
}

pub type RoleAssignmentResource = Resource<RoleAssignment>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssignmentSpec {
    pub subject: String,
    pub role: String,
    #[serde(default)]
    pub workspace: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RoleAssignmentPhase {
    Pending,
    Created,
}

impl Default for RoleAssignmentPhase {
    fn default() -> Self {
        Self::Pending
    }
}

impl RoleAssignmentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Created => "Created",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleAssignmentStatus {
    pub phase: RoleAssignmentPhase,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl HasPhase for RoleAssignmentStatus {
    fn phase(&self) -> &str {
        self.phase.as_str()
    }

    fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}
