use serde::{Deserialize, Serialize};

use super::{Entity, HasPhase, Resource};

pub struct Role;

impl Entity for Role {
    const KIND: &'static str = "Role";
    type Spec = RoleSpec;
    type Status = RoleStatus;
}

pub type RoleResource = Resource<Role>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleSpec {
    #[serde(default)]
    pub permissions: Vec<RolePermission>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePermission {
    pub resource: String,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RolePhase {
    Pending,
    Created,
}

impl Default for RolePhase {
    fn default() -> Self {
        Self::Pending
    }
}

impl RolePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Created => "Created",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleStatus {
    pub phase: RolePhase,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl HasPhase for RoleStatus {
    fn phase(&self) -> &str {
        self.phase.as_str()
    }

    fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}
