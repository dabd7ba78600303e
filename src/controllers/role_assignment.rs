//! Reconciles `RoleAssignment` objects: validates the referenced `Role`
//! exists and is `Created` in the same workspace before marking the
//! assignment usable (spec.md §3 Invariants: "referential validity at
//! deploy time" generalised to every cross-kind reference, not just
//! Endpoint's).

use std::sync::Arc;

use async_trait::async_trait;

use crate::entities::role::{Role, RolePhase};
use crate::entities::role_assignment::{RoleAssignment, RoleAssignmentPhase, RoleAssignmentStatus};
use crate::entities::{HasPhase, Resource};
use crate::reconcile::Reconciler;
use crate::storage::Storage;

pub struct RoleAssignmentController {
    roles: Arc<dyn Storage<Role>>,
}

impl RoleAssignmentController {
    pub fn new(roles: Arc<dyn Storage<Role>>) -> Self {
        Self { roles }
    }
}

#[async_trait]
impl Reconciler<RoleAssignment> for RoleAssignmentController {
    async fn reconcile(
        &self,
        obj: &Resource<RoleAssignment>,
    ) -> anyhow::Result<RoleAssignmentStatus> {
        let mut status = obj.status.clone();

        if obj.is_deleting() {
            return Ok(status);
        }

        let role = self
            .roles
            .get_by_name(&obj.metadata.workspace, &obj.spec.role)
            .await;

        status.phase = match role {
            Ok(role) if role.status.phase() == RolePhase::Created.as_str() => {
                status.error_message = None;
                RoleAssignmentPhase::Created
            }
            Ok(_) => {
                status.error_message = Some(format!("role {} is not yet Created", obj.spec.role));
                RoleAssignmentPhase::Pending
            }
            Err(e) if e.is_transient() => return Err(e.into()),
            Err(_) => {
                status.error_message = Some(format!("role {} not found", obj.spec.role));
                RoleAssignmentPhase::Pending
            }
        };

        Ok(status)
    }
}
