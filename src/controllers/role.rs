//! Reconciles `Role` objects. Like `Engine`, a role is pure user-supplied
//! data with no external system to converge against: it is usable as soon
//! as it has at least one permission entry.

use async_trait::async_trait;

use crate::entities::role::{Role, RolePhase, RoleStatus};
use crate::entities::Resource;
use crate::reconcile::Reconciler;

pub struct RoleController;

impl RoleController {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RoleController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reconciler<Role> for RoleController {
    async fn reconcile(&self, obj: &Resource<Role>) -> anyhow::Result<RoleStatus> {
        let mut status = obj.status.clone();

        if obj.is_deleting() {
            return Ok(status);
        }

        status.phase = if obj.spec.permissions.is_empty() {
            RolePhase::Pending
        } else {
            RolePhase::Created
        };
        status.error_message = None;
        Ok(status)
    }
}
