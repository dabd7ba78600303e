//! Reconciles `Workspace` objects. A workspace is the tenant label every
//! other kind's `metadata.workspace` refers to (spec.md §3 Glossary); there
//! is nothing external to provision, so reconciliation is just the
//! soft-delete lifecycle shared by every "standard" kind.

use async_trait::async_trait;

use crate::entities::workspace::{Workspace, WorkspacePhase, WorkspaceStatus};
use crate::entities::Resource;
use crate::reconcile::Reconciler;

pub struct WorkspaceController;

impl WorkspaceController {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WorkspaceController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reconciler<Workspace> for WorkspaceController {
    async fn reconcile(&self, obj: &Resource<Workspace>) -> anyhow::Result<WorkspaceStatus> {
        let mut status = obj.status.clone();

        if obj.is_deleting() {
            status.phase = WorkspacePhase::Deleted;
            return Ok(status);
        }

        status.phase = WorkspacePhase::Created;
        status.error_message = None;
        Ok(status)
    }
}
