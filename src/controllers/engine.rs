//! Reconciles `Engine` objects. An engine is pure user/plugin-supplied data
//! (spec.md §4.4): there is nothing to converge against an external system,
//! only a shape check before it is considered usable by endpoints.

use async_trait::async_trait;

use crate::entities::engine::{Engine, EnginePhase, EngineStatus};
use crate::entities::Resource;
use crate::reconcile::Reconciler;

pub struct EngineController;

impl EngineController {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EngineController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reconciler<Engine> for EngineController {
    async fn reconcile(&self, obj: &Resource<Engine>) -> anyhow::Result<EngineStatus> {
        let mut status = obj.status.clone();

        if obj.is_deleting() {
            return Ok(status);
        }

        if obj.spec.versions.is_empty() {
            status.phase = EnginePhase::Pending;
            status.error_message = Some("engine has no versions defined".to_string());
        } else {
            status.phase = EnginePhase::Created;
            status.error_message = None;
        }
        Ok(status)
    }
}
