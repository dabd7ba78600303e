//! Reconciles `ApiKey` objects: tracks expiry. The plaintext key never
//! passes through this crate (spec.md §1 Out of scope: "the authentication/
//! gateway proxy") — only the hash and an optional expiry are reconciled.

use async_trait::async_trait;
use chrono::Utc;

use crate::entities::api_key::{ApiKey, ApiKeyPhase, ApiKeyStatus};
use crate::entities::Resource;
use crate::reconcile::Reconciler;

pub struct ApiKeyController;

impl ApiKeyController {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ApiKeyController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reconciler<ApiKey> for ApiKeyController {
    async fn reconcile(&self, obj: &Resource<ApiKey>) -> anyhow::Result<ApiKeyStatus> {
        let mut status = obj.status.clone();

        if obj.is_deleting() {
            return Ok(status);
        }

        status.phase = match obj.spec.expires_at {
            Some(expires_at) if expires_at <= Utc::now() => ApiKeyPhase::Expired,
            _ => ApiKeyPhase::Created,
        };
        status.error_message = None;
        Ok(status)
    }
}
