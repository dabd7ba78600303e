//! Reconciles `ModelRegistry` objects: verifies the registry endpoint is
//! reachable with the configured credentials.

use async_trait::async_trait;

use crate::entities::model_registry::{ModelRegistry, ModelRegistryPhase, ModelRegistryStatus};
use crate::entities::Resource;
use crate::reconcile::Reconciler;

pub struct ModelRegistryController {
    http: reqwest::Client,
}

impl ModelRegistryController {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn probe(&self, obj: &Resource<ModelRegistry>) -> bool {
        let mut request = self.http.head(&obj.spec.url);
        if let Some(token) = &obj.spec.credentials.token {
            request = request.bearer_auth(token);
        } else if let Some(user) = &obj.spec.credentials.user {
            request = request.basic_auth(user, obj.spec.credentials.password.as_deref());
        }
        request
            .send()
            .await
            .map(|r| r.status().is_success() || r.status().is_redirection())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Reconciler<ModelRegistry> for ModelRegistryController {
    async fn reconcile(&self, obj: &Resource<ModelRegistry>) -> anyhow::Result<ModelRegistryStatus> {
        let mut status = obj.status.clone();

        if obj.is_deleting() {
            return Ok(status);
        }

        let reachable = self.probe(obj).await;
        status.phase = if reachable {
            ModelRegistryPhase::Connected
        } else {
            ModelRegistryPhase::Failed
        };
        status.error_message = if reachable {
            None
        } else {
            Some(format!("registry {} unreachable", obj.spec.url))
        };
        Ok(status)
    }
}
