//! Reconciles `ModelCatalog` objects: a curated listing of models exposed
//! by one `ModelRegistry`. `Created` once the backing registry is
//! `Connected` and the catalog has at least one entry; `Failed` if the
//! registry reference cannot be resolved.

use std::sync::Arc;

use async_trait::async_trait;

use crate::entities::model_catalog::{ModelCatalog, ModelCatalogPhase, ModelCatalogStatus};
use crate::entities::model_registry::{ModelRegistry, ModelRegistryPhase};
use crate::entities::{HasPhase, Resource};
use crate::reconcile::Reconciler;
use crate::storage::Storage;

pub struct ModelCatalogController {
    model_registries: Arc<dyn Storage<ModelRegistry>>,
}

impl ModelCatalogController {
    pub fn new(model_registries: Arc<dyn Storage<ModelRegistry>>) -> Self {
        Self { model_registries }
    }
}

#[async_trait]
impl Reconciler<ModelCatalog> for ModelCatalogController {
    async fn reconcile(&self, obj: &Resource<ModelCatalog>) -> anyhow::Result<ModelCatalogStatus> {
        let mut status = obj.status.clone();

        if obj.is_deleting() {
            return Ok(status);
        }

        let registry = self
            .model_registries
            .get_by_name(&obj.metadata.workspace, &obj.spec.registry)
            .await;

        status.phase = match registry {
            Ok(registry) if registry.status.phase() == ModelRegistryPhase::Connected.as_str() => {
                status.error_message = None;
                if obj.spec.entries.is_empty() {
                    ModelCatalogPhase::Pending
                } else {
                    ModelCatalogPhase::Created
                }
            }
            Ok(_) => {
                status.error_message =
                    Some(format!("model registry {} is not Connected", obj.spec.registry));
                ModelCatalogPhase::Pending
            }
            Err(e) if e.is_transient() => return Err(e.into()),
            Err(_) => {
                status.error_message =
                    Some(format!("model registry {} not found", obj.spec.registry));
                ModelCatalogPhase::Failed
            }
        };

        Ok(status)
    }
}
