//! Reconciles `ImageRegistry` objects (spec.md §3): verifies the registry
//! endpoint is reachable and protects it from deletion while any `Cluster`
//! still references it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::entities::cluster::Cluster;
use crate::entities::image_registry::{ImageRegistry, ImageRegistryPhase, ImageRegistryStatus};
use crate::entities::{Entity, Resource};
use crate::reconcile::Reconciler;
use crate::storage::{Filter, ListOptions, Storage};

use super::finalizer_name;

pub struct ImageRegistryController {
    storage: Arc<dyn Storage<ImageRegistry>>,
    clusters: Arc<dyn Storage<Cluster>>,
    http: reqwest::Client,
}

impl ImageRegistryController {
    pub fn new(
        storage: Arc<dyn Storage<ImageRegistry>>,
        clusters: Arc<dyn Storage<Cluster>>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            storage,
            clusters,
            http,
        }
    }

    async fn referenced_by_any_cluster(&self, registry_name: &str, workspace: &str) -> anyhow::Result<bool> {
        let clusters = self
            .clusters
            .list(&ListOptions::new().filter(Filter::eq("metadata->workspace", workspace)))
            .await?;
        Ok(clusters.iter().any(|c| c.spec.image_registry == registry_name))
    }

    async fn probe(&self, url: &str) -> bool {
        self.http
            .head(url)
            .send()
            .await
            .map(|r| r.status().is_success() || r.status().is_redirection())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Reconciler<ImageRegistry> for ImageRegistryController {
    async fn reconcile(
        &self,
        obj: &Resource<ImageRegistry>,
    ) -> anyhow::Result<ImageRegistryStatus> {
        let mut status = obj.status.clone();
        let finalizer = finalizer_name(ImageRegistry::KIND);

        if obj.is_deleting() {
            if self
                .referenced_by_any_cluster(&obj.metadata.name, &obj.metadata.workspace)
                .await?
            {
                debug!(registry = %obj.metadata.name, "image registry still referenced, deferring deletion");
                return Ok(status);
            }
            if obj.metadata.finalizers.contains(&finalizer) {
                let mut updated = obj.clone();
                updated.metadata.finalizers.retain(|f| f != &finalizer);
                self.storage.update(&updated).await?;
            }
            // No Deleted phase for this kind: once the finalizer clears,
            // the API layer hard-deletes the row.
            return Ok(status);
        }

        if !obj.metadata.finalizers.contains(&finalizer) {
            let mut updated = obj.clone();
            updated.metadata.finalizers.push(finalizer);
            self.storage.update(&updated).await?;
        }

        let reachable = self.probe(&obj.spec.url).await;
        status.phase = if reachable {
            ImageRegistryPhase::Connected
        } else {
            ImageRegistryPhase::Failed
        };
        status.error_message = if reachable {
            None
        } else {
            Some(format!("registry {} unreachable", obj.spec.url))
        };
        Ok(status)
    }
}
