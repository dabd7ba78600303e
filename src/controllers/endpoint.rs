//! Reconciles `Endpoint` objects (spec.md §4.2): resolves the endpoint's
//! dependencies, dispatches to the selected [`EndpointOrchestrator`], and
//! maps validation failures onto `Failed` rather than retrying forever.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::accelerator::AcceleratorManager;
use crate::entities::cluster::{Cluster, ClusterPhase};
use crate::entities::endpoint::{Endpoint, EndpointPhase, EndpointResource, EndpointStatus};
use crate::entities::engine::Engine;
use crate::entities::model_registry::{ModelRegistry, ModelRegistryPhase};
use crate::entities::{Entity, HasPhase};
use crate::orchestrator::{self, kubernetes::KubernetesOrchestrator, ray::RayServeOrchestrator, EndpointContext};
use crate::reconcile::Reconciler;
use crate::storage::Storage;

use super::finalizer_name;

pub struct EndpointController {
    storage: Arc<dyn Storage<Endpoint>>,
    clusters: Arc<dyn Storage<Cluster>>,
    engines: Arc<dyn Storage<Engine>>,
    model_registries: Arc<dyn Storage<ModelRegistry>>,
    accelerators: Arc<AcceleratorManager>,
    ray: RayServeOrchestrator,
    kubernetes: KubernetesOrchestrator,
}

impl EndpointController {
    pub fn new(
        storage: Arc<dyn Storage<Endpoint>>,
        clusters: Arc<dyn Storage<Cluster>>,
        engines: Arc<dyn Storage<Engine>>,
        model_registries: Arc<dyn Storage<ModelRegistry>>,
        accelerators: Arc<AcceleratorManager>,
        ray: RayServeOrchestrator,
        kubernetes: KubernetesOrchestrator,
    ) -> Self {
        Self {
            storage,
            clusters,
            engines,
            model_registries,
            accelerators,
            ray,
            kubernetes,
        }
    }

    /// Resolve cluster/engine/model-registry and validate them per spec.md
    /// §3 Invariants ("Referential validity at deploy time"). Returns
    /// `Err` only for the *precheck* errors that should surface as
    /// `Failed` immediately — Storage transport failures are bubbled up
    /// through `?` and turned into a framework retry by the caller.
    async fn resolve(
        &self,
        obj: &EndpointResource,
    ) -> anyhow::Result<Result<ResolvedContext, String>> {
        let cluster = match self
            .clusters
            .get_by_name(&obj.metadata.workspace, &obj.spec.cluster)
            .await
        {
            Ok(c) => c,
            Err(e) if e.is_transient() => return Err(e.into()),
            Err(_) => return Ok(Err(format!("cluster {} not found", obj.spec.cluster))),
        };
        if cluster.status.phase != ClusterPhase::Running || !cluster.status.initialized {
            return Ok(Err(format!(
                "cluster {} is not Running",
                obj.spec.cluster
            )));
        }

        let engine = match self
            .engines
            .get_by_name(&obj.metadata.workspace, &obj.spec.engine.engine)
            .await
        {
            Ok(e) => e,
            Err(e) if e.is_transient() => return Err(e.into()),
            Err(_) => {
                return Ok(Err(format!(
                    "engine {} not found",
                    obj.spec.engine.engine
                )))
            }
        };
        if engine.status.phase() != "Created" || engine.spec.version(&obj.spec.engine.version).is_none() {
            return Ok(Err(format!(
                "engine {}@{} is not ready",
                obj.spec.engine.engine, obj.spec.engine.version
            )));
        }

        let model_registry = match self
            .model_registries
            .get_by_name(&obj.metadata.workspace, &obj.spec.model.registry)
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_transient() => return Err(e.into()),
            Err(_) => {
                return Ok(Err(format!(
                    "model registry {} not found",
                    obj.spec.model.registry
                )))
            }
        };
        if model_registry.status.phase != ModelRegistryPhase::Connected {
            return Ok(Err(format!(
                "model registry {} is not Connected",
                obj.spec.model.registry
            )));
        }

        Ok(Ok(ResolvedContext {
            cluster,
            engine,
            model_registry,
        }))
    }
}

struct ResolvedContext {
    cluster: crate::entities::cluster::ClusterResource,
    engine: crate::entities::engine::EngineResource,
    model_registry: crate::entities::model_registry::ModelRegistryResource,
}

#[async_trait]
impl Reconciler<Endpoint> for EndpointController {
    async fn reconcile(&self, obj: &EndpointResource) -> anyhow::Result<EndpointStatus> {
        let mut status = obj.status.clone();
        let finalizer = finalizer_name(Endpoint::KIND);

        let resolved = match self.resolve(obj).await? {
            Ok(resolved) => resolved,
            Err(message) => {
                if obj.is_deleting() {
                    // The endpoint's own dependencies disappeared before it
                    // could be torn down: nothing left to converge against,
                    // so deletion succeeds unconditionally (spec.md §8
                    // Scenario 5: "soft-delete with missing cluster").
                    debug!(endpoint = %obj.metadata.name, "dependency missing during delete, treating as deleted");
                    status.phase = EndpointPhase::Deleted;
                    return Ok(status);
                }
                status.phase = EndpointPhase::Failed;
                status.error_message = Some(message);
                return Ok(status);
            }
        };

        let ctx = EndpointContext {
            cluster: &resolved.cluster,
            engine: &resolved.engine,
            model_registry: &resolved.model_registry,
            accelerators: &self.accelerators,
        };
        let target = orchestrator::select(&resolved.cluster, &self.ray, &self.kubernetes)?;

        if obj.is_deleting() {
            status.phase = EndpointPhase::Deleting;
            let outcome = target.delete_endpoint(obj, &ctx).await;
            let outcome = match outcome {
                Ok(s) => s,
                Err(e) if e.is_validation() => {
                    status.phase = EndpointPhase::Deleted;
                    status.error_message = None;
                    return Ok(status);
                }
                Err(e) => return Err(e.into()),
            };
            status = outcome;
            if status.phase == EndpointPhase::Deleted && obj.metadata.finalizers.contains(&finalizer) {
                let mut updated = obj.clone();
                updated.metadata.finalizers.retain(|f| f != &finalizer);
                self.storage.update(&updated).await?;
            }
            return Ok(status);
        }

        if !obj.metadata.finalizers.contains(&finalizer) {
            let mut updated = obj.clone();
            updated.metadata.finalizers.push(finalizer);
            self.storage.update(&updated).await?;
        }

        let outcome = target.create_endpoint(obj, &ctx).await;
        match outcome {
            Ok(s) => Ok(s),
            Err(e) if e.is_validation() => {
                status.phase = EndpointPhase::Failed;
                status.error_message = Some(e.to_string());
                Ok(status)
            }
            Err(e) => Err(e.into()),
        }
    }
}
