//! The Kubernetes-native orchestrator (spec.md §4.2.2): renders a
//! per-engine-version template into a manifest and converges it with
//! [`super::manifest`], deriving endpoint status from the primary
//! `Deployment`.

use async_trait::async_trait;
use base64::Engine as _;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use kube::discovery::Discovery;
use kube::{Client, ResourceExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tera::Tera;

use super::manifest;
use super::{EndpointContext, EndpointOrchestrator, Error};
use crate::entities::endpoint::{EndpointPhase, EndpointResource, EndpointStatus};
use crate::entities::model_registry::ModelRegistryType;

const COMPONENT_NAME: &str = "endpoint";
/// Pod restart-count threshold past which a CrashLoopBackOff is reported as
/// `Failed` rather than still-converging (spec.md §4.2.2 Status derivation).
const CRASH_LOOP_RESTART_THRESHOLD: i32 = 5;

pub struct KubernetesOrchestrator {
    client: Option<Client>,
}

impl KubernetesOrchestrator {
    pub fn new(client: Client) -> Self {
        Self { client: Some(client) }
    }

    /// Used in tests and anywhere dispatch logic runs without a live
    /// cluster to reconcile against.
    pub fn new_without_client() -> Self {
        Self { client: None }
    }

    fn client(&self) -> Result<&Client, Error> {
        self.client
            .as_ref()
            .ok_or_else(|| Error::Kubernetes("no kubernetes client configured".to_string()))
    }

    fn namespace<'a>(&self, ctx: &'a EndpointContext<'_>) -> &'a str {
        ctx.cluster
            .spec
            .kubernetes
            .as_ref()
            .and_then(|k| k.namespace.as_deref())
            .unwrap_or("default")
    }

    async fn render_manifest(
        &self,
        endpoint: &EndpointResource,
        ctx: &EndpointContext<'_>,
    ) -> Result<Vec<Value>, Error> {
        let engine_version = ctx
            .engine
            .spec
            .version(&endpoint.spec.engine.version)
            .ok_or_else(|| {
                Error::EngineNotReady(endpoint.spec.engine.engine.clone(), endpoint.spec.engine.version.clone())
            })?;

        let encoded_template = engine_version
            .deploy_template
            .get("kubernetes")
            .and_then(|variants| variants.get("default"))
            .ok_or(Error::NoDeployTemplate)?;

        let template = base64::engine::general_purpose::STANDARD
            .decode(encoded_template)
            .map_err(|e| Error::Template(e.to_string()))?;
        let template = String::from_utf8(template).map_err(|e| Error::Template(e.to_string()))?;

        let accelerator_key = endpoint
            .spec
            .resources
            .accelerator
            .as_ref()
            .map(|a| a.accelerator_type.as_str())
            .unwrap_or("cpu");
        let image = engine_version
            .image_for(Some(accelerator_key))
            .cloned()
            .unwrap_or_else(|| crate::entities::engine::EngineImage {
                image_name: ctx.engine.spec.name.clone(),
                tag: endpoint.spec.engine.version.clone(),
            });

        let kubernetes_resources = ctx
            .accelerators
            .convert_to_kubernetes(accelerator_key, &resource_spec_of(endpoint))
            .await?;

        let registry_type = ctx.model_registry.spec.registry_type;
        let model_path = model_cache_path(endpoint, ctx);
        let (registry_path, serve_name) = match registry_type {
            ModelRegistryType::Bentoml => (
                nfs_relative_path(endpoint),
                match &endpoint.spec.model.version {
                    Some(version) => format!("{}:{version}", endpoint.spec.model.name),
                    None => endpoint.spec.model.name.clone(),
                },
            ),
            ModelRegistryType::HuggingFace => {
                (endpoint.spec.model.name.clone(), endpoint.spec.model.name.clone())
            }
        };

        let mut env_vars: HashMap<String, String> = endpoint.spec.env.clone();
        if matches!(registry_type, ModelRegistryType::HuggingFace) {
            env_vars.insert("HF_ENDPOINT".to_string(), ctx.model_registry.spec.url.clone());
            if let Some(token) = &ctx.model_registry.spec.credentials.token {
                env_vars.insert("HF_TOKEN".to_string(), token.clone());
            }
        }
        // vLLM on pre-Ray-Serve clusters needs peer-to-peer disabled.
        if endpoint.spec.engine.engine == "vllm" {
            env_vars.entry("VLLM_SKIP_P2P_CHECK".to_string()).or_insert_with(|| "1".to_string());
        }
        if endpoint.spec.engine.engine == "llama-cpp" {
            env_vars
                .entry("INTERRUPT_REQUESTS".to_string())
                .or_insert_with(|| "false".to_string());
        }

        let mut tera_ctx = tera::Context::new();
        tera_ctx.insert("endpoint_name", &endpoint.metadata.name);
        tera_ctx.insert("cluster_name", &ctx.cluster.metadata.name);
        tera_ctx.insert("workspace", &endpoint.metadata.workspace);
        tera_ctx.insert("namespace", self.namespace(ctx));
        tera_ctx.insert("engine_name", &endpoint.spec.engine.engine);
        tera_ctx.insert("engine_version", &endpoint.spec.engine.version);
        tera_ctx.insert("replicas", &endpoint.spec.replicas.num);
        tera_ctx.insert(
            "routing_logic",
            &endpoint.spec.deployment_options.scheduler.scheduler_type,
        );
        tera_ctx.insert("image_pull_secret", &ctx.cluster.spec.image_registry);
        tera_ctx.insert("neutree_version", env!("CARGO_PKG_VERSION"));
        tera_ctx.insert("image_repo", &image.image_name);
        tera_ctx.insert("image_tag", &image.tag);
        tera_ctx.insert("model_name", &endpoint.spec.model.name);
        tera_ctx.insert("model_version", &endpoint.spec.model.version);
        tera_ctx.insert("model_file", &endpoint.spec.model.file);
        tera_ctx.insert("model_task", &endpoint.spec.model.task);
        tera_ctx.insert("model_path", &model_path);
        tera_ctx.insert("registry_type", &registry_type);
        tera_ctx.insert("registry_path", &registry_path);
        tera_ctx.insert("serve_name", &serve_name);
        tera_ctx.insert("env_vars", &env_vars);
        tera_ctx.insert("resource_requests", &kubernetes_resources.requests);
        tera_ctx.insert("resource_limits", &kubernetes_resources.limits);
        tera_ctx.insert("node_selector", &kubernetes_resources.node_selector);
        tera_ctx.insert("model_caches", &ctx.cluster.spec.model_caches);

        let rendered = Tera::one_off(&template, &tera_ctx, false)
            .map_err(|e| Error::Template(e.to_string()))?;

        serde_yaml::Deserializer::from_str(&rendered)
            .map(|doc| {
                serde_yaml::Value::deserialize(doc)
                    .map_err(|e| Error::Template(e.to_string()))
                    .and_then(|v| serde_json::to_value(v).map_err(|e| Error::Template(e.to_string())))
            })
            .filter(|r| !matches!(r, Ok(Value::Null)))
            .collect()
    }

    async fn primary_deployment(&self, endpoint: &EndpointResource, ctx: &EndpointContext<'_>) -> Result<Option<Deployment>, Error> {
        let client = self.client()?;
        let api: Api<Deployment> = Api::namespaced(client.clone(), self.namespace(ctx));
        api.get_opt(&endpoint.app_name())
            .await
            .map_err(|e| Error::Kubernetes(e.to_string()))
    }

    async fn pods_for(&self, endpoint: &EndpointResource, ctx: &EndpointContext<'_>) -> Result<Vec<Pod>, Error> {
        let client = self.client()?;
        let api: Api<Pod> = Api::namespaced(client.clone(), self.namespace(ctx));
        let list = api
            .list(&kube::api::ListParams::default().labels(&format!("app={}", endpoint.app_name())))
            .await
            .map_err(|e| Error::Kubernetes(e.to_string()))?;
        Ok(list.items)
    }

    /// spec.md §4.2.2 Status derivation.
    async fn derive_status(&self, endpoint: &EndpointResource, ctx: &EndpointContext<'_>) -> Result<EndpointStatus, Error> {
        let mut status = endpoint.status.clone();
        let deployment = self.primary_deployment(endpoint, ctx).await?;

        if endpoint.is_deleting() {
            status.phase = match deployment {
                None => EndpointPhase::Deleted,
                Some(_) => EndpointPhase::Deleting,
            };
            return Ok(status);
        }

        let deployment = match deployment {
            None => {
                status.phase = EndpointPhase::Deploying;
                return Ok(status);
            }
            Some(d) => d,
        };

        let pods = self.pods_for(endpoint, ctx).await?;
        let desired_replicas = endpoint.spec.replicas.num;

        if desired_replicas == 0 {
            status.phase = if pods.is_empty() {
                EndpointPhase::Paused
            } else {
                EndpointPhase::Deploying
            };
            return Ok(status);
        }

        let spec_status = deployment.status.clone().unwrap_or_default();
        let ready = spec_status.ready_replicas.unwrap_or(0);
        let updated = spec_status.updated_replicas.unwrap_or(0);
        if ready as u32 == desired_replicas && updated as u32 == desired_replicas {
            status.phase = EndpointPhase::Running;
            return Ok(status);
        }

        if let Some((reason, failed)) = failure_reason(&pods) {
            status.phase = if failed {
                EndpointPhase::Failed
            } else {
                EndpointPhase::Deploying
            };
            status.error_message = Some(reason);
            return Ok(status);
        }

        status.phase = EndpointPhase::Deploying;
        status.error_message = spec_status
            .conditions
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.message.unwrap_or_default())
            .filter(|m| !m.is_empty())
            .reduce(|a, b| format!("{a}; {b}"));
        Ok(status)
    }
}

fn resource_spec_of(endpoint: &EndpointResource) -> crate::accelerator::ResourceSpec {
    crate::accelerator::ResourceSpec {
        cpu: endpoint.spec.resources.cpu,
        memory_gib: endpoint.spec.resources.memory.as_deref().and_then(|m| {
            m.trim()
                .strip_suffix("Gi")
                .and_then(|v| v.trim().parse().ok())
        }),
        gpu: endpoint.spec.resources.gpu.map(|g| g as u32),
        accelerator: endpoint.spec.resources.accelerator.as_ref().map(|a| {
            crate::accelerator::AcceleratorRequest {
                accelerator_type: a.accelerator_type.clone(),
                product: a.product.clone(),
            }
        }),
        custom_resources: HashMap::new(),
    }
}

fn model_cache_path(endpoint: &EndpointResource, ctx: &EndpointContext<'_>) -> String {
    let cache_name = ctx
        .cluster
        .spec
        .model_caches
        .first()
        .map(|c| c.name.as_str())
        .unwrap_or("default");
    match &endpoint.spec.model.version {
        Some(version) => format!("/models-cache/{cache_name}/{}/{version}", endpoint.spec.model.name),
        None => format!("/models-cache/{cache_name}/{}", endpoint.spec.model.name),
    }
}

fn nfs_relative_path(endpoint: &EndpointResource) -> String {
    match &endpoint.spec.model.version {
        Some(version) => format!("{}/{version}", endpoint.spec.model.name),
        None => endpoint.spec.model.name.clone(),
    }
}

/// Inspect pod statuses for the failure signatures spec.md §4.2.2 names.
/// Returns `(message, is_terminal_failure)`.
fn failure_reason(pods: &[Pod]) -> Option<(String, bool)> {
    for pod in pods {
        let status = pod.status.as_ref()?;
        if let Some(reason) = &status.reason {
            if reason == "Unschedulable" {
                return Some((format!("pod {} unschedulable", pod.name_any()), true));
            }
        }
        for cs in status.container_statuses.iter().flatten() {
            if let Some(waiting) = cs.state.as_ref().and_then(|s| s.waiting.as_ref()) {
                if waiting.reason.as_deref() == Some("ImagePullBackOff") {
                    return Some((
                        format!("pod {} image pull failed: {:?}", pod.name_any(), waiting.message),
                        true,
                    ));
                }
                if waiting.reason.as_deref() == Some("CrashLoopBackOff") {
                    let restarts = cs.restart_count;
                    return Some((
                        format!("pod {} crash looping (restarts={restarts})", pod.name_any()),
                        restarts > CRASH_LOOP_RESTART_THRESHOLD,
                    ));
                }
            }
            if let Some(terminated) = cs.state.as_ref().and_then(|s| s.terminated.as_ref()) {
                if terminated.reason.as_deref() == Some("OOMKilled") {
                    return Some((format!("pod {} OOMKilled", pod.name_any()), true));
                }
            }
        }
    }
    None
}

#[async_trait]
impl EndpointOrchestrator for KubernetesOrchestrator {
    fn name(&self) -> &'static str {
        "kubernetes-native"
    }

    async fn create_endpoint(
        &self,
        endpoint: &EndpointResource,
        ctx: &EndpointContext<'_>,
    ) -> Result<EndpointStatus, Error> {
        let client = self.client()?;
        let objects_json = self.render_manifest(endpoint, ctx).await?;
        let objects = objects_json
            .into_iter()
            .map(manifest::from_value)
            .collect::<Result<Vec<_>, _>>()?;

        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .map_err(|e| Error::Kubernetes(e.to_string()))?;

        manifest::apply(
            client,
            &discovery,
            self.namespace(ctx),
            &endpoint.app_name(),
            COMPONENT_NAME,
            objects,
        )
        .await?;

        self.derive_status(endpoint, ctx).await
    }

    async fn delete_endpoint(
        &self,
        endpoint: &EndpointResource,
        ctx: &EndpointContext<'_>,
    ) -> Result<EndpointStatus, Error> {
        let client = self.client()?;
        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .map_err(|e| Error::Kubernetes(e.to_string()))?;

        let finished = manifest::delete(
            client,
            &discovery,
            self.namespace(ctx),
            &endpoint.app_name(),
            COMPONENT_NAME,
        )
        .await?;

        let mut status = endpoint.status.clone();
        status.phase = if !finished {
            EndpointPhase::Deleting
        } else if endpoint.is_deleting() {
            EndpointPhase::Deleted
        } else {
            EndpointPhase::Paused
        };
        Ok(status)
    }

    async fn get_endpoint_status(
        &self,
        endpoint: &EndpointResource,
        ctx: &EndpointContext<'_>,
    ) -> Result<EndpointStatus, Error> {
        self.derive_status(endpoint, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accelerator::AcceleratorManager;
    use crate::entities::cluster::{ClusterSpec, ClusterType};
    use crate::entities::endpoint::{EndpointEngineRef, EndpointModelRef, EndpointReplicas, EndpointSpec};
    use crate::entities::engine::EngineSpec;
    use crate::entities::model_registry::{ModelRegistryCredentials, ModelRegistrySpec, ModelRegistryType};
    use crate::entities::Metadata;
    use crate::entities::Resource;

    fn sample_endpoint() -> crate::entities::endpoint::EndpointResource {
        Resource::new(
            uuid::Uuid::new_v4(),
            Metadata::new("prod", "ep1"),
            EndpointSpec {
                cluster: "c1".into(),
                engine: EndpointEngineRef {
                    engine: "vllm".into(),
                    version: "0.5".into(),
                },
                model: EndpointModelRef {
                    registry: "r1".into(),
                    name: "model-a".into(),
                    version: None,
                    file: None,
                    task: None,
                },
                resources: Default::default(),
                replicas: EndpointReplicas { num: 1 },
                deployment_options: Default::default(),
                variables: Default::default(),
                env: Default::default(),
            },
        )
    }

    #[tokio::test]
    async fn model_path_falls_back_to_default_cache_name() {
        let cluster = Resource::<crate::entities::cluster::Cluster>::new(
            uuid::Uuid::new_v4(),
            Metadata::new("prod", "c1"),
            ClusterSpec {
                cluster_type: ClusterType::Kubernetes,
                version: "1".into(),
                image_registry: "reg".into(),
                ssh: None,
                kubernetes: None,
                model_caches: vec![],
            },
        );
        let engine = Resource::<crate::entities::engine::Engine>::new(
            uuid::Uuid::new_v4(),
            Metadata::new("prod", "vllm"),
            EngineSpec {
                name: "vllm".into(),
                versions: vec![],
            },
        );
        let model_registry = Resource::<crate::entities::model_registry::ModelRegistry>::new(
            uuid::Uuid::new_v4(),
            Metadata::new("prod", "r1"),
            ModelRegistrySpec {
                registry_type: ModelRegistryType::HuggingFace,
                url: "https://huggingface.co".into(),
                credentials: ModelRegistryCredentials::default(),
            },
        );
        let accelerators = AcceleratorManager::new(vec![]).await;
        let endpoint = sample_endpoint();

        let ctx = EndpointContext {
            cluster: &cluster,
            engine: &engine,
            model_registry: &model_registry,
            accelerators: &accelerators,
        };

        let path = model_cache_path(&endpoint, &ctx);
        assert_eq!(path, "/models-cache/default/model-a");
    }
}
