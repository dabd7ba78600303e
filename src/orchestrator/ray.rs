//! The Ray Serve orchestrator (spec.md §4.2.1): converges an Endpoint onto
//! a Ray Serve application by reading/writing the cluster's Ray dashboard
//! `/api/serve/applications` list.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, info};

use super::{EndpointContext, EndpointOrchestrator, Error};
use crate::accelerator::ResourceSpec;
use crate::entities::endpoint::{EndpointPhase, EndpointResource, EndpointStatus};
use crate::entities::model_registry::ModelRegistryType;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RayServeApplication {
    pub name: String,
    pub route_prefix: String,
    pub import_path: String,
    pub args: Map<String, Value>,
    pub runtime_env: RuntimeEnv,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuntimeEnv {
    pub env_vars: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ServeApplicationEntry {
    name: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    deployed_app_config: Option<Value>,
    /// Proxy health for this app's route, when the dashboard reports it
    /// inline; absent on older Ray versions (status then comes from the
    /// separate `/api/cluster_status` proxies block, which this client
    /// treats as "unknown" rather than polling a second endpoint per call).
    #[serde(default)]
    proxy_status: Option<String>,
}

#[derive(Debug, Serialize)]
struct ServeApplicationsPayload {
    applications: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ServeApplicationsResponse {
    #[serde(default)]
    applications: Vec<ServeApplicationEntry>,
}

pub struct RayServeOrchestrator {
    client: reqwest::Client,
}

impl RayServeOrchestrator {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn dashboard_url(ctx: &EndpointContext<'_>) -> Result<&str, Error> {
        ctx.cluster
            .status
            .dashboard_url
            .as_deref()
            .ok_or(Error::ClusterNotReady)
    }

    async fn list_applications(&self, dashboard_url: &str) -> Result<Vec<ServeApplicationEntry>, Error> {
        let response = self
            .client
            .get(format!("{}/api/serve/applications", dashboard_url.trim_end_matches('/')))
            .send()
            .await
            .map_err(|e| Error::RayTransport(e.to_string()))?;
        let parsed: ServeApplicationsResponse = response
            .json()
            .await
            .map_err(|e| Error::RayTransport(e.to_string()))?;
        Ok(parsed.applications)
    }

    async fn put_applications(&self, dashboard_url: &str, apps: Vec<Value>) -> Result<(), Error> {
        let response = self
            .client
            .put(format!("{}/api/serve/applications", dashboard_url.trim_end_matches('/')))
            .json(&ServeApplicationsPayload { applications: apps })
            .send()
            .await
            .map_err(|e| Error::RayTransport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::RayTransport(format!(
                "PUT /api/serve/applications returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Build the desired application per spec.md §4.2.1's naming, import
    /// path, args, and runtime-env rules.
    async fn build_desired(
        &self,
        endpoint: &EndpointResource,
        ctx: &EndpointContext<'_>,
    ) -> Result<RayServeApplication, Error> {
        let name = endpoint.app_name();
        let route_prefix = format!("/{}/{}", endpoint.metadata.workspace, endpoint.metadata.name);

        let engine_module = endpoint.spec.engine.engine.replace('-', "_");
        let version_module = endpoint.spec.engine.version.replace('.', "_");
        let import_path = format!("serve.{engine_module}.{version_module}.app:app_builder");

        let engine_version = ctx
            .engine
            .spec
            .version(&endpoint.spec.engine.version)
            .ok_or_else(|| {
                Error::EngineNotReady(endpoint.spec.engine.engine.clone(), endpoint.spec.engine.version.clone())
            })?;
        let _ = engine_version;

        let accelerator_type = endpoint
            .spec
            .resources
            .accelerator
            .as_ref()
            .map(|a| a.accelerator_type.as_str());

        let resource_spec = ResourceSpec {
            cpu: endpoint.spec.resources.cpu,
            memory_gib: endpoint
                .spec
                .resources
                .memory
                .as_deref()
                .and_then(parse_gib),
            gpu: endpoint.spec.resources.gpu.map(|g| g as u32),
            accelerator: endpoint.spec.resources.accelerator.as_ref().map(|a| {
                crate::accelerator::AcceleratorRequest {
                    accelerator_type: a.accelerator_type.clone(),
                    product: a.product.clone(),
                }
            }),
            custom_resources: HashMap::new(),
        };

        let ray_resources = ctx
            .accelerators
            .convert_to_ray(accelerator_type.unwrap_or("cpu"), &resource_spec)
            .await?;

        let mut backend_args = Map::new();
        backend_args.insert("num_replicas".into(), endpoint.spec.replicas.num.into());
        if let Some(num_cpus) = ray_resources.num_cpus {
            backend_args.insert("num_cpus".into(), serde_json::json!(num_cpus));
        }
        if let Some(memory) = ray_resources.memory {
            backend_args.insert("memory".into(), serde_json::json!(memory));
        }
        if let Some(num_gpus) = ray_resources.num_gpus {
            backend_args.insert("num_gpus".into(), serde_json::json!(num_gpus));
        }
        if !ray_resources.resources.is_empty() {
            backend_args.insert("resources".into(), serde_json::json!(ray_resources.resources));
        }

        // Fixed small controller resource footprint (spec.md §4.2.1).
        let mut controller_args = Map::new();
        controller_args.insert("num_cpus".into(), serde_json::json!(0.1));

        let registry_type = ctx.model_registry.spec.registry_type;
        let version_suffix = match (registry_type, &endpoint.spec.model.version) {
            (ModelRegistryType::HuggingFace, _) => String::new(),
            (_, Some(version)) => format!(":{version}"),
            (_, None) => String::new(),
        };
        let serve_name = format!("{}{}", endpoint.spec.model.name, version_suffix);

        let registry_path = match registry_type {
            ModelRegistryType::Bentoml => format!(
                "{}{}",
                endpoint.spec.model.name,
                endpoint
                    .spec
                    .model
                    .version
                    .as_deref()
                    .map(|v| format!("/{v}"))
                    .unwrap_or_default()
            ),
            ModelRegistryType::HuggingFace => endpoint.spec.model.name.clone(),
        };

        let mut model_args = Map::new();
        model_args.insert("registry_type".into(), serde_json::json!(registry_type));
        model_args.insert("name".into(), endpoint.spec.model.name.clone().into());
        if let Some(file) = &endpoint.spec.model.file {
            model_args.insert("file".into(), file.clone().into());
        }
        if let Some(version) = &endpoint.spec.model.version {
            model_args.insert("version".into(), version.clone().into());
        }
        if let Some(task) = &endpoint.spec.model.task {
            model_args.insert("task".into(), serde_json::json!(task));
        }
        model_args.insert("serve_name".into(), serve_name.into());
        model_args.insert("registry_path".into(), registry_path.into());

        let mut args = endpoint.spec.deployment_options.extra.clone();
        args.insert("backend".into(), Value::Object(backend_args));
        args.insert("controller".into(), Value::Object(controller_args));
        args.insert("model".into(), Value::Object(model_args));

        // BentoML scheduler alias: roundrobin -> pow2 (spec.md §4.2.1).
        if matches!(registry_type, ModelRegistryType::Bentoml)
            && endpoint.spec.deployment_options.scheduler.scheduler_type == "roundrobin"
        {
            args.insert("scheduler".into(), serde_json::json!({"type": "pow2"}));
        }

        let mut env_vars = endpoint.spec.env.clone();
        match registry_type {
            ModelRegistryType::HuggingFace => {
                env_vars.insert("HF_ENDPOINT".into(), ctx.model_registry.spec.url.clone());
                if let Some(token) = &ctx.model_registry.spec.credentials.token {
                    env_vars.insert("HF_TOKEN".into(), token.clone());
                }
            }
            ModelRegistryType::Bentoml => {
                env_vars.insert("BENTOML_HOME".into(), "/mnt/bentoml".into());
            }
        }

        Ok(RayServeApplication {
            name,
            route_prefix,
            import_path,
            args,
            runtime_env: RuntimeEnv { env_vars },
        })
    }
}

fn parse_gib(memory: &str) -> Option<f64> {
    let trimmed = memory.trim();
    if let Some(value) = trimmed.strip_suffix("Gi") {
        value.trim().parse().ok()
    } else if let Some(value) = trimmed.strip_suffix("Mi") {
        value.trim().parse::<f64>().ok().map(|mi| mi / 1024.0)
    } else {
        trimmed.parse().ok()
    }
}

/// Canonical JSON equality (spec.md §4.2.1: "Compare ... by canonical JSON
/// equality"): compares two values up to key ordering inside objects.
fn canonical_eq(a: &Value, b: &Value) -> bool {
    canonicalize(a) == canonicalize(b)
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> =
                map.iter().map(|(k, v)| (k.clone(), canonicalize(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, v);
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[async_trait]
impl EndpointOrchestrator for RayServeOrchestrator {
    fn name(&self) -> &'static str {
        "ray-serve"
    }

    async fn create_endpoint(
        &self,
        endpoint: &EndpointResource,
        ctx: &EndpointContext<'_>,
    ) -> Result<EndpointStatus, Error> {
        if endpoint.spec.is_paused() {
            return self.delete_endpoint(endpoint, ctx).await;
        }

        let dashboard_url = Self::dashboard_url(ctx)?.to_string();
        let desired = self.build_desired(endpoint, ctx).await?;
        let desired_value =
            serde_json::to_value(&desired).map_err(|e| Error::RayTransport(e.to_string()))?;

        let existing = self.list_applications(&dashboard_url).await?;
        let current_config = existing
            .iter()
            .find(|e| e.name == desired.name)
            .and_then(|e| e.deployed_app_config.clone());

        let unchanged = current_config
            .as_ref()
            .map(|c| canonical_eq(c, &desired_value))
            .unwrap_or(false);

        if !unchanged {
            let mut updated: Vec<Value> = existing
                .into_iter()
                .filter(|e| e.name != desired.name)
                .filter_map(|e| e.deployed_app_config)
                .collect();
            updated.push(desired_value);
            self.put_applications(&dashboard_url, updated).await?;
            info!(endpoint = %desired.name, "applied ray serve application");
        }

        self.get_endpoint_status(endpoint, ctx).await
    }

    async fn delete_endpoint(
        &self,
        endpoint: &EndpointResource,
        ctx: &EndpointContext<'_>,
    ) -> Result<EndpointStatus, Error> {
        let dashboard_url = Self::dashboard_url(ctx)?;
        let name = endpoint.app_name();
        let existing = self.list_applications(dashboard_url).await?;
        let still_present = existing.iter().any(|e| e.name == name);

        if still_present {
            let remaining: Vec<Value> = existing
                .into_iter()
                .filter(|e| e.name != name)
                .filter_map(|e| e.deployed_app_config)
                .collect();
            self.put_applications(dashboard_url, remaining).await?;
            debug!(endpoint = %name, "removed ray serve application");
        }

        let mut status = endpoint.status.clone();
        status.phase = if endpoint.is_deleting() {
            if still_present {
                EndpointPhase::Deleting
            } else {
                EndpointPhase::Deleted
            }
        } else if still_present {
            EndpointPhase::Deploying
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
        let dashboard_url = Self::dashboard_url(ctx)?;
        let name = endpoint.app_name();
        let apps = self.list_applications(dashboard_url).await?;
        let entry = apps.iter().find(|e| e.name == name);

        let mut status = endpoint.status.clone();
        status.phase = match entry {
            None if endpoint.is_deleting() => EndpointPhase::Deleted,
            None => EndpointPhase::Deploying,
            Some(e) => match e.status.as_deref() {
                Some("RUNNING") if e.proxy_status.as_deref() != Some("UNHEALTHY") => {
                    EndpointPhase::Running
                }
                Some("DEPLOY_FAILED") | Some("UNHEALTHY") => EndpointPhase::Failed,
                _ if endpoint.is_deleting() => EndpointPhase::Deleting,
                _ => EndpointPhase::Deploying,
            },
        };
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_eq_ignores_key_order() {
        let a = serde_json::json!({"a": 1, "b": {"c": 2, "d": 3}});
        let b = serde_json::json!({"b": {"d": 3, "c": 2}, "a": 1});
        assert!(canonical_eq(&a, &b));
    }

    #[test]
    fn canonical_eq_detects_value_change() {
        let a = serde_json::json!({"a": 1});
        let b = serde_json::json!({"a": 2});
        assert!(!canonical_eq(&a, &b));
    }

    #[test]
    fn parse_gib_handles_gi_and_mi_suffixes() {
        assert_eq!(parse_gib("4Gi"), Some(4.0));
        assert_eq!(parse_gib("512Mi"), Some(0.5));
    }
}
