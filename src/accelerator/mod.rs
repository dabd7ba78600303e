//! The accelerator plugin registry (spec.md §4.3): a dynamic map of
//! per-accelerator plugins, liveness tracking, resource-spec conversion to
//! Ray and Kubernetes resource fragments, and aggregation of per-plugin
//! engine catalogs.
//!
//! Grounded in the teacher's `auth::jwt` concurrent cache (`Arc<RwLock<HashMap<...>>>`
//! guarding a liveness-checked entry set) and `registry::RegistryProvider`
//! (an async trait implemented by both a built-in and a remote variant).

pub mod cpu;
pub mod engine_registry;
pub mod remote;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use engine_registry::{Engine, EngineRegistry};

#[derive(Debug, Error)]
pub enum Error {
    #[error("no accelerator plugin registered for resource {0:?}")]
    UnknownResource(String),
    #[error("plugin ping failed: {0}")]
    Unreachable(String),
    #[error("plugin request failed: {0}")]
    Transport(String),
}

/// A node's requested compute shape (spec.md §4.3 Conversion), independent
/// of target orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub cpu: Option<f64>,
    /// Memory, in GiB.
    pub memory_gib: Option<f64>,
    pub gpu: Option<u32>,
    pub accelerator: Option<AcceleratorRequest>,
    #[serde(default)]
    pub custom_resources: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceleratorRequest {
    #[serde(rename = "type")]
    pub accelerator_type: String,
    pub product: Option<String>,
}

/// Ray Serve's `ray_actor_options.resources` shape.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RayResources {
    pub num_cpus: Option<f64>,
    /// Bytes (`memory_gib * 2^30`).
    pub memory: Option<u64>,
    pub num_gpus: Option<u32>,
    pub resources: HashMap<String, f64>,
}

/// A Kubernetes `PodSpec.resources` + `nodeSelector` fragment.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KubernetesResources {
    pub requests: HashMap<String, String>,
    pub limits: HashMap<String, String>,
    pub node_selector: HashMap<String, String>,
}

/// SSH credentials used to probe a bare-metal node; opaque to this crate
/// beyond being handed to a plugin's `get_node_*` calls.
#[derive(Debug, Clone)]
pub struct SshAuth {
    pub user: String,
    pub private_key_pem: String,
}

/// A single discovered accelerator on a probed node.
#[derive(Debug, Clone)]
pub struct NodeAccelerator {
    pub product: String,
    pub count: u32,
}

/// Implemented once per accelerator vendor (built-in `cpu`, or a remote
/// plugin reached over HTTP). Registered into an [`AcceleratorManager`]
/// under a `resource_name` such as `"nvidia.com/gpu"`.
#[async_trait]
pub trait AcceleratorPlugin: Send + Sync {
    /// The resource name this plugin answers for, e.g. `"nvidia.com/gpu"`.
    fn resource_name(&self) -> &str;

    /// `true` for plugins constructed in-process (spec.md §4.3: "Built-in
    /// (local) plugins are registered at construction" and are exempt from
    /// the liveness ticker).
    fn is_local(&self) -> bool {
        false
    }

    async fn ping(&self) -> Result<(), Error>;

    /// Probe a node over SSH; an empty vec means "no accelerators of this
    /// vendor found".
    async fn get_node_accelerator_type(
        &self,
        node_ip: &str,
        ssh_auth: &SshAuth,
    ) -> Result<Vec<NodeAccelerator>, Error>;

    /// Vendor-specific runtime setup info (driver version, device paths...)
    /// to thread into a Ray/Kubernetes worker launch.
    async fn get_node_runtime_config(
        &self,
        node_ip: &str,
        ssh_auth: &SshAuth,
    ) -> Result<HashMap<String, String>, Error>;

    fn convert_to_ray(&self, spec: &ResourceSpec) -> RayResources;
    fn convert_to_kubernetes(&self, spec: &ResourceSpec) -> KubernetesResources;

    /// Engines this plugin's vendor provides optimized images/templates for,
    /// merged into the manager's aggregate catalog (spec.md §4.4).
    async fn supported_engines(&self) -> Vec<Engine>;
}

struct Entry {
    plugin: Arc<dyn AcceleratorPlugin>,
    last_register_time: tokio::time::Instant,
}

const LIVENESS_STALE_AFTER: Duration = Duration::from_secs(120);
const LIVENESS_TICK: Duration = Duration::from_secs(60);

/// Registry of accelerator plugins plus the aggregated engine catalog they
/// report (spec.md §4.3, §4.4).
pub struct AcceleratorManager {
    entries: RwLock<HashMap<String, Entry>>,
    catalog: RwLock<EngineRegistry>,
}

impl AcceleratorManager {
    /// Construct with the built-in plugins already registered (spec.md
    /// §4.3: "Built-in (local) plugins are registered at construction").
    pub async fn new(builtins: Vec<Arc<dyn AcceleratorPlugin>>) -> Arc<Self> {
        let manager = Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            catalog: RwLock::new(EngineRegistry::new()),
        });
        for plugin in builtins {
            manager.register(plugin).await;
        }
        manager
    }

    /// Register (or re-register) a plugin. Re-registration refreshes
    /// `last_register_time` and re-harvests its engine list.
    pub async fn register(&self, plugin: Arc<dyn AcceleratorPlugin>) {
        let resource_name = plugin.resource_name().to_string();
        let engines = plugin.supported_engines().await;

        {
            let mut entries = self.entries.write().await;
            entries.insert(
                resource_name.clone(),
                Entry {
                    plugin,
                    last_register_time: tokio::time::Instant::now(),
                },
            );
        }

        self.rebuild_catalog().await;
        info!(resource_name = %resource_name, engines = engines.len(), "accelerator plugin registered");
    }

    async fn rebuild_catalog(&self) {
        let entries = self.entries.read().await;
        let mut fresh = EngineRegistry::new();
        for entry in entries.values() {
            for engine in entry.plugin.supported_engines().await {
                fresh.register(engine);
            }
        }
        drop(entries);
        *self.catalog.write().await = fresh;
    }

    /// Run the 1-minute liveness ticker until `shutdown` resolves (spec.md
    /// §4.3 Liveness). Intended to be spawned once per process.
    pub async fn run_liveness_ticker(
        self: Arc<Self>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(LIVENESS_TICK);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.check_liveness().await;
                }
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn check_liveness(&self) {
        let stale: Vec<(String, Arc<dyn AcceleratorPlugin>)> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter(|(_, e)| {
                    !e.plugin.is_local() && e.last_register_time.elapsed() > LIVENESS_STALE_AFTER
                })
                .map(|(name, e)| (name.clone(), Arc::clone(&e.plugin)))
                .collect()
        };

        let mut removed_any = false;
        for (name, plugin) in stale {
            if let Err(e) = plugin.ping().await {
                warn!(resource_name = %name, error = %e, "accelerator plugin failed liveness ping, removing");
                self.entries.write().await.remove(&name);
                removed_any = true;
            }
        }

        if removed_any {
            self.rebuild_catalog().await;
        }
    }

    /// Probe plugins in iteration order; the first to return a non-empty
    /// accelerator list wins (spec.md §4.3: ordering is unspecified,
    /// callers must assume a node hosts one manufacturer's accelerators).
    pub async fn get_node_accelerator_type(
        &self,
        node_ip: &str,
        ssh_auth: &SshAuth,
    ) -> Option<(String, Vec<NodeAccelerator>)> {
        let plugins: Vec<(String, Arc<dyn AcceleratorPlugin>)> = self
            .entries
            .read()
            .await
            .iter()
            .map(|(name, e)| (name.clone(), Arc::clone(&e.plugin)))
            .collect();

        for (name, plugin) in plugins {
            match plugin.get_node_accelerator_type(node_ip, ssh_auth).await {
                Ok(found) if !found.is_empty() => return Some((name, found)),
                Ok(_) => continue,
                Err(e) => {
                    warn!(resource_name = %name, error = %e, "accelerator probe failed");
                    continue;
                }
            }
        }
        None
    }

    pub async fn get_node_runtime_config(
        &self,
        accelerator_type: &str,
        node_ip: &str,
        ssh_auth: &SshAuth,
    ) -> Result<HashMap<String, String>, Error> {
        let plugin = self.plugin_for(accelerator_type).await?;
        plugin.get_node_runtime_config(node_ip, ssh_auth).await
    }

    pub async fn convert_to_ray(&self, accelerator_type: &str, spec: &ResourceSpec) -> Result<RayResources, Error> {
        let plugin = self.plugin_for(accelerator_type).await?;
        Ok(plugin.convert_to_ray(spec))
    }

    pub async fn convert_to_kubernetes(
        &self,
        accelerator_type: &str,
        spec: &ResourceSpec,
    ) -> Result<KubernetesResources, Error> {
        let plugin = self.plugin_for(accelerator_type).await?;
        Ok(plugin.convert_to_kubernetes(spec))
    }

    async fn plugin_for(&self, accelerator_type: &str) -> Result<Arc<dyn AcceleratorPlugin>, Error> {
        self.entries
            .read()
            .await
            .get(accelerator_type)
            .map(|e| Arc::clone(&e.plugin))
            .ok_or_else(|| Error::UnknownResource(accelerator_type.to_string()))
    }

    /// Snapshot of the aggregated engine catalog (spec.md §4.4: "a pure
    /// function of currently healthy plugins").
    pub async fn engine_catalog(&self) -> EngineRegistry {
        self.catalog.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpu::CpuPlugin;

    #[tokio::test]
    async fn builtin_cpu_plugin_registers_at_construction() {
        let manager = AcceleratorManager::new(vec![Arc::new(CpuPlugin::new())]).await;
        let spec = ResourceSpec {
            cpu: Some(2.0),
            memory_gib: Some(4.0),
            ..Default::default()
        };
        let ray = manager.convert_to_ray("cpu", &spec).await.unwrap();
        assert_eq!(ray.num_cpus, Some(2.0));
        assert_eq!(ray.memory, Some(4 * (1u64 << 30)));
    }

    #[tokio::test]
    async fn unregistered_resource_is_an_error() {
        let manager = AcceleratorManager::new(vec![]).await;
        let err = manager
            .convert_to_ray("nvidia.com/gpu", &ResourceSpec::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownResource(_)));
    }

    #[tokio::test]
    async fn removal_rebuilds_catalog() {
        let manager = AcceleratorManager::new(vec![Arc::new(CpuPlugin::new())]).await;
        assert!(!manager.engine_catalog().await.is_empty());
        manager.entries.write().await.clear();
        manager.rebuild_catalog().await;
        assert!(manager.engine_catalog().await.is_empty());
    }
}
