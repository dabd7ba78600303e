//! Built-in CPU-only accelerator plugin. Exists so endpoints with no
//! `resources.accelerator` resolve through the same plugin machinery as
//! GPU-backed ones rather than a special-cased code path (SPEC_FULL.md §B.5).

use async_trait::async_trait;
use std::collections::HashMap;

use super::{
    AcceleratorPlugin, Error, KubernetesResources, NodeAccelerator, RayResources, ResourceSpec,
    SshAuth,
};
use crate::accelerator::engine_registry::Engine;

pub const CPU_RESOURCE_NAME: &str = "cpu";

pub struct CpuPlugin;

impl CpuPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CpuPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AcceleratorPlugin for CpuPlugin {
    fn resource_name(&self) -> &str {
        CPU_RESOURCE_NAME
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn ping(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn get_node_accelerator_type(
        &self,
        _node_ip: &str,
        _ssh_auth: &SshAuth,
    ) -> Result<Vec<NodeAccelerator>, Error> {
        // Every node has a CPU, but this plugin never "wins" node-type
        // detection — it's the fallback when no vendor plugin claims the
        // node, applied explicitly rather than by probing.
        Ok(Vec::new())
    }

    async fn get_node_runtime_config(
        &self,
        _node_ip: &str,
        _ssh_auth: &SshAuth,
    ) -> Result<HashMap<String, String>, Error> {
        Ok(HashMap::new())
    }

    fn convert_to_ray(&self, spec: &ResourceSpec) -> RayResources {
        RayResources {
            num_cpus: spec.cpu,
            memory: spec.memory_gib.map(|gib| (gib * (1u64 << 30) as f64) as u64),
            num_gpus: None,
            resources: spec.custom_resources.clone(),
        }
    }

    fn convert_to_kubernetes(&self, spec: &ResourceSpec) -> KubernetesResources {
        let mut requests = HashMap::new();
        let mut limits = HashMap::new();
        if let Some(cpu) = spec.cpu {
            requests.insert("cpu".to_string(), format!("{cpu}"));
        }
        if let Some(gib) = spec.memory_gib {
            requests.insert("memory".to_string(), format!("{gib}Gi"));
        }
        for (name, qty) in &spec.custom_resources {
            requests.insert(name.clone(), format!("{qty}"));
            limits.insert(name.clone(), format!("{qty}"));
        }
        KubernetesResources {
            requests,
            limits,
            node_selector: HashMap::new(),
        }
    }

    async fn supported_engines(&self) -> Vec<Engine> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ray_conversion_uses_cpu_and_gib_memory() {
        let plugin = CpuPlugin::new();
        let spec = ResourceSpec {
            cpu: Some(1.5),
            memory_gib: Some(2.0),
            ..Default::default()
        };
        let ray = plugin.convert_to_ray(&spec);
        assert_eq!(ray.num_cpus, Some(1.5));
        assert_eq!(ray.memory, Some(2 * (1u64 << 30)));
        assert!(ray.num_gpus.is_none());
    }

    #[test]
    fn kubernetes_conversion_formats_memory_in_gi() {
        let plugin = CpuPlugin::new();
        let spec = ResourceSpec {
            cpu: Some(1.0),
            memory_gib: Some(4.0),
            ..Default::default()
        };
        let k8s = plugin.convert_to_kubernetes(&spec);
        assert_eq!(k8s.requests.get("memory"), Some(&"4Gi".to_string()));
    }
}
