//! HTTP client for a plugin registered via `POST /api/v1/plugin/register`
//! (spec.md §4.3, §6). Mirrors the shape of the teacher's
//! `registry::RegistryProvider` implementations: one async trait, one thin
//! `reqwest` client struct per remote collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::engine_registry::{Engine, EngineImage, EngineVersion};
use super::{AcceleratorPlugin, Error, KubernetesResources, NodeAccelerator, RayResources, ResourceSpec, SshAuth};

pub struct RemotePlugin {
    resource_name: String,
    endpoint: String,
    client: reqwest::Client,
}

impl RemotePlugin {
    pub fn new(resource_name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), path)
    }
}

#[derive(Serialize)]
struct SshAuthWire<'a> {
    user: &'a str,
    private_key_pem: &'a str,
}

impl<'a> From<&'a SshAuth> for SshAuthWire<'a> {
    fn from(auth: &'a SshAuth) -> Self {
        Self {
            user: &auth.user,
            private_key_pem: &auth.private_key_pem,
        }
    }
}

#[derive(Deserialize)]
struct NodeAcceleratorWire {
    product: String,
    count: u32,
}

#[derive(Deserialize)]
struct EngineImageWire {
    image_name: String,
    tag: String,
}

#[derive(Deserialize)]
struct EngineVersionWire {
    version: String,
    images: HashMap<String, EngineImageWire>,
}

#[derive(Deserialize)]
struct EngineWire {
    name: String,
    versions: Vec<EngineVersionWire>,
}

#[async_trait]
impl AcceleratorPlugin for RemotePlugin {
    fn resource_name(&self) -> &str {
        &self.resource_name
    }

    async fn ping(&self) -> Result<(), Error> {
        let response = self
            .client
            .get(self.url("/ping"))
            .send()
            .await
            .map_err(|e| Error::Unreachable(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::Unreachable(format!(
                "plugin returned {}",
                response.status()
            )))
        }
    }

    async fn get_node_accelerator_type(
        &self,
        node_ip: &str,
        ssh_auth: &SshAuth,
    ) -> Result<Vec<NodeAccelerator>, Error> {
        let body = serde_json::json!({
            "nodeIp": node_ip,
            "sshAuth": SshAuthWire::from(ssh_auth),
        });
        let found: Vec<NodeAcceleratorWire> = self
            .client
            .post(self.url("/node-accelerator-type"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(found
            .into_iter()
            .map(|w| NodeAccelerator {
                product: w.product,
                count: w.count,
            })
            .collect())
    }

    async fn get_node_runtime_config(
        &self,
        node_ip: &str,
        ssh_auth: &SshAuth,
    ) -> Result<HashMap<String, String>, Error> {
        let body = serde_json::json!({
            "nodeIp": node_ip,
            "sshAuth": SshAuthWire::from(ssh_auth),
        });
        self.client
            .post(self.url("/node-runtime-config"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    fn convert_to_ray(&self, spec: &ResourceSpec) -> RayResources {
        // Conversion math is vendor-agnostic once cpu/memory/gpu counts are
        // known; only the vendor prefix used for Kubernetes resource keys is
        // plugin-specific, so the remote client applies the same formula as
        // the built-in plugin rather than round-tripping over HTTP for it.
        RayResources {
            num_cpus: spec.cpu,
            memory: spec.memory_gib.map(|gib| (gib * (1u64 << 30) as f64) as u64),
            num_gpus: spec.gpu,
            resources: spec
                .accelerator
                .as_ref()
                .and_then(|a| a.product.clone())
                .zip(spec.gpu)
                .map(|(product, count)| HashMap::from([(product, count as f64)]))
                .unwrap_or_default(),
        }
    }

    fn convert_to_kubernetes(&self, spec: &ResourceSpec) -> KubernetesResources {
        let vendor_prefix = &self.resource_name;
        let mut requests = HashMap::new();
        let mut limits = HashMap::new();
        let mut node_selector = HashMap::new();

        if let Some(cpu) = spec.cpu {
            requests.insert("cpu".to_string(), format!("{cpu}"));
        }
        if let Some(gib) = spec.memory_gib {
            requests.insert("memory".to_string(), format!("{gib}Gi"));
        }
        if let Some(gpu) = spec.gpu {
            requests.insert(vendor_prefix.clone(), gpu.to_string());
            limits.insert(vendor_prefix.clone(), gpu.to_string());
        }
        if let Some(accelerator) = &spec.accelerator {
            if let Some(product) = &accelerator.product {
                node_selector.insert(format!("{vendor_prefix}.product"), product.clone());
            }
        }
        for (name, qty) in &spec.custom_resources {
            requests.insert(name.clone(), format!("{qty}"));
            limits.insert(name.clone(), format!("{qty}"));
        }

        KubernetesResources {
            requests,
            limits,
            node_selector,
        }
    }

    async fn supported_engines(&self) -> Vec<Engine> {
        let wire: Vec<EngineWire> = match self.client.get(self.url("/engines")).send().await {
            Ok(response) => match response.json().await {
                Ok(parsed) => parsed,
                Err(_) => return Vec::new(),
            },
            Err(_) => return Vec::new(),
        };

        wire.into_iter()
            .map(|e| Engine {
                name: e.name,
                versions: e
                    .versions
                    .into_iter()
                    .map(|v| EngineVersion {
                        version: v.version,
                        images: v
                            .images
                            .into_iter()
                            .map(|(accel_type, image)| {
                                (
                                    accel_type,
                                    EngineImage {
                                        image_name: image.image_name,
                                        tag: image.tag,
                                    },
                                )
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect()
    }
}
