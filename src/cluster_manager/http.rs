//! Thin HTTP client for the out-of-process SSH/Kubernetes cluster
//! provisioner (spec.md §1 Out of scope). Mirrors the shape of
//! [`crate::storage::http::HttpStorage`] and
//! [`crate::accelerator::remote::RemotePlugin`]: this crate only speaks the
//! wire contract, the provisioning logic itself lives in the external
//! collaborator process behind `base_url`.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{ClusterManager, ClusterStatusReport, Error};
use crate::entities::cluster::ClusterSpec;

#[derive(Clone)]
pub struct HttpClusterManager {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClusterManager {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), suffix)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, Error> {
        let response = builder
            .send()
            .await
            .map_err(|e| Error::Provisioning(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Provisioning(format!(
                "provisioner returned {}",
                response.status()
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| Error::Provisioning(e.to_string()))
    }

    async fn send_empty(&self, builder: reqwest::RequestBuilder) -> Result<(), Error> {
        let response = builder
            .send()
            .await
            .map_err(|e| Error::Provisioning(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Provisioning(format!(
                "provisioner returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct UpRequest<'a> {
    spec: &'a ClusterSpec,
}

#[derive(Serialize)]
struct NodeRequest<'a> {
    node_ip: &'a str,
}

#[derive(Deserialize)]
struct StatusResponse {
    dashboard_url: Option<String>,
    #[serde(default)]
    node_ips: Vec<String>,
    ready: bool,
}

impl From<StatusResponse> for ClusterStatusReport {
    fn from(r: StatusResponse) -> Self {
        ClusterStatusReport {
            dashboard_url: r.dashboard_url,
            node_ips: r.node_ips,
            ready: r.ready,
        }
    }
}

#[async_trait]
impl ClusterManager for HttpClusterManager {
    async fn up(&self, name: &str, spec: &ClusterSpec) -> Result<(), Error> {
        self.send_empty(
            self.client
                .post(self.url(&format!("/clusters/{name}/up")))
                .json(&UpRequest { spec }),
        )
        .await
    }

    async fn down(&self, name: &str) -> Result<(), Error> {
        self.send_empty(self.client.post(self.url(&format!("/clusters/{name}/down"))))
            .await
    }

    async fn start_node(&self, name: &str, node_ip: &str) -> Result<(), Error> {
        self.send_empty(
            self.client
                .post(self.url(&format!("/clusters/{name}/nodes/start")))
                .json(&NodeRequest { node_ip }),
        )
        .await
    }

    async fn stop_node(&self, name: &str, node_ip: &str) -> Result<(), Error> {
        self.send_empty(
            self.client
                .post(self.url(&format!("/clusters/{name}/nodes/stop")))
                .json(&NodeRequest { node_ip }),
        )
        .await
    }

    async fn drain(&self, name: &str, node_ip: &str) -> Result<(), Error> {
        self.send_empty(
            self.client
                .post(self.url(&format!("/clusters/{name}/nodes/drain")))
                .json(&NodeRequest { node_ip }),
        )
        .await
    }

    async fn status(&self, name: &str) -> Result<ClusterStatusReport, Error> {
        let resp: StatusResponse = self
            .send(self.client.get(self.url(&format!("/clusters/{name}/status"))))
            .await?;
        Ok(resp.into())
    }
}
