//! Layered configuration (SPEC_FULL.md §A.3), in the teacher's shape: a
//! base file, an environment-specific file, a local override file, then
//! environment variables, then CLI flags — each layer overriding the last.

use clap::{Parser, Subcommand, ValueEnum};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

/// `neutree-core` command-line interface (spec.md §6 "CLI / flags").
#[derive(Parser, Debug, Clone)]
#[command(
    name = "neutree-core",
    version,
    about = "Control plane for the Neutree model-inference fleet"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Directory containing default.toml / {RUN_MODE}.toml / local.toml.
    #[arg(long, env = "NEUTREE_CONFIG_DIR", default_value = "/config")]
    pub config_dir: String,

    /// Overrides RUST_LOG / the configured log level.
    #[arg(long, env = "NEUTREE_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, env = "NEUTREE_STORAGE_ACCESS_URL")]
    pub storage_access_url: Option<String>,

    #[arg(long, env = "NEUTREE_STORAGE_JWT_SECRET")]
    pub storage_jwt_secret: Option<String>,

    /// Worker pool size per reconciliation controller (spec.md §4.1 `W`).
    #[arg(long, env = "NEUTREE_CONTROLLER_WORKERS")]
    pub controller_workers: Option<usize>,

    #[arg(long, env = "NEUTREE_DEFAULT_CLUSTER_VERSION")]
    pub default_cluster_version: Option<String>,

    /// Defaulting hint only; the endpoint orchestrator dispatch itself is
    /// driven by the resolved Cluster's dashboard URL, never by this flag
    /// (spec.md §9 Open Questions; SPEC_FULL.md §A.3).
    #[arg(long, value_enum, env = "NEUTREE_DEPLOY_TYPE")]
    pub deploy_type: Option<DeployType>,

    #[arg(long, env = "NEUTREE_CORE_SERVER_HOST")]
    pub core_server_host: Option<String>,

    #[arg(long, env = "NEUTREE_CORE_SERVER_PORT")]
    pub core_server_port: Option<u16>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Load configuration and exit 0/1 without connecting to Storage
    /// (SPEC_FULL.md §B.4), useful for CI.
    ValidateConfig,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployType {
    Ssh,
    Kubernetes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub storage: StorageSettings,
    #[serde(default)]
    pub controller: ControllerSettings,
    #[serde(default = "default_cluster_version")]
    pub default_cluster_version: String,
    #[serde(default = "default_deploy_type")]
    pub deploy_type: DeployType,
    #[serde(default)]
    pub kubernetes: Option<KubernetesSettings>,
    /// Base URL of the out-of-process cluster provisioner
    /// ([`crate::cluster_manager::http::HttpClusterManager`]); not exposed
    /// as a CLI flag since provisioning itself is out of scope (spec.md §1).
    pub provisioner_url: String,
}

fn default_cluster_version() -> String {
    "2.9.0".to_string()
}

fn default_deploy_type() -> DeployType {
    DeployType::Kubernetes
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub access_url: String,
    #[serde(default)]
    pub jwt_secret: String,
}

fn default_workers() -> usize {
    crate::reconcile::DEFAULT_WORKERS
}

fn default_resync_interval_secs() -> u64 {
    crate::reconcile::DEFAULT_RESYNC_INTERVAL.as_secs()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerSettings {
    /// Worker pool size per controller (spec.md §4.1 `W`, default 5).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Full-list resync interval in seconds (spec.md §4.1 `T_resync`,
    /// default 30).
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            resync_interval_secs: default_resync_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KubernetesSettings {
    /// Optional kubeconfig path (defaults to in-cluster or ~/.kube/config).
    #[serde(default)]
    pub kubeconfig: Option<String>,
}

impl Settings {
    /// Load configuration per the layering in SPEC_FULL.md §A.3: base file,
    /// `{RUN_MODE}` file, local override file, `NEUTREE__`-prefixed
    /// environment variables, then the parsed CLI flags override everything.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut settings: Settings = Config::builder()
            .add_source(File::with_name(&format!("{}/default", cli.config_dir)).required(false))
            .add_source(
                File::with_name(&format!("{}/{}", cli.config_dir, run_mode)).required(false),
            )
            .add_source(File::with_name(&format!("{}/local", cli.config_dir)).required(false))
            .add_source(Environment::with_prefix("NEUTREE").separator("__"))
            .build()?
            .try_deserialize()?;

        if let Some(url) = &cli.storage_access_url {
            settings.storage.access_url = url.clone();
        }
        if let Some(secret) = &cli.storage_jwt_secret {
            settings.storage.jwt_secret = secret.clone();
        }
        if let Some(workers) = cli.controller_workers {
            settings.controller.workers = workers;
        }
        if let Some(version) = &cli.default_cluster_version {
            settings.default_cluster_version = version.clone();
        }
        if let Some(deploy_type) = cli.deploy_type {
            settings.deploy_type = deploy_type;
        }
        if let Some(host) = &cli.core_server_host {
            settings.server.host = host.clone();
        }
        if let Some(port) = cli.core_server_port {
            settings.server.port = port;
        }

        if settings.storage.access_url.is_empty() {
            return Err(ConfigError::Message(
                "storage access URL not configured: set --storage-access-url, NEUTREE__STORAGE__ACCESS_URL, or [storage] access_url in config".to_string(),
            ));
        }

        Ok(settings)
    }
}
