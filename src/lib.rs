pub mod accelerator;
pub mod cluster_manager;
pub mod controllers;
pub mod entities;
pub mod orchestrator;
pub mod reconcile;
pub mod settings;
pub mod state;
pub mod storage;

use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use accelerator::remote::RemotePlugin;
use accelerator::{cpu::CpuPlugin, AcceleratorManager};
use cluster_manager::http::HttpClusterManager;
use entities::api_key::ApiKey;
use entities::cluster::Cluster;
use entities::endpoint::Endpoint;
use entities::engine::Engine;
use entities::image_registry::ImageRegistry;
use entities::model_catalog::ModelCatalog;
use entities::model_registry::ModelRegistry;
use entities::role::Role;
use entities::role_assignment::RoleAssignment;
use entities::workspace::Workspace;
use orchestrator::{kubernetes::KubernetesOrchestrator, ray::RayServeOrchestrator};
use reconcile::Controller;
use settings::Settings;
use state::AppState;
use storage::http::HttpStorage;

/// Construct every per-kind controller, spawn them alongside the
/// accelerator liveness ticker, and serve the plugin-registration HTTP
/// surface (spec.md §6) until a shutdown signal arrives.
///
/// Ten [`Controller`]s run concurrently, one per resource kind
/// (SPEC_FULL.md §B.1) — the scheduling logic they share lives once in
/// [`reconcile::Controller`]; what's built here is just each kind's
/// `Storage` + `Reconciler` pairing.
pub async fn run_server(settings: Settings) -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok();

    let storage = Arc::new(HttpStorage::new(
        settings.storage.access_url.clone(),
        settings.storage.jwt_secret.clone(),
    ));
    let http = reqwest::Client::new();

    let image_registries: Arc<dyn storage::Storage<ImageRegistry>> = storage.clone();
    let model_registries: Arc<dyn storage::Storage<ModelRegistry>> = storage.clone();
    let clusters: Arc<dyn storage::Storage<Cluster>> = storage.clone();
    let engines: Arc<dyn storage::Storage<Engine>> = storage.clone();
    let endpoints: Arc<dyn storage::Storage<Endpoint>> = storage.clone();
    let workspaces: Arc<dyn storage::Storage<Workspace>> = storage.clone();
    let roles: Arc<dyn storage::Storage<Role>> = storage.clone();
    let role_assignments: Arc<dyn storage::Storage<RoleAssignment>> = storage.clone();
    let api_keys: Arc<dyn storage::Storage<ApiKey>> = storage.clone();
    let model_catalogs: Arc<dyn storage::Storage<ModelCatalog>> = storage.clone();

    let accelerators = AcceleratorManager::new(vec![Arc::new(CpuPlugin::new())]).await;

    let cluster_manager = Arc::new(HttpClusterManager::new(settings.provisioner_url.clone()));

    let kube_client = match &settings.kubernetes {
        Some(k8s_settings) => {
            let config = if k8s_settings.kubeconfig.is_some() {
                kube::Config::from_kubeconfig(&kube::config::KubeConfigOptions::default()).await?
            } else {
                kube::Config::infer().await?
            };
            Some(kube::Client::try_from(config)?)
        }
        None => None,
    };
    let kubernetes_orchestrator = match kube_client {
        Some(client) => KubernetesOrchestrator::new(client),
        None => KubernetesOrchestrator::new_without_client(),
    };
    let ray_orchestrator = RayServeOrchestrator::new(http.clone());

    let state = AppState {
        accelerators: Arc::clone(&accelerators),
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let workers = settings.controller.workers;
    let resync_interval = std::time::Duration::from_secs(settings.controller.resync_interval_secs);

    let mut handles = Vec::new();

    macro_rules! spawn_controller {
        ($storage:expr, $reconciler:expr) => {{
            let controller = Arc::new(Controller::with_config(
                $storage,
                Arc::new($reconciler),
                workers,
                resync_interval,
            ));
            handles.push(tokio::spawn(controller.run(shutdown_rx.clone())));
        }};
    }

    spawn_controller!(
        image_registries.clone(),
        controllers::image_registry::ImageRegistryController::new(
            image_registries.clone(),
            clusters.clone(),
            http.clone(),
        )
    );
    spawn_controller!(
        model_registries.clone(),
        controllers::model_registry::ModelRegistryController::new(http.clone())
    );
    spawn_controller!(
        clusters.clone(),
        controllers::cluster::ClusterController::new(clusters.clone(), cluster_manager.clone())
    );
    spawn_controller!(engines.clone(), controllers::engine::EngineController::new());
    spawn_controller!(
        endpoints.clone(),
        controllers::endpoint::EndpointController::new(
            endpoints.clone(),
            clusters.clone(),
            engines.clone(),
            model_registries.clone(),
            Arc::clone(&accelerators),
            ray_orchestrator,
            kubernetes_orchestrator,
        )
    );
    spawn_controller!(
        workspaces.clone(),
        controllers::workspace::WorkspaceController::new()
    );
    spawn_controller!(roles.clone(), controllers::role::RoleController::new());
    spawn_controller!(
        role_assignments.clone(),
        controllers::role_assignment::RoleAssignmentController::new(roles.clone())
    );
    spawn_controller!(api_keys.clone(), controllers::api_key::ApiKeyController::new());
    spawn_controller!(
        model_catalogs.clone(),
        controllers::model_catalog::ModelCatalogController::new(model_registries.clone())
    );

    handles.push(tokio::spawn(
        Arc::clone(&accelerators).run_liveness_ticker(shutdown_rx.clone()),
    ));

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/plugin/register", post(register_plugin))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    info!("HTTP server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server shutdown complete, stopping controllers");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterPluginRequest {
    resource_name: String,
    endpoint: String,
}

/// `POST /api/v1/plugin/register` (spec.md §6): a remote accelerator
/// plugin announces itself; re-registering an already-known resource name
/// refreshes its liveness and re-harvests its engine catalog.
async fn register_plugin(
    State(state): State<AppState>,
    Json(req): Json<RegisterPluginRequest>,
) -> &'static str {
    let plugin = Arc::new(RemotePlugin::new(
        req.resource_name.clone(),
        req.endpoint.clone(),
    ));
    state.accelerators.register(plugin).await;
    "ok"
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT, shutting down gracefully");
        },
        _ = terminate => {
            info!("received SIGTERM, shutting down gracefully");
        },
    }
}
