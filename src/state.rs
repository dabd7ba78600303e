//! Shared state handed to axum route handlers (spec.md §6 "core-server"
//! surface): currently just the accelerator registry, since the plugin
//! self-registration endpoint is the only inbound HTTP surface this crate
//! owns beyond health checks.

use std::sync::Arc;

use crate::accelerator::AcceleratorManager;

#[derive(Clone)]
pub struct AppState {
    pub accelerators: Arc<AcceleratorManager>,
}
