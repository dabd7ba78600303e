//! The common resource envelope (spec.md §3) shared by every reconciled kind.
//!
//! Every entity in Storage is addressed by a global `id` and, within a
//! workspace, by `(workspace, name)`. The envelope itself never changes
//! shape across kinds; only `spec` and `status` vary, which is why they are
//! modelled as an associated `Entity::Spec` / `Entity::Status` pair rather
//! than duplicated per struct.

pub mod api_key;
pub mod cluster;
pub mod endpoint;
pub mod engine;
pub mod image_registry;
pub mod model_catalog;
pub mod model_registry;
pub mod role;
pub mod role_assignment;
pub mod workspace;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Marker trait tying a Rust type to a Storage "kind" and its spec/status
/// shapes. Implemented once per resource kind (image_registry.rs,
/// cluster.rs, ...).
pub trait Entity: Send + Sync + Sized + 'static {
    /// The Storage `kind` discriminator, e.g. `"Cluster"`.
    const KIND: &'static str;
    /// `apiVersion` stamped onto objects this crate creates.
    const API_VERSION: &'static str = "neutree.ai/v1";

    type Spec: Clone + Send + Sync + Serialize + DeserializeOwned + 'static;
    type Status: Clone
        + Send
        + Sync
        + Serialize
        + DeserializeOwned
        + Default
        + HasPhase
        + 'static;
}

/// Every status type exposes its current phase as a plain string so the
/// reconciliation framework and generic logging can observe phase
/// transitions without knowing the kind-specific enum.
pub trait HasPhase {
    fn phase(&self) -> &str;
    fn error_message(&self) -> Option<&str> {
        None
    }
}

/// `metadata` common to all entities (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub workspace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    pub creation_timestamp: DateTime<Utc>,
    /// Finalizer-style markers: a handler adds its own name here while it
    /// still has teardown work pending for this object, and removes it once
    /// done. Soft-delete cannot complete (status.phase -> Deleted) while any
    /// finalizer remains.
    #[serde(default)]
    pub finalizers: Vec<String>,
}

impl Metadata {
    pub fn new(workspace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workspace: workspace.into(),
            deletion_timestamp: None,
            creation_timestamp: Utc::now(),
            finalizers: Vec::new(),
        }
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn key(&self) -> (String, String) {
        (self.workspace.clone(), self.name.clone())
    }
}

/// A fully materialised resource: envelope + kind-specific spec/status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "E::Spec: Serialize, E::Status: Serialize",
    deserialize = "E::Spec: DeserializeOwned, E::Status: DeserializeOwned"
))]
pub struct Resource<E: Entity> {
    pub id: Uuid,
    pub kind: String,
    pub api_version: String,
    pub metadata: Metadata,
    pub spec: E::Spec,
    pub status: E::Status,
}

impl<E: Entity> Resource<E> {
    pub fn new(id: Uuid, metadata: Metadata, spec: E::Spec) -> Self {
        Self {
            id,
            kind: E::KIND.to_string(),
            api_version: E::API_VERSION.to_string(),
            metadata,
            spec,
            status: E::Status::default(),
        }
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.is_deleting()
    }

    pub fn app_name(&self) -> String {
        format!("{}_{}", self.metadata.workspace, self.metadata.name)
    }
}

