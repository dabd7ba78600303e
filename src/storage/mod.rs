//! The Storage contract consumed by every controller (spec.md §6).
//!
//! Storage itself — the HTTP/JSON-over-relational service behind this
//! trait — is an external collaborator and out of scope for this crate
//! (spec.md §1). What lives here is the client-side interface the rest of
//! the control plane programs against, plus two implementations of it: an
//! HTTP client for production (`storage::http`) and an in-memory store used
//! by tests and by any future local/offline tooling (`storage::memory`).

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use crate::entities::{Entity, Resource};

#[derive(Debug, Error)]
pub enum Error {
    #[error("resource not found")]
    NotFound,
    #[error("status write conflict: expected phase {expected:?}, object has diverged")]
    Conflict { expected: Option<String> },
    #[error("storage request failed: {0}")]
    Transport(String),
    #[error("storage returned malformed data: {0}")]
    Decode(String),
}

impl Error {
    /// Whether this failure mode is transient (framework should back off and
    /// retry) as opposed to a local programming error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Conflict { .. })
    }
}

/// A single predicate against a (possibly nested, JSONB-path) column, e.g.
/// `{"metadata->workspace", Eq, "prod"}`.
#[derive(Debug, Clone)]
pub struct Filter {
    pub column: String,
    pub operator: Operator,
    pub value: serde_json::Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            column: column.into(),
            operator: Operator::Eq,
            value: value.into(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            operator: Operator::IsNull,
            value: serde_json::Value::Null,
        }
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            operator: Operator::IsNotNull,
            value: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Lt,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub filters: Vec<Filter>,
    pub limit: Option<u32>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// CRUD + status-write contract for a single kind `E`. Implemented once per
/// backend (HTTP, in-memory) and used generically by every controller and
/// by the reconciliation framework.
#[async_trait]
pub trait Storage<E: Entity>: Send + Sync {
    async fn list(&self, opts: &ListOptions) -> Result<Vec<Resource<E>>, Error>;
    async fn get(&self, id: Uuid) -> Result<Resource<E>, Error>;
    async fn get_by_name(&self, workspace: &str, name: &str) -> Result<Resource<E>, Error>;
    async fn create(&self, obj: &Resource<E>) -> Result<Resource<E>, Error>;
    async fn update(&self, obj: &Resource<E>) -> Result<Resource<E>, Error>;
    async fn patch(&self, id: Uuid, patch: serde_json::Value) -> Result<Resource<E>, Error>;

    /// Conditional status write keyed on `id`, optionally guarded by the
    /// phase the caller last observed (spec.md §4.1): if another writer has
    /// already moved the object to a different phase, this returns
    /// `Error::Conflict` rather than clobbering it.
    async fn update_status(
        &self,
        id: Uuid,
        status: &E::Status,
        expected_phase: Option<&str>,
    ) -> Result<(), Error>;

    /// Hard-delete, used only for the rare case a handler has confirmed
    /// terminal cleanup and wants the row gone rather than left in
    /// `status.phase == Deleted` forever (spec.md §9 Design Notes).
    async fn delete(&self, id: Uuid) -> Result<(), Error>;
}

/// `CallDatabaseFunction` (spec.md §6): invokes a named function on the
/// Storage side (e.g. a cron-driven aggregate) and deserialises its result.
/// Kept separate from `Storage<E>` because it is not keyed to any one kind.
#[async_trait]
pub trait DatabaseFunctions: Send + Sync {
    async fn call_raw(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, Error>;
}

/// Deserialising helper built on top of [`DatabaseFunctions::call_raw`].
/// Kept as a free function (rather than a generic trait method) so
/// `dyn DatabaseFunctions` stays object-safe.
pub async fn call<T: DeserializeOwned>(
    db: &(impl DatabaseFunctions + ?Sized),
    name: &str,
    args: serde_json::Value,
) -> Result<T, Error> {
    let raw = db.call_raw(name, args).await?;
    serde_json::from_value(raw).map_err(|e| Error::Decode(e.to_string()))
}
