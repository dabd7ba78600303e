//! One [`crate::reconcile::Reconciler`] implementation per resource kind
//! (spec.md §3 Data Model). Each controller owns exactly the collaborators
//! its handler needs; the generic scheduling (queue, backoff, worker pool)
//! lives entirely in [`crate::reconcile`].
//!
//! Grounded in the teacher's `project::controller`/`ecr::controller`
//! handler bodies: a finalizer check up front, a `match` on whether the
//! object is tearing down, and a conditional status write at the end.

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

/// The finalizer every controller that needs teardown-before-delete adds to
/// its own kind (spec.md §9 Design Notes, grounded in the teacher's
/// `ECR_FINALIZER` constant).
pub(crate) fn finalizer_name(kind: &str) -> String {
    format!("neutree.ai/{}", kind.to_lowercase())
}
