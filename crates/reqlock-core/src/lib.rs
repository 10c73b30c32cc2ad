//! Lock reconciliation engine for reqlock.
//!
//! This crate builds the installed-package dependency graph and its reverse
//! index, reconciles freshly resolved candidates against the previous lock
//! file entry by entry, and exposes the `Engine`, the project-level API that
//! reads the manifest, runs a batch, and writes the lock back atomically
//! under an advisory project lock.

pub mod batch;
pub mod concurrency;
pub mod engine;
pub mod entry;
pub mod graph;
pub mod inspect;
pub mod lifecycle;
pub mod reverse;

pub use batch::{reconcile, BatchInputs, ResolverOutput};
pub use concurrency::ProjectLock;
pub use engine::{load_resolver_output, CheckReport, Engine, LockOptions, LockResult};
pub use entry::{
    Constraint, ConstraintOrigin, Entry, ReconcileContext, ReconcileError, RequirementView,
};
pub use graph::{DependencyGraph, DroppedPackage, Edge, GraphError, Node, RequirementTree};
pub use inspect::{
    DistributionSource, InspectError, InstalledDistribution, JsonListing, SitePackages,
};
pub use lifecycle::{validate_transition, EntryState};
pub use reverse::{ParentRef, ReverseEntry, ReverseIndex};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Manifest(#[from] reqlock_schema::ManifestError),
    #[error("lock error: {0}")]
    Lock(#[from] reqlock_schema::LockError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("marker error: {0}")]
    Marker(#[from] reqlock_schema::MarkerError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
