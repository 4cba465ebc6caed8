//! Federated document datastore: a local/cloud pair exposed behind one
//! contract, kept in sync by an initial two-way reconciliation followed by
//! continuous cloud→local replication (spec.md §1).

pub mod comparison_index;
pub mod config;
pub mod datastore;
pub mod dedup;
pub mod dispatcher;
pub mod events;
pub mod facade;
pub mod latch;
pub mod model;
pub mod reconciler;
pub mod replicating_listener;
pub mod sync_doc;
pub mod write_coordinator;

use std::sync::Arc;

use crate::error::DatastoreResult;
use crate::federation::sync_doc::{box_future, BoxFuture, DocMetaSnapshotEvent};

/// A subscriber to a tier's (or the facade's) snapshot event stream. Boxed
/// and `Arc`-shared so the same listener value can be installed on both
/// tiers and cloned into per-event async closures without re-allocating
/// (spec.md §6 "snapshot(listener, errorListener?)").
pub type AsyncSnapshotListener =
    Arc<dyn Fn(DocMetaSnapshotEvent) -> BoxFuture<'static, DatastoreResult<()>> + Send + Sync>;

pub use comparison_index::ComparisonIndex;
pub use config::{FederationConfig, FederationConfigBuilder, ReconcileOrder};
pub use datastore::{AsyncErrorListener, Datastore, DatastoreFile, DeleteResult, InitResult, MutationSink, SnapshotHandle};
pub use dedup::DedupListener;
pub use dispatcher::EventDispatcher;
pub use events::{Dest, FileSynchronizationEvent, SynchronizationEvent};
pub use facade::FederatedDatastore;
pub use model::{compare_uuids, DocInfo, DocMetaFileRef, Fingerprint, MutationType, Uuid};
pub use sync_doc::{Consistency, DocMetaMutation, DocMetaSnapshotEvent as SnapshotEvent, SyncDoc, SyncDocMap};
pub use write_coordinator::MutationAck;

/// Helper re-exported for integration tests that build `DocMetaSnapshotEvent`
/// values by hand; kept here rather than duplicated per test module.
pub fn no_op_listener() -> AsyncSnapshotListener {
    Arc::new(|_event| box_future(async { Ok(()) }))
}
