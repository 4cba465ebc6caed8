use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::oneshot;

use crate::error::DatastoreResult;
use crate::federation::model::{DocInfo, DocMetaFileRef, Fingerprint};
use crate::federation::AsyncSnapshotListener;
use crate::util::Unsubscribe;

/// Reported on a user listener panic/error (spec.md §7 `listener-exception`)
/// and on lower-severity conditions (`snapshot-source-error`,
/// `reconcile-copy-error`, `replicate-apply-error`) that the contract
/// requires be surfaced without aborting the operation in progress.
pub type AsyncErrorListener = std::sync::Arc<dyn Fn(&crate::error::DatastoreError) + Send + Sync>;

/// Per-side staging handle passed into a tier's `write`/`delete` call
/// (spec.md §4.7). The implementation calls `resolve_written` as soon as
/// its own "written" stage completes and `resolve_committed` once durable;
/// both are independent of when the method call itself returns.
pub struct MutationSink {
    written_tx: Option<oneshot::Sender<DatastoreResult<()>>>,
    committed_tx: Option<oneshot::Sender<DatastoreResult<()>>>,
}

impl MutationSink {
    pub(crate) fn new(
        written_tx: oneshot::Sender<DatastoreResult<()>>,
        committed_tx: oneshot::Sender<DatastoreResult<()>>,
    ) -> Self {
        Self {
            written_tx: Some(written_tx),
            committed_tx: Some(committed_tx),
        }
    }

    pub fn resolve_written(&mut self, result: DatastoreResult<()>) {
        if let Some(tx) = self.written_tx.take() {
            let _ = tx.send(result);
        }
    }

    pub fn resolve_committed(&mut self, result: DatastoreResult<()>) {
        if let Some(tx) = self.committed_tx.take() {
            let _ = tx.send(result);
        }
    }

    /// Convenience for implementations with no real staging distinction:
    /// resolves both signals with the same outcome.
    pub fn resolve_both(&mut self, result: DatastoreResult<()>) {
        self.resolve_written(result.clone());
        self.resolve_committed(result);
    }

    /// A sink whose signals nobody observes — for callers (the reconciler,
    /// the replicating listener) that only care about the `write`/`delete`
    /// call's own return value, not its staged acknowledgement.
    pub fn no_op() -> Self {
        let (written_tx, _) = oneshot::channel();
        let (committed_tx, _) = oneshot::channel();
        Self::new(written_tx, committed_tx)
    }
}

/// A file stored alongside a document (spec.md §6 `DatastoreFile`).
#[derive(Clone, Debug)]
pub struct DatastoreFile {
    pub file_ref: DocMetaFileRef,
    pub data: Bytes,
    pub content_type: Option<String>,
}

/// Opaque success marker for `init` (spec.md §6 `InitResult`). Carries no
/// fields of its own; failure is expressed through `DatastoreResult`'s `Err`
/// arm instead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InitResult;

/// Opaque success marker for `delete` (spec.md §6 `DeleteResult`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeleteResult;

/// Returned by `snapshot` (spec.md §6 `{unsubscribe?}`). Some tiers expose a
/// teardown handle; others (e.g. a always-on local watch) may not.
pub struct SnapshotHandle {
    pub unsubscribe: Option<Unsubscribe>,
}

/// The datastore contract each tier (local, cloud) implements (spec.md §6).
/// The federated facade is the only consumer; concrete backends (disk
/// files, a cloud document store) are external collaborators out of scope
/// for this crate.
#[async_trait]
pub trait Datastore: Send + Sync {
    async fn init(&self, error_listener: Option<AsyncErrorListener>) -> DatastoreResult<InitResult>;

    async fn stop(&self);

    async fn contains(&self, fingerprint: &Fingerprint) -> bool;

    async fn get_doc_meta(&self, fingerprint: &Fingerprint) -> DatastoreResult<Option<serde_json::Value>>;

    /// `write(fingerprint, data, docInfo, mutation?)` — `sink` is always
    /// supplied by the write coordinator in this crate; implementations
    /// must resolve both of its stages on every code path.
    async fn write(
        &self,
        fingerprint: &Fingerprint,
        data: serde_json::Value,
        doc_info: DocInfo,
        sink: MutationSink,
    ) -> DatastoreResult<()>;

    /// `delete(docMetaFileRef, mutation?) → DeleteResult`.
    async fn delete(
        &self,
        doc_meta_file_ref: &DocMetaFileRef,
        sink: MutationSink,
    ) -> DatastoreResult<DeleteResult>;

    async fn write_file(
        &self,
        backend: &str,
        file_ref: &DocMetaFileRef,
        data: Bytes,
        meta: serde_json::Value,
    ) -> DatastoreResult<DatastoreFile>;

    async fn get_file(&self, backend: &str, file_ref: &DocMetaFileRef) -> DatastoreResult<Option<DatastoreFile>>;

    async fn contains_file(&self, backend: &str, file_ref: &DocMetaFileRef) -> bool;

    async fn delete_file(&self, backend: &str, file_ref: &DocMetaFileRef) -> DatastoreResult<()>;

    async fn get_doc_meta_files(&self) -> DatastoreResult<Vec<DocMetaFileRef>>;

    async fn snapshot(
        &self,
        listener: AsyncSnapshotListener,
        error_listener: Option<AsyncErrorListener>,
    ) -> DatastoreResult<SnapshotHandle>;
}
