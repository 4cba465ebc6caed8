use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use async_lock::Mutex as AsyncMutex;
use bytes::Bytes;
use futures::FutureExt;

use crate::error::{self, DatastoreResult};
use crate::federation::comparison_index::ComparisonIndex;
use crate::federation::config::{FederationConfig, ReconcileOrder};
use crate::federation::datastore::{AsyncErrorListener, Datastore, DatastoreFile, SnapshotHandle};
use crate::federation::dedup::DedupListener;
use crate::federation::dispatcher::EventDispatcher;
use crate::federation::events::{FileSynchronizationEvent, SynchronizationEvent};
use crate::federation::latch::InitialSnapshotLatch;
use crate::federation::model::{DocInfo, DocMetaFileRef, Fingerprint};
use crate::federation::reconciler::{self, ReconcileSide};
use crate::federation::replicating_listener::ReplicatingListener;
use crate::federation::sync_doc::{BoxFuture, SyncDocMap};
use crate::federation::write_coordinator::{self, MutationAck};
use crate::federation::{no_op_listener, AsyncSnapshotListener};
use crate::util::Unsubscribe;

/// Implements the datastore contract by federating a local and a cloud tier
/// (spec.md §2 C8, §4.8). State: immutable references to both tiers, a
/// lazily-opened primary snapshot, two event dispatchers, and one
/// Comparison Index.
pub struct FederatedDatastore {
    local: Arc<dyn Datastore>,
    cloud: Arc<dyn Datastore>,
    comparison_index: Arc<ComparisonIndex>,
    sync_dispatcher: Arc<EventDispatcher<SynchronizationEvent>>,
    file_sync_dispatcher: Arc<EventDispatcher<FileSynchronizationEvent>>,
    config: FederationConfig,
    primary_established: AtomicBool,
    primary_unsubscribe: AsyncMutex<Option<Unsubscribe>>,
    snapshot_id_seq: AtomicI64,
}

impl FederatedDatastore {
    pub fn new(local: Arc<dyn Datastore>, cloud: Arc<dyn Datastore>, config: FederationConfig) -> Arc<Self> {
        let snapshot_id_seq = AtomicI64::new(config.snapshot_id_seed());
        Arc::new(Self {
            local,
            cloud,
            comparison_index: Arc::new(ComparisonIndex::new()),
            sync_dispatcher: Arc::new(EventDispatcher::new()),
            file_sync_dispatcher: Arc::new(EventDispatcher::new()),
            config,
            primary_established: AtomicBool::new(false),
            primary_unsubscribe: AsyncMutex::new(None),
            snapshot_id_seq,
        })
    }

    /// Next id for an observability-only snapshot counter (spec.md §9:
    /// "has no correctness role").
    pub fn next_snapshot_id(&self) -> i64 {
        self.snapshot_id_seq.fetch_add(1, Ordering::SeqCst)
    }

    pub fn comparison_index(&self) -> &Arc<ComparisonIndex> {
        &self.comparison_index
    }

    pub fn sync_dispatcher(&self) -> &Arc<EventDispatcher<SynchronizationEvent>> {
        &self.sync_dispatcher
    }

    pub fn file_sync_dispatcher(&self) -> &Arc<EventDispatcher<FileSynchronizationEvent>> {
        &self.file_sync_dispatcher
    }

    /// Initializes both tiers in parallel, then opens the primary snapshot
    /// with a no-op listener (spec.md §4.8 `init`). Fails if either tier's
    /// init fails.
    pub async fn init(&self, error_listener: Option<AsyncErrorListener>) -> DatastoreResult<()> {
        let (local_result, cloud_result) =
            futures::future::join(self.local.init(error_listener.clone()), self.cloud.init(error_listener.clone())).await;
        local_result.map_err(|err| error::init_failure(format!("local tier init failed: {err}")))?;
        cloud_result.map_err(|err| error::init_failure(format!("cloud tier init failed: {err}")))?;

        let handle = self.snapshot(no_op_listener(), error_listener).await?;
        *self.primary_unsubscribe.lock().await = handle.unsubscribe;
        Ok(())
    }

    /// Unsubscribes the primary snapshot if present, then stops both tiers
    /// in parallel (spec.md §4.8 `stop`).
    pub async fn stop(&self) {
        if let Some(unsubscribe) = self.primary_unsubscribe.lock().await.take() {
            unsubscribe();
        }
        futures::future::join(self.local.stop(), self.cloud.stop()).await;
    }

    pub async fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.local.contains(fingerprint).await
    }

    pub async fn get_doc_meta(&self, fingerprint: &Fingerprint) -> DatastoreResult<Option<serde_json::Value>> {
        self.local.get_doc_meta(fingerprint).await
    }

    pub async fn get_file(&self, backend: &str, file_ref: &DocMetaFileRef) -> DatastoreResult<Option<DatastoreFile>> {
        self.local.get_file(backend, file_ref).await
    }

    pub async fn contains_file(&self, backend: &str, file_ref: &DocMetaFileRef) -> bool {
        self.local.contains_file(backend, file_ref).await
    }

    pub async fn get_doc_meta_files(&self) -> DatastoreResult<Vec<DocMetaFileRef>> {
        self.local.get_doc_meta_files().await
    }

    /// Writes to cloud first, then local; returns the local handle (spec.md
    /// §4.8 `writeFile`).
    pub async fn write_file(
        &self,
        backend: &str,
        file_ref: &DocMetaFileRef,
        data: Bytes,
        meta: serde_json::Value,
    ) -> DatastoreResult<DatastoreFile> {
        self.cloud.write_file(backend, file_ref, data.clone(), meta.clone()).await?;
        self.local.write_file(backend, file_ref, data, meta).await
    }

    /// Cloud then local, sequentially, to avoid leaving a local orphan
    /// after a transient cloud failure (spec.md §4.7).
    pub async fn delete_file(&self, backend: &str, file_ref: &DocMetaFileRef) -> DatastoreResult<()> {
        self.cloud.delete_file(backend, file_ref).await?;
        self.local.delete_file(backend, file_ref).await
    }

    /// Federated write via the Write Coordinator; the Comparison Index is
    /// updated with `doc_info` once the write completes, whether it
    /// succeeded or failed (spec.md §4.8 `write`, §9 "post-condition hooks
    /// ... registered before the write is started").
    pub fn write(&self, fingerprint: Fingerprint, data: serde_json::Value, doc_info: DocInfo) -> MutationAck {
        let MutationAck { written, committed } = write_coordinator::coordinate_write(
            Arc::clone(&self.cloud),
            Arc::clone(&self.local),
            fingerprint,
            data,
            doc_info.clone(),
        );
        let index = Arc::clone(&self.comparison_index);
        let committed: BoxFuture<'static, DatastoreResult<()>> = async move {
            let result = committed.await;
            index.put(&doc_info);
            result
        }
        .boxed();
        MutationAck { written, committed }
    }

    /// Federated delete via the Write Coordinator; removes
    /// `doc_meta_file_ref.fingerprint` from the Comparison Index regardless
    /// of outcome (spec.md §4.8 `delete`).
    pub fn delete(&self, doc_meta_file_ref: DocMetaFileRef) -> MutationAck {
        let fingerprint = doc_meta_file_ref.fingerprint.clone();
        let MutationAck { written, committed } =
            write_coordinator::coordinate_delete(Arc::clone(&self.cloud), Arc::clone(&self.local), doc_meta_file_ref);
        let index = Arc::clone(&self.comparison_index);
        let committed: BoxFuture<'static, DatastoreResult<()>> = async move {
            let result = committed.await;
            index.remove(&fingerprint);
            result
        }
        .boxed();
        MutationAck { written, committed }
    }

    /// Builds a fresh pair of Initial-Snapshot Latches and a fresh
    /// Replicating Listener, attaches them to both tiers, awaits both
    /// latches, and — only if this is the primary snapshot — runs the
    /// Two-Way Reconciler in both directions and marks initial sync
    /// complete (spec.md §4.8 `snapshot`).
    pub async fn snapshot(
        &self,
        listener: AsyncSnapshotListener,
        error_listener: Option<AsyncErrorListener>,
    ) -> DatastoreResult<SnapshotHandle> {
        let is_primary = self
            .primary_established
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();

        // One Dedup Listener shared between every path that can deliver the
        // same (fingerprint, uuid) to the caller: a tier's own live/initial
        // snapshot stream (forwarded through the Replicating Listener below)
        // and the Two-Way Reconciler's synthetic events (spec.md §4.3). Two
        // independently-seeded dedup sets would each see a "first" delivery
        // and let it through, so the caller would still observe the same row
        // twice — wrapping `listener` once, here, is what actually satisfies
        // §8's "no duplicates on (fingerprint, uuid)" invariant.
        let dedup = Arc::new(DedupListener::new());
        let deduped_listener = dedup.wrap(listener);

        let replicating = ReplicatingListener::new(
            Arc::clone(&self.local),
            Arc::clone(&deduped_listener),
            error_listener.clone(),
            Arc::clone(&self.sync_dispatcher),
        );

        let local_latch = InitialSnapshotLatch::new();
        let cloud_latch = InitialSnapshotLatch::new();

        local_latch
            .attach(&*self.local, replicating.listener_for(true), error_listener.clone())
            .await?;
        let cloud_handle = cloud_latch
            .attach(&*self.cloud, replicating.listener_for(false), error_listener.clone())
            .await?;

        local_latch.released().await;
        cloud_latch.released().await;

        if is_primary {
            let local_map = local_latch.take_sync_doc_map();
            let cloud_map = cloud_latch.take_sync_doc_map();
            self.reconcile_both_directions(local_map, cloud_map, deduped_listener, error_listener)
                .await;
            replicating.mark_initial_sync_completed();
        }

        Ok(cloud_handle)
    }

    async fn reconcile_both_directions(
        &self,
        local_map: SyncDocMap,
        cloud_map: SyncDocMap,
        dedup_listener: AsyncSnapshotListener,
        error_listener: Option<AsyncErrorListener>,
    ) {
        let local_side = |map: &SyncDocMap| ReconcileSide { persistence: &*self.local, sync_doc_map: map };
        let cloud_side = |map: &SyncDocMap| ReconcileSide { persistence: &*self.cloud, sync_doc_map: map };

        match self.config.reconcile_order() {
            ReconcileOrder::LocalFirst => {
                reconciler::synchronize(
                    local_side(&local_map),
                    cloud_side(&cloud_map),
                    Arc::clone(&dedup_listener),
                    error_listener.clone(),
                )
                .await;
                reconciler::synchronize(cloud_side(&cloud_map), local_side(&local_map), dedup_listener, error_listener).await;
            }
            ReconcileOrder::CloudFirst => {
                reconciler::synchronize(
                    cloud_side(&cloud_map),
                    local_side(&local_map),
                    Arc::clone(&dedup_listener),
                    error_listener.clone(),
                )
                .await;
                reconciler::synchronize(local_side(&local_map), cloud_side(&cloud_map), dedup_listener, error_listener).await;
            }
        }
    }

    /// Registers a listener for `SynchronizationEvent`s, fanned out through
    /// C2 (spec.md §4.8 "Listener registration: simple fan-out through
    /// C2").
    pub fn add_sync_listener(
        self: &Arc<Self>,
        listener: crate::federation::dispatcher::Listener<SynchronizationEvent>,
    ) -> Unsubscribe {
        self.sync_dispatcher.add_listener(listener)
    }

    pub fn add_file_sync_listener(
        self: &Arc<Self>,
        listener: crate::federation::dispatcher::Listener<FileSynchronizationEvent>,
    ) -> Unsubscribe {
        self.file_sync_dispatcher.add_listener(listener)
    }
}
