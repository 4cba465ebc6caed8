use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::channel::oneshot;

use crate::error::DatastoreResult;
use crate::federation::datastore::{AsyncErrorListener, Datastore, SnapshotHandle};
use crate::federation::sync_doc::{apply_resolved, box_future, resolve_event, DocMetaSnapshotEvent, SyncDocMap};
use crate::federation::AsyncSnapshotListener;

/// `{syncDocMap, done}` single-shot gate that releases on the first
/// committed, batch-terminated event from one side (spec.md §2 C4, §4.4).
/// One instance is created per tier per primary snapshot; re-architected as
/// an explicit struct rather than a closure capturing outer state (spec.md
/// §9, first design note).
pub struct InitialSnapshotLatch {
    sync_doc_map: Mutex<SyncDocMap>,
    done: AtomicBool,
    release_tx: Mutex<Option<oneshot::Sender<()>>>,
    release_rx: Mutex<Option<oneshot::Receiver<()>>>,
}

impl InitialSnapshotLatch {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = oneshot::channel();
        Arc::new(Self {
            sync_doc_map: Mutex::new(SyncDocMap::new()),
            done: AtomicBool::new(false),
            release_tx: Mutex::new(Some(tx)),
            release_rx: Mutex::new(Some(rx)),
        })
    }

    /// Opens a snapshot on `datastore` with a listener that always forwards
    /// to `replicating_listener`, folds mutations into the internal
    /// `SyncDocMap` until released, and releases on the first
    /// committed+terminated batch (spec.md §4.4).
    pub async fn attach(
        self: &Arc<Self>,
        datastore: &(dyn Datastore),
        replicating_listener: AsyncSnapshotListener,
        error_listener: Option<AsyncErrorListener>,
    ) -> DatastoreResult<SnapshotHandle> {
        let latch = Arc::clone(self);
        let listener: AsyncSnapshotListener = Arc::new(move |event: DocMetaSnapshotEvent| {
            let latch = Arc::clone(&latch);
            let replicating_listener = Arc::clone(&replicating_listener);
            box_future(async move { latch.on_event(event, replicating_listener).await })
        });
        datastore.snapshot(listener, error_listener).await
    }

    async fn on_event(
        &self,
        event: DocMetaSnapshotEvent,
        replicating_listener: AsyncSnapshotListener,
    ) -> DatastoreResult<()> {
        let should_release = !self.done.load(Ordering::SeqCst) && event.is_committed_and_terminated();
        let forward_result = replicating_listener(event.clone()).await;

        if !self.done.load(Ordering::SeqCst) {
            // Resolve providers before taking the lock: `resolve_event` awaits
            // each mutation's `docInfoProvider`, and a `std::sync::MutexGuard`
            // must never be held across an `.await` (it is `!Send`, which
            // would make this listener's future `!Send` too). `apply_resolved`
            // is synchronous, so the guard below is held only for a plain map
            // mutation.
            let resolved = resolve_event(&event).await?;
            let mut map = self.sync_doc_map.lock().unwrap();
            apply_resolved(&mut map, resolved);
        }

        if should_release && !self.done.swap(true, Ordering::SeqCst) {
            if let Some(tx) = self.release_tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
        }

        forward_result
    }

    /// Blocks until the latch releases. May only be awaited once.
    pub async fn released(&self) {
        let rx = self.release_rx.lock().unwrap().take();
        if let Some(rx) = rx {
            let _ = rx.await;
        }
    }

    /// Takes ownership of the accumulated `SyncDocMap`, leaving an empty map
    /// behind. Called once, after `released()` resolves, to hand the frozen
    /// snapshot off to the Two-Way Reconciler (spec.md §3 "frozen at latch
    /// release; discarded after reconciliation").
    pub fn take_sync_doc_map(&self) -> SyncDocMap {
        mem::take(&mut self.sync_doc_map.lock().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::datastore::{DeleteResult, InitResult, MutationSink};
    use crate::federation::model::{DocInfo, DocMetaFileRef, Fingerprint, MutationType, Uuid};
    use crate::federation::sync_doc::{Batch, Consistency, DocMetaMutation};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;

    struct StubTier {
        events: Vec<DocMetaSnapshotEvent>,
    }

    #[async_trait]
    impl Datastore for StubTier {
        async fn init(&self, _error_listener: Option<AsyncErrorListener>) -> DatastoreResult<InitResult> {
            Ok(InitResult)
        }
        async fn stop(&self) {}
        async fn contains(&self, _fingerprint: &Fingerprint) -> bool {
            false
        }
        async fn get_doc_meta(&self, _fingerprint: &Fingerprint) -> DatastoreResult<Option<serde_json::Value>> {
            Ok(None)
        }
        async fn write(
            &self,
            _fingerprint: &Fingerprint,
            _data: serde_json::Value,
            _doc_info: DocInfo,
            mut sink: MutationSink,
        ) -> DatastoreResult<()> {
            sink.resolve_both(Ok(()));
            Ok(())
        }
        async fn delete(
            &self,
            _doc_meta_file_ref: &DocMetaFileRef,
            mut sink: MutationSink,
        ) -> DatastoreResult<DeleteResult> {
            sink.resolve_both(Ok(()));
            Ok(DeleteResult)
        }
        async fn write_file(
            &self,
            _backend: &str,
            file_ref: &DocMetaFileRef,
            data: Bytes,
            _meta: serde_json::Value,
        ) -> DatastoreResult<crate::federation::datastore::DatastoreFile> {
            Ok(crate::federation::datastore::DatastoreFile {
                file_ref: file_ref.clone(),
                data,
                content_type: None,
            })
        }
        async fn get_file(
            &self,
            _backend: &str,
            _file_ref: &DocMetaFileRef,
        ) -> DatastoreResult<Option<crate::federation::datastore::DatastoreFile>> {
            Ok(None)
        }
        async fn contains_file(&self, _backend: &str, _file_ref: &DocMetaFileRef) -> bool {
            false
        }
        async fn delete_file(&self, _backend: &str, _file_ref: &DocMetaFileRef) -> DatastoreResult<()> {
            Ok(())
        }
        async fn get_doc_meta_files(&self) -> DatastoreResult<Vec<DocMetaFileRef>> {
            Ok(Vec::new())
        }
        async fn snapshot(
            &self,
            listener: AsyncSnapshotListener,
            _error_listener: Option<AsyncErrorListener>,
        ) -> DatastoreResult<SnapshotHandle> {
            for event in self.events.clone() {
                listener(event).await?;
            }
            Ok(SnapshotHandle { unsubscribe: None })
        }
    }

    fn mutation_for(fingerprint: &str, uuid: &str) -> DocMetaMutation {
        let fp = Fingerprint::new(fingerprint);
        let uuid_owned = Uuid::new(uuid);
        let info_fp = fp.clone();
        DocMetaMutation::new(
            fp,
            MutationType::Created,
            Arc::new(move || {
                let fp = info_fp.clone();
                let uuid = uuid_owned.clone();
                box_future(async move {
                    Ok(DocInfo {
                        fingerprint: fp.clone(),
                        uuid: Some(uuid),
                        nonce: "n".into(),
                        doc_meta_file_ref: DocMetaFileRef::new(fp),
                    })
                })
            }),
            Arc::new(|| box_future(async move { Ok(serde_json::json!({})) })),
        )
    }

    #[tokio::test]
    async fn releases_on_committed_terminated_and_freezes_map() {
        let tier = StubTier {
            events: vec![
                DocMetaSnapshotEvent {
                    consistency: Consistency::Written,
                    batch: Some(Batch { id: 1, terminated: false }),
                    doc_meta_mutations: vec![mutation_for("f1", "u1")],
                },
                DocMetaSnapshotEvent {
                    consistency: Consistency::Committed,
                    batch: Some(Batch { id: 1, terminated: true }),
                    doc_meta_mutations: vec![mutation_for("f2", "u1")],
                },
            ],
        };

        let latch = InitialSnapshotLatch::new();
        let forwarded = Arc::new(AtomicUsize::new(0));
        let forwarded2 = Arc::clone(&forwarded);
        let replicating: AsyncSnapshotListener = Arc::new(move |_event| {
            forwarded2.fetch_add(1, Ordering::SeqCst);
            box_future(async { Ok(()) })
        });

        latch.attach(&tier, replicating, None).await.unwrap();
        latch.released().await;

        assert_eq!(forwarded.load(Ordering::SeqCst), 2);
        let map = latch.take_sync_doc_map();
        assert_eq!(map.len(), 2);
        assert!(map.contains_key(&Fingerprint::new("f1")));
        assert!(map.contains_key(&Fingerprint::new("f2")));
    }
}
