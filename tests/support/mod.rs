use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_lock::Mutex;
use async_trait::async_trait;
use bytes::Bytes;

use federated_docstore::error::DatastoreResult;
use federated_docstore::federation::datastore::{
    AsyncErrorListener, DatastoreFile, DeleteResult, InitResult, MutationSink, SnapshotHandle,
};
use federated_docstore::federation::model::{DocInfo, DocMetaFileRef, Fingerprint, MutationType, Uuid};
use federated_docstore::federation::sync_doc::{
    box_future, Batch, Consistency, DocMetaMutation, DocMetaSnapshotEvent,
};
use federated_docstore::federation::{AsyncSnapshotListener, Datastore};

/// In-memory `Datastore` test double (grounded on `firestore::local::memory`'s
/// in-memory local store). `snapshot` replays every currently stored
/// document as a single committed+terminated batch, then keeps the
/// listener around so `push_committed` can drive further events through it
/// — enough surface to exercise the facade's reconcile/replicate paths
/// without a real backend.
pub struct MemoryDatastore {
    docs: Mutex<BTreeMap<Fingerprint, (serde_json::Value, DocInfo)>>,
    files: Mutex<BTreeMap<(String, Fingerprint), DatastoreFile>>,
    listeners: StdMutex<Vec<AsyncSnapshotListener>>,
    next_batch_id: AtomicI64,
}

impl MemoryDatastore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            docs: Mutex::new(BTreeMap::new()),
            files: Mutex::new(BTreeMap::new()),
            listeners: StdMutex::new(Vec::new()),
            next_batch_id: AtomicI64::new(1),
        })
    }

    /// Seeds a document as if it already existed before any snapshot opened.
    pub async fn seed(&self, fingerprint: &str, uuid: &str, doc_meta: serde_json::Value) {
        let fp = Fingerprint::new(fingerprint);
        let doc_info = DocInfo {
            fingerprint: fp.clone(),
            uuid: Some(Uuid::new(uuid)),
            nonce: "seed".into(),
            doc_meta_file_ref: DocMetaFileRef::new(fp.clone()),
        };
        self.docs.lock().await.insert(fp, (doc_meta, doc_info));
    }

    pub async fn doc_meta(&self, fingerprint: &str) -> Option<serde_json::Value> {
        self.docs
            .lock()
            .await
            .get(&Fingerprint::new(fingerprint))
            .map(|(meta, _)| meta.clone())
    }

    /// Pushes a committed, batch-terminated event with the given mutations
    /// to every listener registered since `snapshot` was called, simulating
    /// a live update arriving on this tier after initial sync.
    pub async fn push_committed(&self, mutations: Vec<(Fingerprint, MutationType, Option<Uuid>, serde_json::Value)>) {
        let batch_id = self.next_batch_id.fetch_add(1, Ordering::SeqCst);
        let doc_meta_mutations = mutations
            .into_iter()
            .map(|(fingerprint, mutation_type, uuid, doc_meta)| build_mutation(fingerprint, mutation_type, uuid, doc_meta))
            .collect();
        let event = DocMetaSnapshotEvent {
            consistency: Consistency::Committed,
            batch: Some(Batch { id: batch_id, terminated: true }),
            doc_meta_mutations,
        };
        let listeners: Vec<AsyncSnapshotListener> = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            let _ = listener(event.clone()).await;
        }
    }
}

fn build_mutation(
    fingerprint: Fingerprint,
    mutation_type: MutationType,
    uuid: Option<Uuid>,
    doc_meta: serde_json::Value,
) -> DocMetaMutation {
    let info_fp = fingerprint.clone();
    let info_uuid = uuid.clone();
    DocMetaMutation::new(
        fingerprint,
        mutation_type,
        Arc::new(move || {
            let fingerprint = info_fp.clone();
            let uuid = info_uuid.clone();
            box_future(async move {
                Ok(DocInfo {
                    fingerprint: fingerprint.clone(),
                    uuid,
                    nonce: "live".into(),
                    doc_meta_file_ref: DocMetaFileRef::new(fingerprint),
                })
            })
        }),
        Arc::new(move || {
            let doc_meta = doc_meta.clone();
            box_future(async move { Ok(doc_meta) })
        }),
    )
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn init(&self, _error_listener: Option<AsyncErrorListener>) -> DatastoreResult<InitResult> {
        Ok(InitResult)
    }

    async fn stop(&self) {}

    async fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.docs.lock().await.contains_key(fingerprint)
    }

    async fn get_doc_meta(&self, fingerprint: &Fingerprint) -> DatastoreResult<Option<serde_json::Value>> {
        Ok(self.docs.lock().await.get(fingerprint).map(|(meta, _)| meta.clone()))
    }

    async fn write(
        &self,
        fingerprint: &Fingerprint,
        data: serde_json::Value,
        doc_info: DocInfo,
        mut sink: MutationSink,
    ) -> DatastoreResult<()> {
        self.docs.lock().await.insert(fingerprint.clone(), (data, doc_info));
        sink.resolve_both(Ok(()));
        Ok(())
    }

    async fn delete(&self, doc_meta_file_ref: &DocMetaFileRef, mut sink: MutationSink) -> DatastoreResult<DeleteResult> {
        self.docs.lock().await.remove(&doc_meta_file_ref.fingerprint);
        sink.resolve_both(Ok(()));
        Ok(DeleteResult)
    }

    async fn write_file(
        &self,
        backend: &str,
        file_ref: &DocMetaFileRef,
        data: Bytes,
        _meta: serde_json::Value,
    ) -> DatastoreResult<DatastoreFile> {
        let file = DatastoreFile { file_ref: file_ref.clone(), data, content_type: None };
        self.files
            .lock()
            .await
            .insert((backend.to_string(), file_ref.fingerprint.clone()), file.clone());
        Ok(file)
    }

    async fn get_file(&self, backend: &str, file_ref: &DocMetaFileRef) -> DatastoreResult<Option<DatastoreFile>> {
        Ok(self
            .files
            .lock()
            .await
            .get(&(backend.to_string(), file_ref.fingerprint.clone()))
            .cloned())
    }

    async fn contains_file(&self, backend: &str, file_ref: &DocMetaFileRef) -> bool {
        self.files
            .lock()
            .await
            .contains_key(&(backend.to_string(), file_ref.fingerprint.clone()))
    }

    async fn delete_file(&self, backend: &str, file_ref: &DocMetaFileRef) -> DatastoreResult<()> {
        self.files.lock().await.remove(&(backend.to_string(), file_ref.fingerprint.clone()));
        Ok(())
    }

    async fn get_doc_meta_files(&self) -> DatastoreResult<Vec<DocMetaFileRef>> {
        Ok(self.docs.lock().await.values().map(|(_, info)| info.doc_meta_file_ref.clone()).collect())
    }

    async fn snapshot(
        &self,
        listener: AsyncSnapshotListener,
        error_listener: Option<AsyncErrorListener>,
    ) -> DatastoreResult<SnapshotHandle> {
        let mutations: Vec<DocMetaMutation> = self
            .docs
            .lock()
            .await
            .iter()
            .map(|(fingerprint, (doc_meta, doc_info))| {
                build_mutation(fingerprint.clone(), MutationType::Created, doc_info.uuid.clone(), doc_meta.clone())
            })
            .collect();
        let batch_id = self.next_batch_id.fetch_add(1, Ordering::SeqCst);
        let event = DocMetaSnapshotEvent {
            consistency: Consistency::Committed,
            batch: Some(Batch { id: batch_id, terminated: true }),
            doc_meta_mutations: mutations,
        };
        // An underlying snapshot callback throwing is reported via the
        // error listener, not propagated; the snapshot continues to
        // register the listener for later `push_committed` deliveries.
        if let Err(err) = listener(event).await {
            let err =
                federated_docstore::error::snapshot_source_error(format!("initial snapshot delivery failed: {err}"));
            if let Some(error_listener) = &error_listener {
                error_listener(&err);
            }
        }
        self.listeners.lock().unwrap().push(listener);
        Ok(SnapshotHandle { unsubscribe: None })
    }
}
