use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_lock::Mutex as AsyncMutex;

use crate::error;
use crate::federation::datastore::{AsyncErrorListener, Datastore, MutationSink};
use crate::federation::events::{Dest, SynchronizationEvent};
use crate::federation::model::MutationType;
use crate::federation::sync_doc::{box_future, Consistency, DocMetaSnapshotEvent};
use crate::federation::{AsyncSnapshotListener, EventDispatcher};

/// Created per primary snapshot; receives events from both tiers' Initial-
/// Snapshot Latches (spec.md §2 C6, §4.6). Before initial sync completes it
/// only forwards events to the caller's snapshot listener. After initial
/// sync, committed events observed on the non-local side are applied to the
/// local tier and a `SynchronizationEvent` is dispatched.
pub struct ReplicatingListener {
    local: Arc<dyn Datastore>,
    caller_listener: AsyncSnapshotListener,
    error_listener: Option<AsyncErrorListener>,
    sync_dispatcher: Arc<EventDispatcher<SynchronizationEvent>>,
    initial_sync_completed: AtomicBool,
    // Serializes mutation application per event, and across events, so a
    // later committed event cannot apply before an earlier one finishes
    // (spec.md §5 "Ordering guarantees").
    apply_lock: AsyncMutex<()>,
}

impl ReplicatingListener {
    pub fn new(
        local: Arc<dyn Datastore>,
        caller_listener: AsyncSnapshotListener,
        error_listener: Option<AsyncErrorListener>,
        sync_dispatcher: Arc<EventDispatcher<SynchronizationEvent>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            local,
            caller_listener,
            error_listener,
            sync_dispatcher,
            initial_sync_completed: AtomicBool::new(false),
            apply_lock: AsyncMutex::new(()),
        })
    }

    pub fn mark_initial_sync_completed(&self) {
        self.initial_sync_completed.store(true, Ordering::SeqCst);
    }

    /// Returns a listener closure suitable for `InitialSnapshotLatch::attach`
    /// (spec.md §4.4 point (a): "always forwards the event to the Replicating
    /// Listener"). `is_local_origin` tells the listener whether the events it
    /// will receive through this handle originate from the local tier (only
    /// non-local, committed events are ever applied).
    pub fn listener_for(self: &Arc<Self>, is_local_origin: bool) -> AsyncSnapshotListener {
        let this = Arc::clone(self);
        Arc::new(move |event: DocMetaSnapshotEvent| {
            let this = Arc::clone(&this);
            box_future(async move { this.on_event(event, is_local_origin).await })
        })
    }

    async fn on_event(&self, event: DocMetaSnapshotEvent, is_local_origin: bool) -> error::DatastoreResult<()> {
        // Caller sees reconciliation effects first, then live events, so
        // forwarding happens before any local application (spec.md §4.6).
        let forward_result = (self.caller_listener)(event.clone()).await;

        if !self.initial_sync_completed.load(Ordering::SeqCst) {
            return forward_result;
        }
        if is_local_origin || event.consistency != Consistency::Committed {
            return forward_result;
        }

        let _guard = self.apply_lock.lock().await;
        for mutation in &event.doc_meta_mutations {
            if let Err(err) = self.apply_one(mutation).await {
                let err = error::replicate_apply_error(format!(
                    "replicate apply failed for fingerprint {}: {err}",
                    mutation.fingerprint
                ));
                log::warn!("federation: {err}");
                if let Some(error_listener) = &self.error_listener {
                    error_listener(&err);
                }
            }
        }
        self.sync_dispatcher.dispatch(&SynchronizationEvent {
            consistency: event.consistency,
            batch: event.batch,
            dest: Dest::Local,
            mutation_type: event
                .doc_meta_mutations
                .first()
                .map(|m| m.mutation_type)
                .unwrap_or(MutationType::Updated),
            fingerprint: event
                .doc_meta_mutations
                .first()
                .map(|m| m.fingerprint.clone())
                .unwrap_or_else(|| crate::federation::model::Fingerprint::new("")),
        });

        forward_result
    }

    async fn apply_one(
        &self,
        mutation: &crate::federation::sync_doc::DocMetaMutation,
    ) -> error::DatastoreResult<()> {
        match mutation.mutation_type {
            MutationType::Created | MutationType::Updated => {
                let doc_meta = mutation.doc_meta().await?;
                let doc_info = mutation.doc_info().await?;
                self.local
                    .write(&mutation.fingerprint, doc_meta, doc_info, MutationSink::no_op())
                    .await
            }
            MutationType::Deleted => {
                let doc_info = mutation.doc_info().await?;
                self.local
                    .delete(&doc_info.doc_meta_file_ref, MutationSink::no_op())
                    .await
                    .map(|_| ())
            }
        }
    }
}
