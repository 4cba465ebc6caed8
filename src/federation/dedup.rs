use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::error::DatastoreResult;
use crate::federation::model::{Fingerprint, Uuid};
use crate::federation::sync_doc::{box_future, DocMetaSnapshotEvent};
use crate::federation::AsyncSnapshotListener;

/// Wraps a downstream listener and suppresses redelivery of a
/// `(fingerprint, uuid)` pair already observed (spec.md §2 C3, §4.3). The
/// same committed row is often observed both by a tier's own snapshot and
/// again through the reconciler's synthetic event; this is what keeps the
/// caller from seeing it twice.
///
/// The filter set lives for as long as the returned listener is retained —
/// callers create one `DedupListener` per primary snapshot and share it
/// between the reconciler and the replicating listener (spec.md §4.5/§4.6),
/// so a row reconciled in one direction is not re-delivered when observed
/// again from the other tier's live stream.
pub struct DedupListener {
    seen: Mutex<HashSet<(Fingerprint, Option<Uuid>)>>,
}

impl Default for DedupListener {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupListener {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Factory: `wrap(downstream) -> listener` (spec.md §4.3).
    pub fn wrap(self: &Arc<Self>, downstream: AsyncSnapshotListener) -> AsyncSnapshotListener {
        let dedup = Arc::clone(self);
        Arc::new(move |event: DocMetaSnapshotEvent| {
            let dedup = Arc::clone(&dedup);
            let downstream = Arc::clone(&downstream);
            box_future(async move { dedup.filter_and_forward(event, downstream).await })
        })
    }

    async fn filter_and_forward(
        &self,
        event: DocMetaSnapshotEvent,
        downstream: AsyncSnapshotListener,
    ) -> DatastoreResult<()> {
        // An event with no mutations at all (e.g. an empty batch's
        // committed+terminated marker) isn't a redelivery of anything — it
        // carries no `(fingerprint, uuid)` pair to have seen before — so it
        // always passes through untouched. Only an event that originally had
        // mutations but whose mutations are now all duplicates is dropped.
        let had_mutations = !event.doc_meta_mutations.is_empty();

        let mut retained = Vec::with_capacity(event.doc_meta_mutations.len());
        for mutation in event.doc_meta_mutations {
            let doc_info = mutation.doc_info().await?;
            let key = (mutation.fingerprint.clone(), doc_info.uuid.clone());
            let first_seen = self.seen.lock().unwrap().insert(key);
            if first_seen {
                retained.push(mutation);
            }
        }

        if had_mutations && retained.is_empty() {
            return Ok(());
        }

        let filtered = DocMetaSnapshotEvent {
            consistency: event.consistency,
            batch: event.batch,
            doc_meta_mutations: retained,
        };
        downstream(filtered).await
    }
}
