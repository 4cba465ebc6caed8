use std::cmp::Ordering;
use std::sync::Arc;

use crate::error;
use crate::federation::datastore::{AsyncErrorListener, Datastore, MutationSink};
use crate::federation::model::{compare_uuids, DocInfo, Fingerprint, MutationType};
use crate::federation::sync_doc::{box_future, Batch, Consistency, DocMetaMutation, DocMetaSnapshotEvent, SyncDocMap};
use crate::federation::AsyncSnapshotListener;

/// One side of a reconciliation pass: a tier's persistence handle plus the
/// frozen `SyncDocMap` its Initial-Snapshot Latch accumulated (spec.md §4.5
/// "each side is `{persistence, syncDocMap}`").
pub struct ReconcileSide<'a> {
    pub persistence: &'a dyn Datastore,
    pub sync_doc_map: &'a SyncDocMap,
}

/// Copies every document present on `source` that is missing or older on
/// `target` (spec.md §2 C5, §4.5). Run once per direction; the facade calls
/// this twice, with the sides swapped, to achieve full two-way
/// synchronization. `listener` should already be wrapped by the shared
/// Dedup Listener so the caller never observes the same row twice across
/// both passes.
pub async fn synchronize(
    source: ReconcileSide<'_>,
    target: ReconcileSide<'_>,
    listener: AsyncSnapshotListener,
    error_listener: Option<AsyncErrorListener>,
) {
    for (fingerprint, source_doc) in source.sync_doc_map.iter() {
        let target_doc = target.sync_doc_map.get(fingerprint);
        let newer_on_source = match target_doc {
            None => true,
            Some(target_doc) => {
                compare_uuids(source_doc.uuid.as_ref(), target_doc.uuid.as_ref()) == Ordering::Greater
            }
        };
        if !newer_on_source {
            continue;
        }

        if let Err(err) = copy_one(
            fingerprint,
            source_doc.uuid.clone(),
            source_doc.doc_meta_file_ref.clone(),
            source.persistence,
            target.persistence,
            &listener,
        )
        .await
        {
            log::warn!("federation: reconcile copy failed for fingerprint {fingerprint}: {err}");
            if let Some(error_listener) = &error_listener {
                error_listener(&err);
            }
        }
    }
}

async fn copy_one(
    fingerprint: &Fingerprint,
    uuid: Option<crate::federation::model::Uuid>,
    doc_meta_file_ref: crate::federation::model::DocMetaFileRef,
    source: &dyn Datastore,
    target: &dyn Datastore,
    listener: &AsyncSnapshotListener,
) -> error::DatastoreResult<()> {
    let doc_meta = source
        .get_doc_meta(fingerprint)
        .await?
        .ok_or_else(|| error::reconcile_copy_error(format!("source has no DocMeta for {fingerprint}")))?;

    // nonce is not tracked by SyncDoc (spec.md §3); reconciler-originated
    // DocInfo carries an empty one, matching the documented field gap.
    let doc_info = DocInfo {
        fingerprint: fingerprint.clone(),
        uuid,
        nonce: String::new(),
        doc_meta_file_ref,
    };

    target
        .write(fingerprint, doc_meta.clone(), doc_info.clone(), MutationSink::no_op())
        .await?;

    let event = synthetic_event(fingerprint.clone(), doc_info, doc_meta);
    listener(event).await
}

/// Builds the synthetic `DocMetaSnapshotEvent` described by spec.md §4.5:
/// `{consistency: committed, mutationType: created-or-updated}`, with
/// providers that return the already-fetched values immediately.
fn synthetic_event(
    fingerprint: Fingerprint,
    doc_info: DocInfo,
    doc_meta: serde_json::Value,
) -> DocMetaSnapshotEvent {
    let mutation = DocMetaMutation::new(
        fingerprint,
        MutationType::Updated,
        Arc::new(move || {
            let doc_info = doc_info.clone();
            box_future(async move { Ok(doc_info) })
        }),
        Arc::new(move || {
            let doc_meta = doc_meta.clone();
            box_future(async move { Ok(doc_meta) })
        }),
    );
    DocMetaSnapshotEvent {
        consistency: Consistency::Committed,
        batch: Some(Batch { id: 0, terminated: true }),
        doc_meta_mutations: vec![mutation],
    }
}
