use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::DatastoreResult;
use crate::federation::model::{DocInfo, DocMetaFileRef, Fingerprint, MutationType, Uuid};

/// Boxed, owned future — the shape providers in this module return, mirroring
/// the `RemoteStoreFuture` boxed-future alias `firestore::remote::remote_syncer`
/// uses for its own callback-heavy trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub fn box_future<'a, F>(future: F) -> BoxFuture<'a, F::Output>
where
    F: Future + Send + 'a,
{
    Box::pin(future)
}

/// Lazily fetches the `DocInfo` header for a mutation. Call sites invoke this
/// at most once per consumer on demand (spec.md §3).
pub type DocInfoProvider = Arc<dyn Fn() -> BoxFuture<'static, DatastoreResult<DocInfo>> + Send + Sync>;

/// Lazily fetches the full `DocMeta` payload. The payload itself is opaque
/// (spec.md §1: "the document metadata schema itself ... treated as opaque
/// payload"), represented as JSON so it can cross the async boundary without
/// the core needing to know its shape.
pub type DocMetaProvider =
    Arc<dyn Fn() -> BoxFuture<'static, DatastoreResult<serde_json::Value>> + Send + Sync>;

/// `{fingerprint, mutationType, docInfoProvider, docMetaProvider}` — spec.md
/// §3 "DocMetaMutation".
#[derive(Clone)]
pub struct DocMetaMutation {
    pub fingerprint: Fingerprint,
    pub mutation_type: MutationType,
    pub doc_info_provider: DocInfoProvider,
    pub doc_meta_provider: DocMetaProvider,
}

impl DocMetaMutation {
    pub fn new(
        fingerprint: Fingerprint,
        mutation_type: MutationType,
        doc_info_provider: DocInfoProvider,
        doc_meta_provider: DocMetaProvider,
    ) -> Self {
        Self {
            fingerprint,
            mutation_type,
            doc_info_provider,
            doc_meta_provider,
        }
    }

    pub async fn doc_info(&self) -> DatastoreResult<DocInfo> {
        (self.doc_info_provider)().await
    }

    pub async fn doc_meta(&self) -> DatastoreResult<serde_json::Value> {
        (self.doc_meta_provider)().await
    }
}

/// Per-tier durability stage of a mutation (spec.md §3/§GLOSSARY). Only
/// `Committed` events drive replication.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Consistency {
    /// Local-only durability; optimistic, may be rolled back by the source.
    Written,
    /// Durable on that tier.
    Committed,
}

/// `{id, terminated}` batch marker carried by a snapshot event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Batch {
    pub id: i64,
    pub terminated: bool,
}

/// `{consistency, batch?, docMetaMutations}` — spec.md §3
/// "DocMetaSnapshotEvent".
#[derive(Clone)]
pub struct DocMetaSnapshotEvent {
    pub consistency: Consistency,
    pub batch: Option<Batch>,
    pub doc_meta_mutations: Vec<DocMetaMutation>,
}

impl DocMetaSnapshotEvent {
    pub fn is_committed_and_terminated(&self) -> bool {
        self.consistency == Consistency::Committed
            && self.batch.map(|b| b.terminated).unwrap_or(false)
    }
}

/// A compact snapshot row describing one document as of a given observation
/// (spec.md §3 "SyncDoc").
#[derive(Clone, Debug)]
pub struct SyncDoc {
    pub fingerprint: Fingerprint,
    pub uuid: Option<Uuid>,
    pub mutation_type: MutationType,
    pub doc_meta_file_ref: DocMetaFileRef,
}

/// Fingerprint-keyed collection of `SyncDoc`s (spec.md §3 "SyncDocMap").
/// Keys are unique; insertion order is irrelevant, hence a `BTreeMap` rather
/// than preserving arrival order.
pub type SyncDocMap = BTreeMap<Fingerprint, SyncDoc>;

/// The effect one mutation has on a `SyncDocMap`, with its provider already
/// resolved. Kept separate from the map mutation itself (`apply_resolved`)
/// so a caller holding a non-async lock on the map never has to await while
/// holding the guard (spec.md §4.4's `SyncDocs.fromSnapshotEvent` step).
pub enum ResolvedMutation {
    Upsert(Fingerprint, SyncDoc),
    Remove(Fingerprint),
}

/// Awaits `mutation`'s `docInfoProvider` and returns the resulting row
/// update without touching any map. `created`/`updated` resolve to an
/// upsert of the freshly-fetched `DocInfo`; `deleted` resolves to a removal
/// so that, per spec.md §4.5 point 2, a document that no longer exists on a
/// side simply does not appear in that side's map.
pub async fn resolve_mutation(mutation: &DocMetaMutation) -> DatastoreResult<ResolvedMutation> {
    match mutation.mutation_type {
        MutationType::Created | MutationType::Updated => {
            let doc_info = mutation.doc_info().await?;
            Ok(ResolvedMutation::Upsert(
                mutation.fingerprint.clone(),
                SyncDoc {
                    fingerprint: mutation.fingerprint.clone(),
                    uuid: doc_info.uuid,
                    mutation_type: mutation.mutation_type,
                    doc_meta_file_ref: doc_info.doc_meta_file_ref,
                },
            ))
        }
        MutationType::Deleted => Ok(ResolvedMutation::Remove(mutation.fingerprint.clone())),
    }
}

/// Awaits every mutation's provider in order and returns the resolved row
/// updates, still without touching any map.
pub async fn resolve_event(event: &DocMetaSnapshotEvent) -> DatastoreResult<Vec<ResolvedMutation>> {
    let mut resolved = Vec::with_capacity(event.doc_meta_mutations.len());
    for mutation in &event.doc_meta_mutations {
        resolved.push(resolve_mutation(mutation).await?);
    }
    Ok(resolved)
}

/// Applies already-resolved row updates to `map`. Purely synchronous: safe
/// to call while holding a non-async lock's guard.
pub fn apply_resolved(map: &mut SyncDocMap, resolved: Vec<ResolvedMutation>) {
    for update in resolved {
        match update {
            ResolvedMutation::Upsert(fingerprint, doc) => {
                map.insert(fingerprint, doc);
            }
            ResolvedMutation::Remove(fingerprint) => {
                map.remove(&fingerprint);
            }
        }
    }
}

/// Folds one mutation's effect into a `SyncDocMap` directly — convenience
/// for callers (tests, anything owning the map outright with no lock in the
/// way) that don't need the resolve/apply split.
pub async fn fold_mutation_into(
    map: &mut SyncDocMap,
    mutation: &DocMetaMutation,
) -> DatastoreResult<()> {
    let resolved = resolve_mutation(mutation).await?;
    apply_resolved(map, vec![resolved]);
    Ok(())
}

/// Folds every mutation in an event into `map`, in mutation order.
pub async fn fold_event_into(
    map: &mut SyncDocMap,
    event: &DocMetaSnapshotEvent,
) -> DatastoreResult<()> {
    let resolved = resolve_event(event).await?;
    apply_resolved(map, resolved);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::model::DocMetaFileRef;

    fn immediate_doc_info(fingerprint: &Fingerprint, uuid: &str) -> DocInfoProvider {
        let fingerprint = fingerprint.clone();
        let uuid = Uuid::new(uuid);
        Arc::new(move || {
            let fingerprint = fingerprint.clone();
            let uuid = uuid.clone();
            box_future(async move {
                Ok(DocInfo {
                    fingerprint: fingerprint.clone(),
                    uuid: Some(uuid),
                    nonce: "n".into(),
                    doc_meta_file_ref: DocMetaFileRef::new(fingerprint),
                })
            })
        })
    }

    fn empty_doc_meta() -> DocMetaProvider {
        Arc::new(|| box_future(async move { Ok(serde_json::json!({})) }))
    }

    #[tokio::test]
    async fn created_mutation_inserts_row() {
        let fp = Fingerprint::new("doc-1");
        let mut map = SyncDocMap::new();
        let mutation = DocMetaMutation::new(
            fp.clone(),
            MutationType::Created,
            immediate_doc_info(&fp, "u1"),
            empty_doc_meta(),
        );
        fold_mutation_into(&mut map, &mutation).await.unwrap();
        assert_eq!(map.get(&fp).unwrap().uuid, Some(Uuid::new("u1")));
    }

    #[tokio::test]
    async fn deleted_mutation_removes_row() {
        let fp = Fingerprint::new("doc-1");
        let mut map = SyncDocMap::new();
        map.insert(
            fp.clone(),
            SyncDoc {
                fingerprint: fp.clone(),
                uuid: Some(Uuid::new("u1")),
                mutation_type: MutationType::Created,
                doc_meta_file_ref: DocMetaFileRef::new(fp.clone()),
            },
        );
        let mutation = DocMetaMutation::new(
            fp.clone(),
            MutationType::Deleted,
            immediate_doc_info(&fp, "u1"),
            empty_doc_meta(),
        );
        fold_mutation_into(&mut map, &mutation).await.unwrap();
        assert!(!map.contains_key(&fp));
    }
}
