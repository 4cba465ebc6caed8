use std::future::Future;
use std::sync::Arc;

use futures::channel::oneshot;
use futures::FutureExt;

use crate::error::{self, DatastoreResult};
use crate::federation::datastore::{Datastore, MutationSink};
use crate::federation::model::{DocInfo, DocMetaFileRef, Fingerprint};
use crate::federation::sync_doc::BoxFuture;
use crate::runtime;

/// User-facing handle returned by a coordinated write: two futures resolving
/// independently as the write progresses through its two stages (spec.md §3
/// "DatastoreMutation"). Callers only ever observe success or failure of a
/// stage, never a payload, so there is no generic parameter to thread
/// through.
pub struct MutationAck {
    pub written: BoxFuture<'static, DatastoreResult<()>>,
    pub committed: BoxFuture<'static, DatastoreResult<()>>,
}

fn mutation_channel() -> (
    MutationSink,
    oneshot::Receiver<DatastoreResult<()>>,
    oneshot::Receiver<DatastoreResult<()>>,
) {
    let (written_tx, written_rx) = oneshot::channel();
    let (committed_tx, committed_rx) = oneshot::channel();
    (MutationSink::new(written_tx, committed_tx), written_rx, committed_rx)
}

fn receiver_to_ack(rx: oneshot::Receiver<DatastoreResult<()>>) -> BoxFuture<'static, DatastoreResult<()>> {
    rx.map(|result| {
        result.unwrap_or_else(|_| {
            Err(error::write_side_failure(
                "mutation sink dropped before resolving its stage",
            ))
        })
    })
    .boxed()
}

/// Aggregates the two sides' staged acks into one user-facing signal
/// (spec.md §4.7): waits for both to reach the stage, and if either failed,
/// logs the other side's outcome and surfaces the failure rather than
/// hiding it.
async fn aggregate_stage(
    label: &'static str,
    cloud: BoxFuture<'static, DatastoreResult<()>>,
    local: BoxFuture<'static, DatastoreResult<()>>,
) -> DatastoreResult<()> {
    let (cloud_result, local_result) = futures::future::join(cloud, local).await;
    match (cloud_result, local_result) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(cloud_err), local_result) => {
            if local_result.is_ok() {
                log::warn!(
                    "federation: local side {label} succeeded but cloud side failed: {cloud_err}"
                );
            }
            Err(cloud_err)
        }
        (Ok(()), Err(local_err)) => {
            log::warn!("federation: cloud side {label} succeeded but local side failed: {local_err}");
            Err(local_err)
        }
    }
}

/// Core of the coordinator (spec.md §4.7 steps 1-5): builds a fresh
/// `MutationSink` for each side, hands each to its future-producing
/// closure, drives both to completion on a detached task, and aggregates
/// their staged signals into one `MutationAck`.
fn coordinate<FC, FFC, FL, FFL>(cloud_op: FC, local_op: FL) -> MutationAck
where
    FC: FnOnce(MutationSink) -> FFC,
    FFC: Future<Output = ()> + Send + 'static,
    FL: FnOnce(MutationSink) -> FFL,
    FFL: Future<Output = ()> + Send + 'static,
{
    let (cloud_sink, cloud_written_rx, cloud_committed_rx) = mutation_channel();
    let (local_sink, local_written_rx, local_committed_rx) = mutation_channel();

    runtime::spawn_detached(cloud_op(cloud_sink));
    runtime::spawn_detached(local_op(local_sink));

    let written = aggregate_stage(
        "written",
        receiver_to_ack(cloud_written_rx),
        receiver_to_ack(local_written_rx),
    )
    .boxed();
    let committed = aggregate_stage(
        "committed",
        receiver_to_ack(cloud_committed_rx),
        receiver_to_ack(local_committed_rx),
    )
    .boxed();

    MutationAck { written, committed }
}

/// Starts both tiers' `write` calls concurrently (spec.md §4.7, §4.8
/// `write`).
pub fn coordinate_write(
    cloud: Arc<dyn Datastore>,
    local: Arc<dyn Datastore>,
    fingerprint: Fingerprint,
    doc_meta: serde_json::Value,
    doc_info: DocInfo,
) -> MutationAck {
    coordinate(
        {
            let fingerprint = fingerprint.clone();
            let doc_meta = doc_meta.clone();
            let doc_info = doc_info.clone();
            move |sink| async move {
                let _ = cloud.write(&fingerprint, doc_meta, doc_info, sink).await;
            }
        },
        move |sink| async move {
            let _ = local.write(&fingerprint, doc_meta, doc_info, sink).await;
        },
    )
}

/// Starts both tiers' `delete` calls concurrently (spec.md §4.7, §4.8
/// `delete`).
pub fn coordinate_delete(
    cloud: Arc<dyn Datastore>,
    local: Arc<dyn Datastore>,
    doc_meta_file_ref: DocMetaFileRef,
) -> MutationAck {
    coordinate(
        {
            let doc_meta_file_ref = doc_meta_file_ref.clone();
            move |sink| async move {
                let _ = cloud.delete(&doc_meta_file_ref, sink).await;
            }
        },
        move |sink| async move {
            let _ = local.delete(&doc_meta_file_ref, sink).await;
        },
    )
}
