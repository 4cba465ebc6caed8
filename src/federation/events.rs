use crate::federation::model::MutationType;
use crate::federation::sync_doc::{Batch, Consistency};

/// Which tier a `SynchronizationEvent` describes the effect on (spec.md §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dest {
    Local,
    Cloud,
}

/// Emitted by the Replicating Listener once a committed mutation has been
/// applied to the other tier (spec.md §4.6, §6 "SynchronizationEvent").
/// Carries the same consistency/batch shape as a snapshot event plus the
/// destination tier and the kind of change that was applied.
#[derive(Clone, Debug)]
pub struct SynchronizationEvent {
    pub consistency: Consistency,
    pub batch: Option<Batch>,
    pub dest: Dest,
    pub mutation_type: MutationType,
    pub fingerprint: crate::federation::model::Fingerprint,
}

/// Reserved surface for file-transfer observers (spec.md §6
/// "FileSynchronizationEvent"). Population is the underlying tier's
/// responsibility; this crate only provides the dispatcher callers can
/// subscribe to.
#[derive(Clone, Debug)]
pub struct FileSynchronizationEvent {
    pub dest: Dest,
    pub backend: String,
    pub fingerprint: crate::federation::model::Fingerprint,
}
