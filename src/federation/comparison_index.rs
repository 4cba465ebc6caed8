use std::collections::HashMap;
use std::sync::Mutex;

use crate::federation::model::{DocInfo, Fingerprint, Uuid};

/// `{uuid, nonce}` — spec.md §3 "Comparison Index entry".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub uuid: Option<Uuid>,
    pub nonce: String,
}

/// In-memory map fingerprint → `{uuid, nonce}` used to decide whether an
/// incoming mutation is newer than what the local side holds (spec.md §2 C1,
/// §4.1). Access is serialized under a single exclusive lock — contention is
/// rare (spec.md §5), so a plain `std::sync::Mutex` is used rather than an
/// async one: no operation here ever awaits while holding it.
pub struct ComparisonIndex {
    entries: Mutex<HashMap<Fingerprint, IndexEntry>>,
}

impl Default for ComparisonIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ComparisonIndex {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Overwrites unconditionally. Callers that want newer-wins must consult
    /// `get` first (spec.md §4.1).
    pub fn put(&self, doc_info: &DocInfo) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            doc_info.fingerprint.clone(),
            IndexEntry {
                uuid: doc_info.uuid.clone(),
                nonce: doc_info.nonce.clone(),
            },
        );
    }

    /// Removed on delete irrespective of the write outcome (spec.md §3
    /// invariant).
    pub fn remove(&self, fingerprint: &Fingerprint) {
        self.entries.lock().unwrap().remove(fingerprint);
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<IndexEntry> {
        self.entries.lock().unwrap().get(fingerprint).cloned()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.lock().unwrap().contains_key(fingerprint)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}
