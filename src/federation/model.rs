use std::cmp::Ordering;
use std::fmt;

/// Stable cross-tier document identity (spec.md §3 "Fingerprint").
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Monotonically comparable version token attached to each document
/// revision (spec.md §3 "UUID"). Distinct from a `uuid` crate identifier:
/// this is an opaque, totally-ordered token whose comparator is supplied
/// externally, not parsed or generated by this crate.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Uuid(String);

impl Uuid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `UUIDs.compare` from spec.md §3/§4.5: a total order over UUID tokens.
/// The default implementation orders by the token's string value, which is
/// sufficient for monotonically-increasing ids (ULIDs, zero-padded
/// counters, version vectors serialized lexically). Callers whose token
/// format does not sort lexically should wrap `Uuid` values with their own
/// comparator before handing them to the comparison index / reconciler —
/// this crate never inspects the token's contents beyond equality and
/// ordering.
impl PartialOrd for Uuid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Uuid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// Compares two optional UUIDs per spec.md §3: "Absent UUID sorts before
/// any present UUID."
pub fn compare_uuids(a: Option<&Uuid>, b: Option<&Uuid>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.cmp(b),
    }
}

/// One of `created | updated | deleted` (spec.md §3 "DocMetaMutation").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationType {
    Created,
    Updated,
    Deleted,
}

/// `{fingerprint, uuid, nonce, docMetaFileRef}` — spec.md §3 "DocInfo".
/// Opaque beyond these fields; higher layers may carry more but the core
/// only ever reads these four.
#[derive(Clone, Debug)]
pub struct DocInfo {
    pub fingerprint: Fingerprint,
    pub uuid: Option<Uuid>,
    pub nonce: String,
    pub doc_meta_file_ref: DocMetaFileRef,
}

/// `{fingerprint, uuid?, docFile?}` — spec.md §3 "DocMetaFileRef". Points at
/// a document and its optional associated file, for deletion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocMetaFileRef {
    pub fingerprint: Fingerprint,
    pub uuid: Option<Uuid>,
    pub doc_file: Option<String>,
}

impl DocMetaFileRef {
    pub fn new(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            uuid: None,
            doc_file: None,
        }
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    pub fn with_doc_file(mut self, doc_file: impl Into<String>) -> Self {
        self.doc_file = Some(doc_file.into());
        self
    }
}
