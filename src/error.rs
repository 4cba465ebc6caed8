use std::error::Error as StdError;
use std::fmt::{Display, Formatter};

/// Machine-matchable error kind, mirroring spec.md §7's error-kind table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatastoreErrorCode {
    /// Either tier's `init` rejected. Fatal: the facade is unusable.
    InitFailure,
    /// An underlying snapshot callback threw.
    SnapshotSourceError,
    /// A single per-document reconciliation copy failed.
    ReconcileCopyError,
    /// Applying a committed mutation to the local tier failed.
    ReplicateApplyError,
    /// One of the two tiers failed on write/delete.
    WriteSideFailure,
    /// A user-registered listener panicked or returned an error.
    ListenerException,
}

impl DatastoreErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatastoreErrorCode::InitFailure => "federation/init-failure",
            DatastoreErrorCode::SnapshotSourceError => "federation/snapshot-source-error",
            DatastoreErrorCode::ReconcileCopyError => "federation/reconcile-copy-error",
            DatastoreErrorCode::ReplicateApplyError => "federation/replicate-apply-error",
            DatastoreErrorCode::WriteSideFailure => "federation/write-side-failure",
            DatastoreErrorCode::ListenerException => "federation/listener-exception",
        }
    }
}

/// Crate-wide error type. Call sites fold an underlying failure's own
/// `Display` text into `message` (e.g. `format!("... failed: {err}")`)
/// rather than boxing it as a `source`, since `DatastoreError` is `Clone`
/// (needed to hand the same error to both a log line and an
/// `AsyncErrorListener`) and a boxed source can't be cloned generically.
#[derive(Clone, Debug)]
pub struct DatastoreError {
    pub code: DatastoreErrorCode,
    message: String,
}

impl DatastoreError {
    pub fn new(code: DatastoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl Display for DatastoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl StdError for DatastoreError {}

pub type DatastoreResult<T> = Result<T, DatastoreError>;

pub fn init_failure(message: impl Into<String>) -> DatastoreError {
    DatastoreError::new(DatastoreErrorCode::InitFailure, message)
}

pub fn snapshot_source_error(message: impl Into<String>) -> DatastoreError {
    DatastoreError::new(DatastoreErrorCode::SnapshotSourceError, message)
}

pub fn reconcile_copy_error(message: impl Into<String>) -> DatastoreError {
    DatastoreError::new(DatastoreErrorCode::ReconcileCopyError, message)
}

pub fn replicate_apply_error(message: impl Into<String>) -> DatastoreError {
    DatastoreError::new(DatastoreErrorCode::ReplicateApplyError, message)
}

pub fn write_side_failure(message: impl Into<String>) -> DatastoreError {
    DatastoreError::new(DatastoreErrorCode::WriteSideFailure, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let err = init_failure("cloud init rejected");
        let rendered = err.to_string();
        assert!(rendered.contains("cloud init rejected"));
        assert!(rendered.contains("federation/init-failure"));
    }
}
