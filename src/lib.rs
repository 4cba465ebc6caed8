pub mod error;
pub mod federation;
pub mod runtime;
pub mod util;

pub use error::{DatastoreError, DatastoreErrorCode, DatastoreResult};
pub use federation::{FederatedDatastore, FederationConfig};
