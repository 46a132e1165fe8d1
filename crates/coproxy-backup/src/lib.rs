//! Peripheral ZIP export/import of the credential pool's contents.

mod engine;
mod error;
mod state;

pub use engine::{BackupEngine, BackupMetadata};
pub use error::BackupError;
pub use state::{BackupRecord, BackupState, OperationStatus, OperationType};
