//! Checkpoint persistence: libSQL by default, single text file as an option.

pub mod file;
pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use file::FileCheckpointStore;
pub use libsql_backend::{CheckpointRecord, LibSqlCheckpointStore};
pub use traits::CheckpointStore;
