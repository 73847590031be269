//! Checkpoint store trait.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::pipeline::types::Checkpoint;

/// Durable home of the poll cycle's checkpoint.
///
/// `save` must not return `Ok` until the value is on stable storage, and
/// must reject a checkpoint that sorts before the stored one.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// `None` when nothing has been processed yet.
    async fn load(&self) -> Result<Option<Checkpoint>, StoreError>;

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;
}

/// Refuse to move backwards.
pub(crate) fn check_monotonic(
    current: Option<&Checkpoint>,
    next: &Checkpoint,
) -> Result<(), StoreError> {
    match current {
        Some(cur) if next < cur => Err(StoreError::Regression {
            current: cur.to_string(),
            attempted: next.to_string(),
        }),
        _ => Ok(()),
    }
}
