//! Fatal run errors.

use crate::select::SelectionError;
use crate::store::StorageError;

/// A run that could not start. Per-station failures never end up here.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("storage unavailable: {0}")]
    Storage(#[from] StorageError),

    #[error("station selection failed: {0}")]
    Selection(#[from] SelectionError),
}
