//! Identifier allocation.

use depot_shared::FileId;
use tracing::warn;

use crate::error::FileResult;
use crate::storage::StorageAdapter;

/// Draws random v4 ids until one is unused by `adapter`.
pub async fn allocate_id(adapter: &dyn StorageAdapter) -> FileResult<FileId> {
    loop {
        let id = FileId::new();
        if !adapter.exists(id).await? {
            return Ok(id);
        }
        warn!(file_id = %id, "id collision, drawing again");
    }
}
