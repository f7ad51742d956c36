//! Permanent batch deletion

use std::sync::Arc;
use tracing::{error, info};

use crate::client::MailApi;
use crate::models::DeleteResult;

/// Most ids Gmail's `messages.batchDelete` accepts per call
pub const MAX_BATCH_DELETE: usize = 1000;

/// Deletes messages in one batch request and reports the outcome as a value
pub struct BatchDeleter {
    api: Arc<dyn MailApi>,
}

impl BatchDeleter {
    pub fn new(api: Arc<dyn MailApi>) -> Self {
        Self { api }
    }

    /// Delete `ids` permanently; failures are reported in the result, never raised
    ///
    /// The count is the number of ids requested: the batch endpoint does not
    /// report per-message outcomes.
    pub async fn delete_messages(&self, ids: &[String]) -> DeleteResult {
        if ids.is_empty() {
            return DeleteResult::deleted(0);
        }

        if ids.len() > MAX_BATCH_DELETE {
            let message = format!(
                "Cannot delete {} messages in one batch (limit {})",
                ids.len(),
                MAX_BATCH_DELETE
            );
            error!("{}", message);
            return DeleteResult::failed(message);
        }

        match self.api.batch_delete(ids).await {
            Ok(()) => {
                info!("Deleted {} messages", ids.len());
                DeleteResult::deleted(ids.len())
            }
            Err(e) => {
                error!("Failed to delete messages: {}", e);
                DeleteResult::failed(e.to_string())
            }
        }
    }
}
