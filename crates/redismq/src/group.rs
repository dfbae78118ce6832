//! Consumer group bootstrap.

use crate::error::RedisMqResult;
use crate::store::{GroupStatus, StreamStore};
use std::sync::Arc;
use tracing::{debug, info};

/// Makes sure the consumer group exists before any reads are issued.
pub struct GroupCoordinator<S> {
    store: Arc<S>,
}

impl<S: StreamStore> GroupCoordinator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create `group` on `stream` if it does not exist yet.
    ///
    /// An existing group is success. Any other store error is returned and is
    /// fatal to startup.
    pub async fn ensure_group(&self, stream: &str, group: &str) -> RedisMqResult<()> {
        match self.store.create_group(stream, group).await? {
            GroupStatus::Created => {
                info!(stream = %stream, group = %group, "Created consumer group");
            }
            GroupStatus::AlreadyExists => {
                debug!(stream = %stream, group = %group, "Consumer group already exists");
            }
        }
        Ok(())
    }
}
