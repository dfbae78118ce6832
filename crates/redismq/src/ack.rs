//! Terminal acknowledge + delete of an entry.

use crate::error::RedisMqResult;
use crate::store::StreamStore;
use std::sync::Arc;

/// Ends an entry's lifecycle: acknowledged for the group and removed from the stream.
pub struct Acknowledger<S> {
    store: Arc<S>,
    stream: String,
    group: String,
}

impl<S: StreamStore> Acknowledger<S> {
    pub fn new(store: Arc<S>, stream: &str, group: &str) -> Self {
        Self {
            store,
            stream: stream.to_string(),
            group: group.to_string(),
        }
    }

    /// XACK + XDEL as one atomic unit.
    ///
    /// On error neither happened and the entry stays pending, to be reclaimed later.
    pub async fn finalize(&self, id: &str) -> RedisMqResult<()> {
        self.store.ack_and_delete(&self.stream, &self.group, id).await
    }
}
