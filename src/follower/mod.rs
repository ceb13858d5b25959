//! Applies an incoming replication command on a follower node.

use std::sync::Arc;

use crate::core::{CoreError, ReplicationCommand, Result};
use crate::store::Store;

/// Receives one `ReplicationCommand` from the leader, applies it to the
/// local `Store`, and acknowledges only after the apply has committed.
/// Never further propagates the command — followers do not replicate.
pub struct FollowerApply {
    store: Arc<Store>,
}

impl FollowerApply {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Applies `command` via the store's conflict-resolution rule. Rejects
    /// commands with an empty key; otherwise this cannot fail.
    pub fn apply(&self, command: ReplicationCommand) -> Result<()> {
        if command.key.is_empty() {
            return Err(CoreError::InvalidInput("key must not be empty".to_string()));
        }
        self.store.set(command.key, command.value, command.version);
        Ok(())
    }
}
