//! In-flight operation registry.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, Result};
use crate::protocol::OperationId;

/// Cancellation tokens of every operation the host is executing, keyed by id.
///
/// An entry exists from dispatch until the operation's terminal response is
/// sent. Aborting an id that is not registered is a no-op.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    pending: Mutex<HashMap<OperationId, CancellationToken>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` and hand out its token.
    pub fn register(&self, id: OperationId) -> Result<CancellationToken> {
        let mut pending = self.pending.lock();
        if pending.contains_key(&id) {
            return Err(BridgeError::DuplicateOperation(id));
        }
        let token = CancellationToken::new();
        pending.insert(id, token.clone());
        Ok(token)
    }

    /// Trigger cancellation of `id`. Returns whether it was registered.
    ///
    /// The entry stays until the operation completes and calls [`complete`].
    ///
    /// [`complete`]: OperationRegistry::complete
    pub fn cancel(&self, id: OperationId) -> bool {
        match self.pending.lock().get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove `id`. Returns whether it was registered.
    pub fn complete(&self, id: OperationId) -> bool {
        self.pending.lock().remove(&id).is_some()
    }

    /// Cancel every registered operation; returns how many there were.
    pub fn cancel_all(&self) -> usize {
        let pending = self.pending.lock();
        for token in pending.values() {
            token.cancel();
        }
        pending.len()
    }

    pub fn contains(&self, id: OperationId) -> bool {
        self.pending.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
