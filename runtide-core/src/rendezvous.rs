//! Rendezvous between worker replies and waiting request tasks.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::{oneshot, RwLock};
use tracing::debug;

use crate::invocation::InvocationReply;

type ReplySender = oneshot::Sender<InvocationReply>;

/// Maps an invocation id to its single-use reply channel.
///
/// The external handler owns the full lifetime of an entry: it registers the
/// sender, awaits the paired receiver (or its deadline), and unregisters.
/// The internal API only ever attempts a consuming send through
/// [`RendezvousTable::try_deliver`]; once the sender is taken or the receiver
/// is gone, further deliveries report failure and the worker sees 410.
#[derive(Default)]
pub struct RendezvousTable {
    slots: RwLock<HashMap<String, Mutex<Option<ReplySender>>>>,
}

impl RendezvousTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: &str, sender: ReplySender) {
        self.slots
            .write()
            .await
            .insert(id.to_string(), Mutex::new(Some(sender)));
    }

    /// Hands a reply to the request task blocked on this id. Returns `false`
    /// when the id is unknown, the reply slot was already consumed, or the
    /// receiving side is gone.
    pub async fn try_deliver(&self, id: &str, reply: InvocationReply) -> bool {
        let slots = self.slots.read().await;
        let Some(slot) = slots.get(id) else {
            debug!(id, "no rendezvous slot for reply");
            return false;
        };
        let sender = slot.lock().expect("rendezvous slot lock").take();
        match sender {
            Some(sender) => sender.send(reply).is_ok(),
            None => false,
        }
    }

    /// Whether a slot is still registered for this id. The answer can go
    /// stale immediately; [`RendezvousTable::try_deliver`] stays the
    /// authority on whether a reply lands.
    pub async fn contains(&self, id: &str) -> bool {
        self.slots.read().await.contains_key(id)
    }

    pub async fn unregister(&self, id: &str) {
        self.slots.write().await.remove(id);
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }
}
