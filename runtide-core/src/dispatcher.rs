//! Invocation dispatcher: bounded task queue plus rendezvous lifecycle.

use bytes::Bytes;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::debug;

use crate::invocation::{Context, Invocation, InvocationReply};
use crate::rendezvous::RendezvousTable;

/// Fixed admission-control bound: producers block once this many invocations
/// are queued and unclaimed.
pub const QUEUE_CAPACITY: usize = 100;

/// Process-wide dispatching state, shared by reference with both HTTP
/// servers. Owns the pending-task queue, the rendezvous table and the
/// per-invocation TTL.
pub struct Dispatcher {
    queue_tx: mpsc::Sender<Invocation>,
    queue_rx: RwLock<mpsc::Receiver<Invocation>>,
    rendezvous: RendezvousTable,
    function_ttl: Duration,
}

impl Dispatcher {
    pub fn new(function_ttl: Duration) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            queue_tx,
            queue_rx: RwLock::new(queue_rx),
            rendezvous: RendezvousTable::new(),
            function_ttl,
        }
    }

    pub fn function_ttl(&self) -> Duration {
        self.function_ttl
    }

    /// Runs one invocation end to end: register the rendezvous slot, enqueue
    /// (blocking when the queue is at capacity), then wait for whichever
    /// comes first, the worker's reply or the TTL. The slot is always
    /// unregistered before returning, so a late delivery fails and the
    /// worker is told the deadline passed.
    pub async fn dispatch(&self, payload: Bytes, context: Context) -> InvocationReply {
        let invocation = Invocation::new(payload.clone(), context, self.function_ttl);
        let id = invocation.id.clone();

        let (reply_tx, reply_rx) = oneshot::channel();
        self.rendezvous.register(&id, reply_tx).await;

        if self.queue_tx.send(invocation).await.is_err() {
            // Only happens during shutdown, once the queue is closed.
            self.rendezvous.unregister(&id).await;
            return InvocationReply::error(&id, Bytes::from_static(b"task queue is closed"));
        }

        let reply = match tokio::time::timeout(self.function_ttl, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) | Err(_) => {
                debug!(%id, "invocation deadline reached");
                InvocationReply::deadline(&id, &payload)
            }
        };
        self.rendezvous.unregister(&id).await;
        reply
    }

    /// Next pending invocation, competed for by worker polls. Returns `None`
    /// only when the queue has been closed.
    pub async fn next_invocation(&self) -> Option<Invocation> {
        self.queue_rx.write().await.recv().await
    }

    /// Whether an invocation with this id is still awaiting its reply.
    pub async fn has_pending(&self, id: &str) -> bool {
        self.rendezvous.contains(id).await
    }

    /// Attempts to hand a worker reply to the waiting request task.
    pub async fn deliver(&self, id: &str, reply: InvocationReply) -> bool {
        self.rendezvous.try_deliver(id, reply).await
    }
}
