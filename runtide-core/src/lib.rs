//! Core dispatching primitives for the runtide sidecar.
//!
//! Provides the invocation data model, the rendezvous table that pairs
//! worker replies with waiting request tasks, and the bounded dispatcher
//! that both HTTP surfaces share.

pub mod dispatcher;
pub mod invocation;
pub mod rendezvous;

pub use dispatcher::{Dispatcher, QUEUE_CAPACITY};
pub use invocation::{Context, Invocation, InvocationReply};
pub use rendezvous::RendezvousTable;
