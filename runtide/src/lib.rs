//! runtide — AWS Lambda Custom Runtime API emulator.
//!
//! A sidecar that serves the Lambda Runtime API to a pool of long-running
//! `bootstrap` processes and bridges it to an external HTTP surface:
//! requests are decoded by the configured codec, queued, claimed by a
//! polling worker, and the worker's reply (or the deadline) is encoded back
//! to the caller or forwarded to a sink.

pub mod config;
pub mod gateway;
pub mod metrics;
pub mod runtime_api;
pub mod runtime_env;
pub mod sender;
pub mod supervisor;
