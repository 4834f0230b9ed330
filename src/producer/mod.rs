//! Flushless producer handling.
//!
//! A `ProducerHandler` sits between a connector task and its `Transport`. Each record sent
//! through the handler has its source checkpoint registered with the task's `CheckpointTracker`,
//! and every successful delivery reported by the transport acks that checkpoint. The handler
//! never waits on the transport to flush.

mod handler;
mod transport;

pub use handler::{ProducerHandler, METRICS_CLASS};
pub use transport::{RecordMetadata, SendCallback, Transport};
