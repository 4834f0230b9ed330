//! Flushless checkpoint bookkeeping.
//!
//! Connectors hand records to a transport without waiting for them to be produced. To still be
//! able to commit a safe position in the source, every send registers the record's source
//! checkpoint as "in flight", and every successful delivery acks it. Acks may arrive in any
//! order, so per source partition we only ever promote the longest contiguous prefix of acked
//! checkpoints.
//!
//! ```text
//! in flight: [ 1 ][ 2 ][ 3 ][ 4 ]      acked: { 2, 3 }      current: none
//! ack(1)  => in flight: [ 4 ]          acked: { }           current: 3
//! ```
//!
//! The resulting low-watermark is advisory. It only ever moves forward for any one partition,
//! and the controller commits it to the external checkpoint store on an interval.

mod tracker;
#[cfg(test)]
mod tracker_test;

pub use tracker::{CheckpointTracker, Registration};
