//! Coordination core of a change-data streaming framework.
//!
//! Connector tasks pull change events from a source and hand them to a `ProducerHandler`, which
//! sends them to a destination through a `Transport`. Every send is registered with the task's
//! `CheckpointTracker`, which only ever reports a checkpoint as safe once every record before it
//! has been acknowledged, regardless of the order in which the destination completes them.
//!
//! Tasks are placed on instances by the `AssignmentCoordinator`, which runs a broadcast
//! assignment per datastream group, optionally spreads a group's partitions across its tasks by
//! observed throughput, and reports the tasks added & removed by each round. The `Controller`
//! drives rounds from cluster changes, drains the trackers of removed tasks and periodically
//! commits task checkpoints to a `CheckpointStore`.

pub mod assignment;
pub mod checkpoint;
pub mod config;
pub mod connector_metrics;
pub mod controller;
pub mod error;
#[cfg(test)]
mod fixtures;
pub mod models;
pub mod producer;
pub mod store;

pub use crate::assignment::{AssignmentCoordinator, BroadcastAssigner, BroadcastConfig, LoadBasedPartitionAssigner, ThroughputOracle};
pub use crate::checkpoint::CheckpointTracker;
pub use crate::config::Config;
pub use crate::controller::{AssignmentHandle, Controller, ControllerMsg};
pub use crate::error::{AssignmentDiagnostic, CoordinatorError, CoordinatorResult};
pub use crate::producer::{ProducerHandler, Transport};
pub use crate::store::{CheckpointStore, InMemoryCheckpointStore};
