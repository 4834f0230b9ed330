//! Coordination error abstractions.

use thiserror::Error;

use crate::models::{SourcePartition, TaskId};

/// Coordination error variants.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// A checkpoint was registered which does not strictly follow the last registered
    /// checkpoint of its source partition. This always indicates a connector bug.
    #[error("out of order checkpoint registration on {source_partition}: {checkpoint} does not follow {last}")]
    OutOfOrderRegister {
        source_partition: SourcePartition,
        checkpoint: String,
        last: String,
    },
    /// Partitions could not be placed because the group has no tasks in the assignment.
    #[error("no tasks found for datastream group {group}")]
    NoTasksForGroup { group: String },
    /// A removed task still had records in flight when its drain deadline expired.
    #[error("task {task} force-cleared with {in_flight} records still in flight")]
    DrainTimeout { task: TaskId, in_flight: usize },
}

/// The error observed by send callbacks when the transport fails to deliver a record.
#[derive(Debug, Error)]
#[error("error sending record to transport: {0}")]
pub struct TransportSendFailure(#[from] pub anyhow::Error);

/// A non-fatal finding produced while computing an assignment.
///
/// Assigners are pure, so these are returned alongside the assignment rather than raised.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssignmentDiagnostic {
    /// A group asked for more tasks than the live instances could hold.
    CapacityExceeded { group: String, requested: usize, placed: usize },
    /// A datastream carried a metadata cap which could not be parsed.
    InvalidMetadata { datastream: String, key: String, value: String },
    /// Partition placement failed for a group; its base assignment remains in effect.
    PartitionAssignmentFailed { group: String, reason: String },
}

impl std::fmt::Display for AssignmentDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CapacityExceeded { group, requested, placed } => {
                write!(f, "group {} requested {} tasks but only {} could be placed", group, requested, placed)
            }
            Self::InvalidMetadata { datastream, key, value } => {
                write!(f, "datastream {} has invalid metadata {}={}", datastream, key, value)
            }
            Self::PartitionAssignmentFailed { group, reason } => write!(f, "partition assignment failed for group {}: {}", group, reason),
        }
    }
}

/// A result type where the error is a `CoordinatorError`.
pub type CoordinatorResult<T> = ::std::result::Result<T, CoordinatorError>;
