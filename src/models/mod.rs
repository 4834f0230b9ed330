//! Coordination data models.

mod datastream;
#[cfg(test)]
mod models_test;
mod task;
mod throughput;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub use datastream::{Datastream, DatastreamGroup, DatastreamGroupPartitionsMetadata, METADATA_MAX_TASKS, METADATA_MAX_TASKS_PER_INSTANCE};
pub use task::{DatastreamTask, TaskId};
pub use throughput::{ClusterThroughputInfo, PartitionThroughputInfo};

/// A mapping of instance names to the set of tasks assigned to each instance.
///
/// Ordered collections are used throughout so that assignment output is deterministic.
pub type Assignment = BTreeMap<String, BTreeSet<DatastreamTask>>;

/// A pair of source (a topic or a table) and one of its partitions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourcePartition {
    pub source: String,
    pub partition: i32,
}

impl SourcePartition {
    /// Create a new instance.
    pub fn new(source: impl Into<String>, partition: i32) -> Self {
        Self {
            source: source.into(),
            partition,
        }
    }
}

impl std::fmt::Display for SourcePartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.source, self.partition)
    }
}

/// Count the total number of tasks in the given assignment.
pub fn task_count(assignment: &Assignment) -> usize {
    assignment.values().map(|tasks| tasks.len()).sum()
}

/// Find the instance on which the given task is assigned, if any.
pub fn instance_of<'a>(assignment: &'a Assignment, task: &TaskId) -> Option<&'a str> {
    assignment
        .iter()
        .find(|(_, tasks)| tasks.iter().any(|t| t.task_id() == task))
        .map(|(instance, _)| instance.as_str())
}
