use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::DatastreamGroup;

/// The identity of a datastream task.
///
/// A task's `id` is stable across rebalances for what is logically the same task, so two task
/// values compare equal whenever their prefix and id match, regardless of their partitions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    /// The prefix derived from the task's datastream group.
    pub task_prefix: String,
    /// A UUID string unique within the prefix.
    pub id: String,
}

impl TaskId {
    /// Create a new instance.
    pub fn new(task_prefix: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            task_prefix: task_prefix.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.task_prefix, self.id)
    }
}

/// A unit of work binding one datastream group to one instance.
///
/// Tasks are immutable values. Reassigning partitions produces a new value which carries over
/// the task's identity, see `with_partitions`.
#[derive(Clone, Debug)]
pub struct DatastreamTask {
    key: TaskId,
    datastreams: Vec<String>,
    partitions: BTreeSet<String>,
}

impl DatastreamTask {
    /// Create a fresh task for the given group, rolling a new ID.
    pub fn new(group: &DatastreamGroup) -> Self {
        Self::with_id(group, Uuid::new_v4().to_string())
    }

    /// Create a task for the given group with an explicit ID.
    pub fn with_id(group: &DatastreamGroup, id: impl Into<String>) -> Self {
        Self {
            key: TaskId::new(group.task_prefix.clone(), id),
            datastreams: group.datastream_names(),
            partitions: Default::default(),
        }
    }

    /// Build a copy of this task which owns exactly the given partitions.
    pub fn with_partitions(&self, partitions: BTreeSet<String>) -> Self {
        Self {
            key: self.key.clone(),
            datastreams: self.datastreams.clone(),
            partitions,
        }
    }

    /// The identity of this task.
    pub fn task_id(&self) -> &TaskId {
        &self.key
    }

    /// The task prefix of this task.
    pub fn task_prefix(&self) -> &str {
        &self.key.task_prefix
    }

    /// The ID of this task.
    pub fn id(&self) -> &str {
        &self.key.id
    }

    /// The names of the datastreams processed by this task.
    pub fn datastreams(&self) -> &[String] {
        &self.datastreams
    }

    /// The source partitions owned by this task.
    pub fn partitions(&self) -> &BTreeSet<String> {
        &self.partitions
    }
}

impl std::fmt::Display for DatastreamTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

impl PartialEq for DatastreamTask {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for DatastreamTask {}

impl Hash for DatastreamTask {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for DatastreamTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DatastreamTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}
