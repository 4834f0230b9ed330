use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Datastream metadata key overriding the number of tasks created for a group.
pub const METADATA_MAX_TASKS: &str = "maxTasks";
/// Datastream metadata key capping the number of a group's tasks on any one instance.
pub const METADATA_MAX_TASKS_PER_INSTANCE: &str = "maxTasksPerInstance";

/// A datastream definition.
///
/// Only the parts of a datastream which matter to coordination are modelled here: its name and
/// its free-form metadata, which may carry task sizing overrides.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datastream {
    /// The unique name of this datastream.
    pub name: String,
    /// Free-form metadata attached to this datastream.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Datastream {
    /// Create a new datastream with empty metadata.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: Default::default(),
        }
    }

    /// Set a metadata value on this datastream.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A set of co-destined datastreams which share a task prefix, and therefore share tasks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastreamGroup {
    /// The task prefix shared by all datastreams of this group.
    pub task_prefix: String,
    /// The datastreams of this group.
    pub datastreams: Vec<Datastream>,
}

impl DatastreamGroup {
    /// Create a new group.
    pub fn new(task_prefix: impl Into<String>, datastreams: Vec<Datastream>) -> Self {
        Self {
            task_prefix: task_prefix.into(),
            datastreams,
        }
    }

    /// The name of this group, which is its task prefix.
    pub fn name(&self) -> &str {
        &self.task_prefix
    }

    /// The names of all datastreams in this group.
    pub fn datastream_names(&self) -> Vec<String> {
        self.datastreams.iter().map(|ds| ds.name.clone()).collect()
    }

    /// Iterate over the raw metadata values found under `key` across all datastreams of the group.
    pub fn metadata_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = (&'a Datastream, &'a str)> + 'a {
        self.datastreams
            .iter()
            .filter_map(move |ds| ds.metadata.get(key).map(|val| (ds, val.as_str())))
    }
}

/// The full set of source partitions which currently belong to a datastream group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatastreamGroupPartitionsMetadata {
    /// The group to which the partitions belong.
    pub group: DatastreamGroup,
    /// All partitions of the group's sources.
    pub partitions: BTreeSet<String>,
}

impl DatastreamGroupPartitionsMetadata {
    /// Create a new instance.
    pub fn new<I, S>(group: DatastreamGroup, partitions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            group,
            partitions: partitions.into_iter().map(Into::into).collect(),
        }
    }
}
