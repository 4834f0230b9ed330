use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::models::{Assignment, ClusterThroughputInfo, DatastreamGroupPartitionsMetadata, PartitionThroughputInfo, TaskId};

/// An assigner which places a group's partitions onto its tasks by observed throughput.
///
/// This is the greedy longest-processing-time heuristic: the heaviest unassigned partition
/// always goes to the currently lightest task.
#[derive(Clone, Debug)]
pub struct LoadBasedPartitionAssigner {
    /// The rates assumed for partitions with no observed throughput.
    default_rate: PartitionThroughputInfo,
}

impl Default for LoadBasedPartitionAssigner {
    fn default() -> Self {
        Self::new(PartitionThroughputInfo::new(5, 5))
    }
}

impl LoadBasedPartitionAssigner {
    /// Create a new instance.
    pub fn new(default_rate: PartitionThroughputInfo) -> Self {
        Self { default_rate }
    }

    /// Assign the given unassigned partitions onto the tasks of the metadata's group.
    ///
    /// Partitions of the group's tasks which are no longer part of the group's metadata are
    /// dropped. Tasks of other groups pass through untouched, and the group's tasks keep their
    /// identity.
    #[tracing::instrument(level = "trace", skip(self, throughput, current, unassigned, metadata), fields(group = metadata.group.name()))]
    pub fn assign_partitions(
        &self, throughput: &ClusterThroughputInfo, current: &Assignment, mut unassigned: Vec<String>, metadata: &DatastreamGroupPartitionsMetadata,
    ) -> CoordinatorResult<Assignment> {
        let group = metadata.group.name();
        let kb_rate = |partition: &str| throughput.rate_or(partition, self.default_rate).kb_rate;

        // Retain only the group's partitions which still exist, in assignment iteration order.
        let mut partitions: BTreeMap<TaskId, BTreeSet<String>> = BTreeMap::new();
        let mut tasks: Vec<(TaskId, u64)> = vec![];
        for task in current.values().flatten().filter(|task| task.task_prefix() == group) {
            if partitions.contains_key(task.task_id()) {
                continue;
            }
            let retained: BTreeSet<String> = task.partitions().intersection(&metadata.partitions).cloned().collect();
            let load = retained.iter().map(|partition| kb_rate(partition)).sum();
            partitions.insert(task.task_id().clone(), retained);
            tasks.push((task.task_id().clone(), load));
        }
        if tasks.is_empty() && !unassigned.is_empty() {
            return Err(CoordinatorError::NoTasksForGroup { group: group.into() });
        }

        tasks.sort_by_key(|(_, load)| *load);
        unassigned.sort_by_key(|partition| kb_rate(partition));
        while let Some(partition) = unassigned.pop() {
            let (task, load) = tasks.remove(0);
            let load = load + kb_rate(&partition);
            if let Some(task_partitions) = partitions.get_mut(&task) {
                task_partitions.insert(partition);
            }
            // Ties are placed after existing equals, so equally loaded tasks take turns.
            let idx = tasks.partition_point(|(_, other)| *other <= load);
            tasks.insert(idx, (task, load));
        }

        let assignment = current
            .iter()
            .map(|(instance, tasks)| {
                let tasks = tasks
                    .iter()
                    .map(|task| match partitions.get(task.task_id()) {
                        Some(task_partitions) if task.task_prefix() == group => task.with_partitions(task_partitions.clone()),
                        _ => task.clone(),
                    })
                    .collect();
                (instance.clone(), tasks)
            })
            .collect();
        tracing::debug!(group, tasks = partitions.len(), "finished load based partition assignment");
        Ok(assignment)
    }
}
