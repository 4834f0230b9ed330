use std::collections::BTreeSet;

use crate::assignment::AssignmentOutcome;
use crate::error::AssignmentDiagnostic;
use crate::models::{self, Assignment, DatastreamGroup, DatastreamTask, METADATA_MAX_TASKS, METADATA_MAX_TASKS_PER_INSTANCE};

/// Cluster-wide defaults for broadcast task sizing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// The number of tasks per group, when no datastream of the group overrides it.
    ///
    /// When unset, every group gets one task per live instance.
    pub default_max_tasks: Option<usize>,
    /// The cap on tasks of a single group per instance, when no datastream overrides it.
    ///
    /// When unset, instances are not capped.
    pub default_max_tasks_per_instance: Option<usize>,
}

/// An assigner which fans each datastream group out across the live instances.
///
/// Placement walks a cursor over the instances which is shared across groups, so that groups
/// with fewer tasks than instances do not all pile onto the first instances. A task already
/// assigned to an instance for a group is reused rather than recreated, which keeps task
/// identity stable across rounds on a stable instance set.
///
/// Groups with fewer tasks than instances are placed wherever the cursor lands. Removing a group
/// placed before them shifts the cursor, so their tasks move to other instances and are
/// recreated there.
#[derive(Clone, Debug, Default)]
pub struct BroadcastAssigner {
    config: BroadcastConfig,
}

impl BroadcastAssigner {
    /// Create a new instance.
    pub fn new(config: BroadcastConfig) -> Self {
        Self { config }
    }

    /// Compute a new assignment of the given groups across the given instances.
    ///
    /// This is pure: the same inputs always produce the same placement, apart from the IDs of
    /// freshly created tasks. With no instances, the assignment is empty.
    pub fn assign(&self, groups: &[DatastreamGroup], instances: &[String], current: &Assignment) -> AssignmentOutcome {
        tracing::debug!(
            groups = groups.len(),
            instances = instances.len(),
            tasks = models::task_count(current),
            "computing broadcast assignment"
        );
        let mut outcome = AssignmentOutcome::default();
        if instances.is_empty() {
            return outcome;
        }

        let mut working = current.clone();
        outcome.assignment = instances.iter().map(|instance| (instance.clone(), BTreeSet::new())).collect();
        let mut assigned = vec![0usize; instances.len()];
        let mut pos = 0;
        for group in groups {
            let num_tasks = self.num_tasks(group, instances.len(), &mut outcome.diagnostics);
            let max_per_instance = self.max_tasks_per_instance(group, &mut outcome.diagnostics);
            assigned.iter_mut().for_each(|count| *count = 0);

            let mut placed = 0;
            while placed < num_tasks {
                let instance = &instances[pos];
                let task = take_task(&mut working, instance, group).unwrap_or_else(|| DatastreamTask::new(group));
                outcome.assignment.entry(instance.clone()).or_default().insert(task);
                assigned[pos] += 1;
                placed += 1;
                match next_with_capacity(&assigned, max_per_instance, pos) {
                    Some(next) => pos = next,
                    None => break,
                }
            }
            if placed < num_tasks {
                outcome.diagnostics.push(AssignmentDiagnostic::CapacityExceeded {
                    group: group.name().into(),
                    requested: num_tasks,
                    placed,
                });
            }
        }
        outcome
    }

    /// The number of tasks to create for the given group.
    ///
    /// The largest positive `maxTasks` override among the group's datastreams wins, then the
    /// configured default, then the number of instances.
    fn num_tasks(&self, group: &DatastreamGroup, num_instances: usize, diagnostics: &mut Vec<AssignmentDiagnostic>) -> usize {
        metadata_cap(group, METADATA_MAX_TASKS, diagnostics)
            .or(self.config.default_max_tasks)
            .unwrap_or(num_instances)
    }

    /// The cap on the number of the group's tasks any one instance may hold, if any.
    fn max_tasks_per_instance(&self, group: &DatastreamGroup, diagnostics: &mut Vec<AssignmentDiagnostic>) -> Option<usize> {
        metadata_cap(group, METADATA_MAX_TASKS_PER_INSTANCE, diagnostics).or(self.config.default_max_tasks_per_instance)
    }
}

/// Find the largest positive cap found under `key` across the group's datastreams.
///
/// Values which are not positive integers are ignored and reported.
fn metadata_cap(group: &DatastreamGroup, key: &str, diagnostics: &mut Vec<AssignmentDiagnostic>) -> Option<usize> {
    let mut cap = None;
    for (datastream, value) in group.metadata_values(key) {
        match value.trim().parse::<usize>() {
            Ok(val) if val > 0 => cap = cap.max(Some(val)),
            _ => {
                tracing::warn!(datastream = %datastream.name, key, value, "ignoring invalid datastream metadata value");
                diagnostics.push(AssignmentDiagnostic::InvalidMetadata {
                    datastream: datastream.name.clone(),
                    key: key.into(),
                    value: value.into(),
                });
            }
        }
    }
    cap
}

/// Remove and return the first task of the given group currently assigned to the instance.
fn take_task(working: &mut Assignment, instance: &str, group: &DatastreamGroup) -> Option<DatastreamTask> {
    let tasks = working.get_mut(instance)?;
    let task = tasks.iter().find(|task| task.task_prefix() == group.task_prefix)?.clone();
    tasks.take(&task)
}

/// Find the next instance position after `prev` which still has capacity for the group.
///
/// Returns `None` once every instance is at capacity.
fn next_with_capacity(assigned: &[usize], max_per_instance: Option<usize>, prev: usize) -> Option<usize> {
    let mut pos = (prev + 1) % assigned.len();
    let max = match max_per_instance {
        Some(max) => max,
        None => return Some(pos),
    };
    while assigned[pos] >= max && pos != prev {
        pos = (pos + 1) % assigned.len();
    }
    if assigned[pos] < max {
        Some(pos)
    } else {
        None
    }
}
