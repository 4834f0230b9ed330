use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::assignment::{AssignmentOutcome, BroadcastAssigner, BroadcastConfig, LoadBasedPartitionAssigner, ThroughputOracle};
use crate::checkpoint::CheckpointTracker;
use crate::config::Config;
use crate::error::{AssignmentDiagnostic, CoordinatorError, CoordinatorResult};
use crate::models::{self, Assignment, DatastreamGroup, DatastreamGroupPartitionsMetadata, DatastreamTask, PartitionThroughputInfo, TaskId};

/// The result of a rebalance round.
#[derive(Clone, Debug, Default)]
pub struct RebalanceOutcome {
    /// The new assignment to publish.
    pub assignment: Assignment,
    /// Tasks which were assigned to an instance before this round but no longer are.
    pub removed: Vec<(String, DatastreamTask)>,
    /// Tasks which are newly assigned to an instance by this round.
    pub added: Vec<(String, DatastreamTask)>,
    /// Non-fatal findings of this round.
    pub diagnostics: Vec<AssignmentDiagnostic>,
}

/// Orchestrates rebalance rounds.
pub struct AssignmentCoordinator {
    broadcast: BroadcastAssigner,
    partitions: LoadBasedPartitionAssigner,
    oracle: Arc<dyn ThroughputOracle>,
    /// Whether partitions are placed by the cluster using throughput information.
    partition_assignment_enabled: bool,
}

impl AssignmentCoordinator {
    /// Create a new instance.
    pub fn new(
        broadcast: BroadcastAssigner, partitions: LoadBasedPartitionAssigner, oracle: Arc<dyn ThroughputOracle>, partition_assignment_enabled: bool,
    ) -> Self {
        Self {
            broadcast,
            partitions,
            oracle,
            partition_assignment_enabled,
        }
    }

    /// Create a new instance from the given runtime config.
    pub fn from_config(config: &Config, oracle: Arc<dyn ThroughputOracle>) -> Self {
        Self::new(
            BroadcastAssigner::new(BroadcastConfig {
                default_max_tasks: config.default_max_tasks,
                default_max_tasks_per_instance: config.default_max_tasks_per_instance,
            }),
            LoadBasedPartitionAssigner::new(PartitionThroughputInfo::new(config.default_kb_rate, config.default_msg_rate)),
            oracle,
            config.partition_assignment_enabled,
        )
    }

    /// Run a rebalance round.
    ///
    /// Tasks are first fanned out across instances. Then, if partition assignment is enabled,
    /// the partitions of every group found in `partitions` are placed onto that group's tasks.
    /// A group whose partition placement fails keeps its base assignment and is reported.
    #[tracing::instrument(level = "trace", skip(self, groups, instances, current, partitions))]
    pub fn rebalance(
        &self, groups: &[DatastreamGroup], instances: &[String], current: &Assignment, partitions: &[DatastreamGroupPartitionsMetadata],
    ) -> RebalanceOutcome {
        let AssignmentOutcome { mut assignment, mut diagnostics } = self.broadcast.assign(groups, instances, current);

        if self.partition_assignment_enabled && !partitions.is_empty() {
            let throughput = self.oracle.get();
            for metadata in partitions {
                let group = metadata.group.name();
                if !groups.iter().any(|g| g.name() == group) {
                    continue;
                }
                let unassigned = unassigned_partitions(&assignment, metadata);
                match self.partitions.assign_partitions(&throughput, &assignment, unassigned, metadata) {
                    Ok(updated) => assignment = updated,
                    Err(err) => {
                        tracing::error!(error = ?err, group, "partition assignment failed, keeping base assignment for group");
                        diagnostics.push(AssignmentDiagnostic::PartitionAssignmentFailed {
                            group: group.into(),
                            reason: err.to_string(),
                        });
                    }
                }
            }
        }

        for diagnostic in diagnostics.iter() {
            if let AssignmentDiagnostic::CapacityExceeded { group, requested, placed } = diagnostic {
                tracing::warn!(%group, requested, placed, "datastream group requested more tasks than instances can hold");
            }
        }

        let (removed, added) = diff(current, &assignment);
        tracing::info!(
            instances = instances.len(),
            tasks = models::task_count(&assignment),
            removed = removed.len(),
            added = added.len(),
            "rebalance round computed"
        );
        RebalanceOutcome {
            assignment,
            removed,
            added,
            diagnostics,
        }
    }
}

/// The partitions of the metadata's group which no task of the group currently holds.
fn unassigned_partitions(assignment: &Assignment, metadata: &DatastreamGroupPartitionsMetadata) -> Vec<String> {
    let held: BTreeSet<&String> = assignment
        .values()
        .flatten()
        .filter(|task| task.task_prefix() == metadata.group.name())
        .flat_map(|task| task.partitions().iter())
        .collect();
    metadata.partitions.iter().filter(|partition| !held.contains(partition)).cloned().collect()
}

/// Compute the tasks removed from & added to each instance between two assignments.
fn diff(old: &Assignment, new: &Assignment) -> (Vec<(String, DatastreamTask)>, Vec<(String, DatastreamTask)>) {
    let missing_from = |from: &Assignment, to: &Assignment| -> Vec<(String, DatastreamTask)> {
        from.iter()
            .flat_map(|(instance, tasks)| {
                let other = to.get(instance);
                tasks
                    .iter()
                    .filter(move |task| !other.map(|other| other.contains(*task)).unwrap_or(false))
                    .map(move |task| (instance.clone(), task.clone()))
            })
            .collect()
    };
    (missing_from(old, new), missing_from(new, old))
}

/// Wait for the tracker of a removed task to drain, then clear it.
///
/// Returns the task's final low-watermark, observed just before clearing. If records are still
/// in flight once `timeout` expires, the tracker is cleared anyway and `DrainTimeout` is
/// returned; their checkpoints are lost and will be replayed from the last committed
/// checkpoint.
#[tracing::instrument(level = "trace", skip(tracker, timeout, poll_interval))]
pub async fn drain_and_clear<C>(
    task: TaskId, tracker: Arc<CheckpointTracker<C>>, timeout: Duration, poll_interval: Duration,
) -> CoordinatorResult<Option<C>>
where
    C: Ord + Clone + Debug,
{
    let drained = tokio::time::timeout(timeout, async {
        while tracker.total_in_flight() > 0 {
            tokio::time::sleep(poll_interval).await;
        }
    })
    .await;

    let res = match drained {
        Ok(()) => Ok(tracker.low_watermark(tracker.latest_ack_checkpoint())),
        Err(_) => Err(CoordinatorError::DrainTimeout {
            task: task.clone(),
            in_flight: tracker.total_in_flight(),
        }),
    };
    tracker.clear();
    tracing::debug!(%task, drained = res.is_ok(), "task checkpoint tracker cleared");
    res
}
