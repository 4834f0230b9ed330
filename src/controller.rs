//! Assignment controller.
//!
//! The controller owns the cluster's view of live instances, datastream groups and their
//! partitions. Every change to that view triggers a rebalance round, whose resulting assignment
//! is published through an `AssignmentHandle`. Tasks removed by a round have their checkpoint
//! trackers drained & cleared in the background.
//!
//! On an interval, the low-watermark of every registered task tracker is committed to the
//! checkpoint store. Commits per task only ever move forward.

use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::sync::Arc;

use anyhow::Result;
use arc_swap::ArcSwap;
use futures::stream::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};

use crate::assignment::{drain_and_clear, AssignmentCoordinator};
use crate::checkpoint::CheckpointTracker;
use crate::config::Config;
use crate::error::CoordinatorResult;
use crate::models::{self, Assignment, DatastreamGroup, DatastreamGroupPartitionsMetadata, TaskId};
use crate::store::CheckpointStore;

const METRIC_REBALANCES: &str = "datastream_coordinator_rebalances";
const METRIC_ASSIGNED_TASKS: &str = "datastream_coordinator_assigned_tasks";
const METRIC_CHECKPOINT_COMMITS: &str = "datastream_coordinator_checkpoint_commits";
const METRIC_DRAIN_TIMEOUTS: &str = "datastream_coordinator_drain_timeouts";

/// A message sent to the controller.
pub enum ControllerMsg<C> {
    /// The set of live instances has changed.
    InstancesChanged(Vec<String>),
    /// The set of datastream groups has changed.
    DatastreamsChanged(Vec<DatastreamGroup>),
    /// The partitions of the groups placed by the cluster have changed.
    PartitionsChanged(Vec<DatastreamGroupPartitionsMetadata>),
    /// A task has started and tracks its checkpoints with the given tracker.
    ///
    /// Ignored unless the task is part of the published assignment.
    RegisterTracker(TaskId, Arc<CheckpointTracker<C>>),
    /// Run a rebalance round with the current view.
    Rebalance,
}

/// A handle to the most recently published assignment.
#[derive(Clone, Default)]
pub struct AssignmentHandle(Arc<ArcSwap<Assignment>>);

impl AssignmentHandle {
    /// Load the current assignment snapshot.
    pub fn load(&self) -> Arc<Assignment> {
        self.0.load_full()
    }

    fn store(&self, assignment: Assignment) {
        self.0.store(Arc::new(assignment));
    }
}

/// The output of draining a removed task's tracker.
type DrainResult<C> = (TaskId, CoordinatorResult<Option<C>>);

/// A controller driving rebalance rounds & checkpoint commits.
pub struct Controller<C> {
    /// The application's runtime config.
    config: Arc<Config>,
    /// The coordinator used for rebalance rounds.
    coordinator: AssignmentCoordinator,
    /// The store to which task checkpoints are committed.
    store: Arc<dyn CheckpointStore>,

    /// A channel of inbound controller messages.
    events_rx: ReceiverStream<ControllerMsg<C>>,
    /// A channel of finished drains.
    drains_tx: mpsc::Sender<DrainResult<C>>,
    /// A channel of finished drains.
    drains_rx: ReceiverStream<DrainResult<C>>,
    /// A channel used for triggering graceful shutdown.
    shutdown_tx: broadcast::Sender<()>,
    /// A channel used for triggering graceful shutdown.
    shutdown_rx: BroadcastStream<()>,

    /// The published assignment.
    assignment: AssignmentHandle,
    /// The live instances.
    instances: Vec<String>,
    /// The datastream groups to assign.
    groups: Vec<DatastreamGroup>,
    /// The partitions of groups placed by the cluster.
    partitions: Vec<DatastreamGroupPartitionsMetadata>,
    /// The trackers of all running tasks.
    trackers: HashMap<TaskId, Arc<CheckpointTracker<C>>>,
    /// The trackers of removed tasks which are still draining.
    draining: HashMap<TaskId, Arc<CheckpointTracker<C>>>,
    /// The last checkpoint committed for each task.
    last_committed: HashMap<TaskId, C>,
}

impl<C> Controller<C>
where
    C: Ord + Clone + Debug + Display + Send + 'static,
{
    /// Create a new instance.
    pub fn new(
        config: Arc<Config>, coordinator: AssignmentCoordinator, store: Arc<dyn CheckpointStore>, shutdown_tx: broadcast::Sender<()>,
        events_rx: mpsc::Receiver<ControllerMsg<C>>,
    ) -> (Self, AssignmentHandle) {
        metrics::register_counter!(METRIC_REBALANCES, metrics::Unit::Count, "the number of rebalance rounds run");
        metrics::register_gauge!(METRIC_ASSIGNED_TASKS, metrics::Unit::Count, "the number of tasks in the published assignment");
        metrics::register_counter!(METRIC_CHECKPOINT_COMMITS, metrics::Unit::Count, "the number of task checkpoints committed");
        metrics::register_counter!(METRIC_DRAIN_TIMEOUTS, metrics::Unit::Count, "the number of removed tasks force-cleared with records in flight");

        let assignment = AssignmentHandle::default();
        let (drains_tx, drains_rx) = mpsc::channel(100);
        (
            Self {
                config,
                coordinator,
                store,
                events_rx: ReceiverStream::new(events_rx),
                drains_tx,
                drains_rx: ReceiverStream::new(drains_rx),
                shutdown_rx: BroadcastStream::new(shutdown_tx.subscribe()),
                shutdown_tx,
                assignment: assignment.clone(),
                instances: vec![],
                groups: vec![],
                partitions: vec![],
                trackers: HashMap::new(),
                draining: HashMap::new(),
                last_committed: HashMap::new(),
            },
            assignment,
        )
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        tracing::debug!("assignment controller has started");

        let mut commit_interval = tokio::time::interval(self.config.checkpoint_commit_interval());
        loop {
            tokio::select! {
                msg_opt = self.events_rx.next() => self.handle_ctl_msg(msg_opt).await,
                Some((task, res)) = self.drains_rx.next() => self.handle_drain_finished(task, res).await,
                _ = commit_interval.tick() => self.commit_watermarks().await,
                _ = self.shutdown_rx.next() => break,
            }
        }

        // Begin shutdown routine.
        self.drain_all().await;
        tracing::debug!("assignment controller has shutdown");
        Ok(())
    }

    /// Handle a controller message.
    #[tracing::instrument(level = "trace", skip(self, msg_opt))]
    async fn handle_ctl_msg(&mut self, msg_opt: Option<ControllerMsg<C>>) {
        let msg = match msg_opt {
            Some(msg) => msg,
            None => {
                let _res = self.shutdown_tx.send(());
                return;
            }
        };
        match msg {
            ControllerMsg::InstancesChanged(instances) => {
                self.instances = instances;
                self.rebalance();
            }
            ControllerMsg::DatastreamsChanged(groups) => {
                self.groups = groups;
                self.rebalance();
            }
            ControllerMsg::PartitionsChanged(partitions) => {
                self.partitions = partitions;
                self.rebalance();
            }
            ControllerMsg::RegisterTracker(task, tracker) => {
                if models::instance_of(&self.assignment.load(), &task).is_none() {
                    tracing::warn!(%task, "ignoring checkpoint tracker of a task which is not assigned");
                    return;
                }
                tracing::debug!(%task, "registering task checkpoint tracker");
                self.trackers.insert(task, tracker);
            }
            ControllerMsg::Rebalance => self.rebalance(),
        }
    }

    /// Run a rebalance round, publish its assignment, and drain the trackers of removed tasks.
    #[tracing::instrument(level = "trace", skip(self))]
    fn rebalance(&mut self) {
        let current = self.assignment.load();
        let outcome = self.coordinator.rebalance(&self.groups, &self.instances, &current, &self.partitions);
        metrics::increment_counter!(METRIC_REBALANCES);
        let assigned_tasks = models::task_count(&outcome.assignment) as f64;
        metrics::gauge!(METRIC_ASSIGNED_TASKS, assigned_tasks);

        for (instance, task) in outcome.removed.iter() {
            if models::instance_of(&outcome.assignment, task.task_id()).is_some() {
                continue;
            }
            tracing::debug!(%instance, %task, "task removed from assignment");
            self.spawn_drain(task.task_id().clone());
        }
        self.assignment.store(outcome.assignment);
    }

    /// Drain & clear the tracker of a removed task in the background.
    fn spawn_drain(&mut self, task: TaskId) {
        let tracker = match self.trackers.remove(&task) {
            Some(tracker) => tracker,
            None => return,
        };
        self.draining.insert(task.clone(), tracker.clone());
        let (tx, timeout, poll_interval) = (self.drains_tx.clone(), self.config.shutdown_drain_timeout(), self.config.drain_poll_interval());
        let _handle = tokio::spawn(async move {
            let res = drain_and_clear(task.clone(), tracker, timeout, poll_interval).await;
            let _res = tx.send((task, res)).await;
        });
    }

    /// Handle the outcome of draining a removed task, committing its final checkpoint.
    #[tracing::instrument(level = "trace", skip(self, res))]
    async fn handle_drain_finished(&mut self, task: TaskId, res: CoordinatorResult<Option<C>>) {
        self.draining.remove(&task);
        let last = self.last_committed.remove(&task);
        match res {
            Ok(Some(checkpoint)) if last.as_ref().map(|last| &checkpoint > last).unwrap_or(true) => {
                let payload = HashMap::from([(task.clone(), checkpoint.to_string())]);
                match self.store.commit(payload).await {
                    Ok(()) => metrics::increment_counter!(METRIC_CHECKPOINT_COMMITS),
                    Err(err) => tracing::error!(error = ?err, %task, "error committing final checkpoint of removed task"),
                }
            }
            Ok(_) => (),
            Err(err) => {
                tracing::warn!(error = ?err, "removed task force-cleared, its unacked records will be replayed");
                metrics::increment_counter!(METRIC_DRAIN_TIMEOUTS);
            }
        }
    }

    /// Commit the low-watermark of every running task which has advanced since its last commit.
    #[tracing::instrument(level = "trace", skip(self))]
    async fn commit_watermarks(&mut self) {
        let batch: HashMap<TaskId, C> = self
            .trackers
            .iter()
            .filter_map(|(task, tracker)| next_commit(tracker, self.last_committed.get(task)).map(|checkpoint| (task.clone(), checkpoint)))
            .collect();
        if batch.is_empty() {
            return;
        }

        let payload = batch.iter().map(|(task, checkpoint)| (task.clone(), checkpoint.to_string())).collect();
        match self.store.commit(payload).await {
            Ok(()) => {
                tracing::debug!(tasks = batch.len(), "committed task checkpoints");
                let committed = batch.len() as u64;
                metrics::counter!(METRIC_CHECKPOINT_COMMITS, committed);
                self.last_committed.extend(batch);
            }
            Err(err) => tracing::error!(error = ?err, "error committing task checkpoints"),
        }
    }

    /// Drain every remaining tracker, bounded by the configured drain timeout, then clear them.
    #[tracing::instrument(level = "trace", skip(self))]
    async fn drain_all(&mut self) {
        let (timeout, poll_interval) = (self.config.shutdown_drain_timeout(), self.config.drain_poll_interval());
        let drains = self.trackers.drain().map(|(task, tracker)| async move {
            let res = drain_and_clear(task.clone(), tracker, timeout, poll_interval).await;
            (task, res)
        });
        for (task, res) in futures::future::join_all(drains).await {
            self.handle_drain_finished(task, res).await;
        }

        // Await any drains which were already underway.
        let _res = tokio::time::timeout(timeout, async {
            while !self.draining.is_empty() {
                match self.drains_rx.next().await {
                    Some((task, res)) => self.handle_drain_finished(task, res).await,
                    None => break,
                }
            }
        })
        .await;
        for (task, tracker) in self.draining.drain() {
            tracing::warn!(%task, "clearing task checkpoint tracker which did not finish draining");
            tracker.clear();
        }
    }
}

/// The checkpoint to commit for the given tracker, if it has advanced past `last`.
///
/// A fully drained tracker reports the highest checkpoint it has seen acked.
fn next_commit<C>(tracker: &CheckpointTracker<C>, last: Option<&C>) -> Option<C>
where
    C: Ord + Clone + Debug,
{
    let default = tracker.latest_ack_checkpoint().or_else(|| last.cloned());
    tracker.low_watermark(default).filter(|checkpoint| match last {
        Some(last) => checkpoint > last,
        None => true,
    })
}
