use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::models::SourcePartition;

/// A handle to a registered checkpoint, used to route its ack back to the status it was
/// registered against.
///
/// Statuses are replaced when a partition is cleared, so a handle also carries the generation
/// of the status. Acks carrying an older generation are ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    /// The source partition of the registered checkpoint.
    pub source_partition: SourcePartition,
    generation: u64,
}

/// Tracks in-flight and acknowledged checkpoints of every source partition of a task.
///
/// Locking is per source partition: registrations and acks on one partition never contend
/// with those of another partition.
pub struct CheckpointTracker<C> {
    /// The callback status of each tracked source partition.
    statuses: DashMap<SourcePartition, Arc<Mutex<CallbackStatus<C>>>>,
    /// The generation to hand out to the next created status.
    next_generation: AtomicU64,
}

impl<C> Default for CheckpointTracker<C>
where
    C: Ord + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C> CheckpointTracker<C>
where
    C: Ord + Clone + Debug,
{
    /// Create a new instance.
    pub fn new() -> Self {
        Self {
            statuses: DashMap::new(),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Register the given checkpoint as in flight on the given source partition.
    ///
    /// Checkpoints registered on a source partition must be strictly increasing. A violating
    /// registration is rejected with `OutOfOrderRegister` and leaves the tracker untouched.
    pub fn register(&self, source_partition: &SourcePartition, checkpoint: C) -> CoordinatorResult<Registration> {
        let status = self.status_or_insert(source_partition);
        let mut status = status.lock();
        if let Some(last) = status.last_registered() {
            if checkpoint <= *last {
                return Err(CoordinatorError::OutOfOrderRegister {
                    source_partition: source_partition.clone(),
                    checkpoint: format!("{:?}", checkpoint),
                    last: format!("{:?}", last),
                });
            }
        }
        status.in_flight.push_back(checkpoint);
        Ok(Registration {
            source_partition: source_partition.clone(),
            generation: status.generation,
        })
    }

    /// Ack the given checkpoint on the current status of the given source partition.
    ///
    /// Returns `true` if the ack was recorded. Acks of checkpoints which are not in flight,
    /// and duplicate acks, are ignored.
    pub fn ack(&self, source_partition: &SourcePartition, checkpoint: C) -> bool {
        match self.status(source_partition) {
            Some(status) => status.lock().ack(checkpoint),
            None => {
                tracing::debug!(%source_partition, ?checkpoint, "ignoring ack for untracked source partition");
                false
            }
        }
    }

    /// Ack the given checkpoint against the status it was registered with.
    ///
    /// If the source partition has been cleared since registration, the ack is ignored.
    pub fn ack_registration(&self, registration: &Registration, checkpoint: C) -> bool {
        let status = match self.status(&registration.source_partition) {
            Some(status) => status,
            None => return false,
        };
        let mut status = status.lock();
        if status.generation != registration.generation {
            tracing::debug!(
                source_partition = %registration.source_partition,
                ?checkpoint,
                "ignoring ack registered against a cleared status"
            );
            return false;
        }
        status.ack(checkpoint)
    }

    /// Get the latest checkpoint of the given source partition for which all earlier
    /// registered checkpoints have been acked.
    pub fn ack_checkpoint(&self, source_partition: &SourcePartition) -> Option<C> {
        self.status(source_partition).and_then(|status| status.lock().current.clone())
    }

    /// Get the number of checkpoints in flight on the given source partition.
    pub fn in_flight_count(&self, source_partition: &SourcePartition) -> usize {
        self.status(source_partition)
            .map(|status| status.lock().in_flight.len())
            .unwrap_or(0)
    }

    /// Get the number of acks on the given source partition which are waiting on an earlier
    /// checkpoint before they can be promoted.
    pub fn acked_past_checkpoint_count(&self, source_partition: &SourcePartition) -> usize {
        self.status(source_partition).map(|status| status.lock().acked.len()).unwrap_or(0)
    }

    /// Get the in-flight count of every tracked source partition.
    pub fn in_flight_counts(&self) -> HashMap<SourcePartition, usize> {
        self.statuses
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().lock().in_flight.len()))
            .collect()
    }

    /// Get the acked-past-checkpoint count of every tracked source partition.
    pub fn acked_past_checkpoint_counts(&self) -> HashMap<SourcePartition, usize> {
        self.statuses
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().lock().acked.len()))
            .collect()
    }

    /// Get the total number of checkpoints in flight across all source partitions.
    pub fn total_in_flight(&self) -> usize {
        self.statuses.iter().map(|entry| entry.value().lock().in_flight.len()).sum()
    }

    /// Get the low-watermark across all source partitions with checkpoints in flight, ordering
    /// checkpoints with their natural order.
    ///
    /// See `low_watermark_by`.
    pub fn low_watermark(&self, default: Option<C>) -> Option<C> {
        self.low_watermark_by(default, C::cmp)
    }

    /// Get the smallest ack checkpoint among all source partitions which have checkpoints in
    /// flight.
    ///
    /// - If no source partition has anything in flight, `default` is returned.
    /// - If any source partition with checkpoints in flight has not had an ack promoted yet,
    ///   `None` is returned.
    ///
    /// This is not atomic across source partitions. It assumes checkpoints are comparable
    /// across partitions, as is the case for sources with a global monotonic sequence.
    pub fn low_watermark_by<F>(&self, default: Option<C>, cmp: F) -> Option<C>
    where
        F: Fn(&C, &C) -> Ordering,
    {
        let mut low_watermark: Option<C> = None;
        for entry in self.statuses.iter() {
            let status = entry.value().lock();
            if status.in_flight.is_empty() {
                continue;
            }
            let checkpoint = match &status.current {
                Some(checkpoint) => checkpoint,
                None => return None,
            };
            let is_lower = match &low_watermark {
                Some(low) => cmp(checkpoint, low) == Ordering::Less,
                None => true,
            };
            if is_lower {
                low_watermark = Some(checkpoint.clone());
            }
        }
        low_watermark.or(default)
    }

    /// The highest ack checkpoint across all source partitions.
    ///
    /// Once nothing is in flight, every registered checkpoint has been acked, and this is the
    /// position a fully drained task has reached.
    pub fn latest_ack_checkpoint(&self) -> Option<C> {
        self.statuses.iter().filter_map(|entry| entry.value().lock().current.clone()).max()
    }

    /// Drop all tracking state.
    ///
    /// Intended for use after flushing and receiving a new partition assignment.
    pub fn clear(&self) {
        self.statuses.clear();
    }

    /// Drop the tracking state of a single source partition.
    pub fn clear_partition(&self, source_partition: &SourcePartition) {
        self.statuses.remove(source_partition);
    }

    /// All currently tracked source partitions.
    pub fn source_partitions(&self) -> Vec<SourcePartition> {
        self.statuses.iter().map(|entry| entry.key().clone()).collect()
    }

    fn status(&self, source_partition: &SourcePartition) -> Option<Arc<Mutex<CallbackStatus<C>>>> {
        self.statuses.get(source_partition).map(|entry| entry.value().clone())
    }

    fn status_or_insert(&self, source_partition: &SourcePartition) -> Arc<Mutex<CallbackStatus<C>>> {
        if let Some(status) = self.status(source_partition) {
            return status;
        }
        self.statuses
            .entry(source_partition.clone())
            .or_insert_with(|| {
                let generation = self.next_generation.fetch_add(1, AtomicOrdering::SeqCst);
                Arc::new(Mutex::new(CallbackStatus::new(generation)))
            })
            .value()
            .clone()
    }
}

/// The callback status of the in-flight checkpoints of a single source partition.
struct CallbackStatus<C> {
    /// The generation of this status.
    generation: u64,
    /// The last checkpoint promoted from the head of the in-flight queue.
    current: Option<C>,
    /// All registered checkpoints which have not yet been promoted, in registration order.
    in_flight: VecDeque<C>,
    /// Acked checkpoints which are still waiting on an earlier in-flight checkpoint.
    acked: BTreeSet<C>,
}

impl<C> CallbackStatus<C>
where
    C: Ord + Clone + Debug,
{
    fn new(generation: u64) -> Self {
        Self {
            generation,
            current: None,
            in_flight: VecDeque::new(),
            acked: BTreeSet::new(),
        }
    }

    /// The last checkpoint registered on this status.
    fn last_registered(&self) -> Option<&C> {
        self.in_flight.back().or_else(|| self.current.as_ref())
    }

    /// Record an ack, then promote the longest contiguous acked prefix of the in-flight queue.
    fn ack(&mut self, checkpoint: C) -> bool {
        // The in-flight queue is strictly increasing, so it can be searched directly.
        if self.in_flight.binary_search(&checkpoint).is_err() {
            tracing::warn!(?checkpoint, "ignoring ack for a checkpoint which is not in flight");
            return false;
        }
        if !self.acked.insert(checkpoint) {
            return false;
        }
        while let Some(head) = self.in_flight.front() {
            if !self.acked.remove(head) {
                break;
            }
            self.current = self.in_flight.pop_front();
        }
        true
    }
}
