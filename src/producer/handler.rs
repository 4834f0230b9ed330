use std::fmt::Debug;
use std::sync::Arc;

use crate::checkpoint::CheckpointTracker;
use crate::connector_metrics::{Counter, MetricsRegistry};
use crate::error::{CoordinatorResult, TransportSendFailure};
use crate::models::SourcePartition;
use crate::producer::{RecordMetadata, SendCallback, Transport};

/// The class name under which handler metrics are registered.
pub const METRICS_CLASS: &str = "ProducerHandler";

const METRIC_SENDS: &str = "sends";
const METRIC_ACKS: &str = "acks";
const METRIC_SEND_FAILURES: &str = "sendFailures";

/// Counters of a single handler.
#[derive(Clone)]
struct HandlerMetrics {
    sends: Counter,
    acks: Counter,
    send_failures: Counter,
}

/// A producer handler which tracks checkpoints of in-flight records without flushing.
pub struct ProducerHandler<T: Transport, C> {
    transport: Arc<T>,
    tracker: Arc<CheckpointTracker<C>>,
    metrics: HandlerMetrics,
}

impl<T, C> ProducerHandler<T, C>
where
    T: Transport,
    C: Ord + Clone + Debug + Send + 'static,
{
    /// Create a new instance for the task identified by `task_key`.
    ///
    /// The transport's periodic flush is disabled, as acks drive checkpoint progress instead.
    pub fn new(transport: Arc<T>, tracker: Arc<CheckpointTracker<C>>, registry: &MetricsRegistry, task_key: &str) -> Self {
        transport.set_periodic_flush(false);
        let metrics = HandlerMetrics {
            sends: registry.counter(METRICS_CLASS, task_key, METRIC_SENDS),
            acks: registry.counter(METRICS_CLASS, task_key, METRIC_ACKS),
            send_failures: registry.counter(METRICS_CLASS, task_key, METRIC_SEND_FAILURES),
        };
        Self { transport, tracker, metrics }
    }

    /// Send a record through the transport, tracking its checkpoint.
    ///
    /// The checkpoint is registered as in flight on `(source, partition)` before the record is
    /// handed over, and is acked once the transport reports a successful delivery. The user
    /// callback, if any, always observes the transport's outcome.
    ///
    /// Returns an error without sending anything if the checkpoint does not follow the last
    /// checkpoint registered on the source partition.
    #[tracing::instrument(level = "trace", skip(self, record, callback))]
    pub fn send(&self, record: T::Record, source: &str, partition: i32, checkpoint: C, callback: Option<SendCallback>) -> CoordinatorResult<()> {
        let source_partition = SourcePartition::new(source, partition);
        let registration = self.tracker.register(&source_partition, checkpoint.clone())?;
        self.metrics.sends.increment();

        let (tracker, metrics) = (Arc::downgrade(&self.tracker), self.metrics.clone());
        self.transport.send(
            record,
            Box::new(move |metadata: RecordMetadata, err: Option<TransportSendFailure>| {
                match &err {
                    None => {
                        // A dropped tracker means the task has shut down.
                        let acked = tracker
                            .upgrade()
                            .map(|tracker| tracker.ack_registration(&registration, checkpoint))
                            .unwrap_or(false);
                        if acked {
                            metrics.acks.increment();
                        }
                    }
                    Some(err) => {
                        tracing::debug!(
                            error = ?err,
                            source_partition = %registration.source_partition,
                            ?checkpoint,
                            "failed to send record, checkpoint remains in flight"
                        );
                        metrics.send_failures.increment();
                    }
                }
                if let Some(callback) = callback {
                    callback(metadata, err);
                }
            }),
        );
        Ok(())
    }

    /// The tracker backing this handler.
    pub fn tracker(&self) -> &Arc<CheckpointTracker<C>> {
        &self.tracker
    }

    /// The latest fully acked checkpoint of the given source partition.
    pub fn ack_checkpoint(&self, source: &str, partition: i32) -> Option<C> {
        self.tracker.ack_checkpoint(&SourcePartition::new(source, partition))
    }

    /// The number of records in flight on the given source partition.
    pub fn in_flight_count(&self, source: &str, partition: i32) -> usize {
        self.tracker.in_flight_count(&SourcePartition::new(source, partition))
    }

    /// The number of acks on the given source partition waiting on an earlier checkpoint.
    pub fn acked_past_checkpoint_count(&self, source: &str, partition: i32) -> usize {
        self.tracker.acked_past_checkpoint_count(&SourcePartition::new(source, partition))
    }

    /// The low-watermark checkpoint across all source partitions of this handler.
    pub fn low_watermark(&self, default: Option<C>) -> Option<C> {
        self.tracker.low_watermark(default)
    }

    /// Drop all checkpoint tracking state.
    pub fn clear(&self) {
        self.tracker.clear();
    }

    /// Drop the checkpoint tracking state of a single source partition.
    pub fn clear_partition(&self, source: &str, partition: i32) {
        self.tracker.clear_partition(&SourcePartition::new(source, partition));
    }
}
