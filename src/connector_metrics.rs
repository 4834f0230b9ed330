//! Metrics registries.
//!
//! Connector and handler metrics are scoped to an explicit `MetricsRegistry` rather than to
//! process-global state, so that independent registries can be built side by side. Metrics are
//! keyed by `(class_name, key, name)`, where `key` is usually a task name, or `AGGREGATE` for
//! values summed across all tasks of a class.
//!
//! Process level metrics of the controller go through the `metrics` facade instead, see
//! `controller`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

/// The key under which values aggregated across all tasks of a class are registered.
pub const AGGREGATE: &str = "aggregate";

/// Number of topics assigned to a task.
pub const NUM_TOPICS: &str = "numTopics";
/// Number of partitions which have been manually paused.
pub const NUM_CONFIG_PAUSED_PARTITIONS: &str = "numConfigPausedPartitions";
/// Number of partitions auto-paused because of an error.
pub const NUM_AUTO_PAUSED_PARTITIONS_ON_ERROR: &str = "numAutoPausedPartitionsOnError";
/// Number of partitions auto-paused because of too many in-flight messages.
pub const NUM_AUTO_PAUSED_PARTITIONS_ON_INFLIGHT_MESSAGES: &str = "numAutoPausedPartitionsOnInFlightMessages";
/// Number of partitions auto-paused while their destination topic does not exist yet.
pub const NUM_AUTO_PAUSED_PARTITIONS_WAITING_FOR_DEST_TOPIC: &str = "numAutoPausedPartitionsAwaitingDestTopic";
/// Time taken to return from a source poll.
pub const POLL_DURATION_MS: &str = "pollDurationMs";
/// Time spent processing between source polls.
pub const TIME_SPENT_BETWEEN_POLLS_MS: &str = "timeSpentBetweenPollsMs";
/// Process plus send time per event returned from a source poll.
pub const PER_EVENT_PROCESSING_TIME_NANOS: &str = "perEventProcessingTimeNs";

/// The fully qualified name of a registered metric.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricName {
    pub class_name: String,
    pub key: String,
    pub name: String,
}

impl MetricName {
    pub fn new(class_name: &str, key: &str, name: &str) -> Self {
        Self {
            class_name: class_name.to_string(),
            key: key.to_string(),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for MetricName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.class_name, self.key, self.name)
    }
}

/// A shared, settable integer value.
#[derive(Clone, Debug, Default)]
pub struct Gauge(Arc<AtomicI64>);

impl Gauge {
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, val: i64) {
        self.0.store(val, Ordering::SeqCst);
    }

    pub fn add(&self, delta: i64) {
        self.0.fetch_add(delta, Ordering::SeqCst);
    }
}

/// A monotonically increasing count.
#[derive(Clone, Debug, Default)]
pub struct Counter(Arc<AtomicI64>);

impl Counter {
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// A summary of all values recorded into a histogram.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: u64,
    pub min: u64,
    pub max: u64,
}

/// A distribution of recorded values, summarized by count, sum, min & max.
#[derive(Clone, Debug, Default)]
pub struct Histogram(Arc<Mutex<HistogramSnapshot>>);

impl Histogram {
    pub fn update(&self, val: u64) {
        let mut snapshot = self.0.lock();
        snapshot.min = if snapshot.count == 0 { val } else { snapshot.min.min(val) };
        snapshot.max = snapshot.max.max(val);
        snapshot.count += 1;
        snapshot.sum = snapshot.sum.saturating_add(val);
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        *self.0.lock()
    }
}

/// A registry of named metrics.
#[derive(Default)]
pub struct MetricsRegistry {
    /// Gauges exposed by name.
    gauges: DashMap<MetricName, Gauge>,
    /// Counters exposed by name.
    counters: DashMap<MetricName, Counter>,
    /// Histograms exposed by name.
    histograms: DashMap<MetricName, Histogram>,
    /// Backing values shared between metric owners, which may or may not be exposed as gauges.
    values: DashMap<MetricName, Gauge>,
}

impl MetricsRegistry {
    /// Create a new instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the shared backing value under the given name, creating it if needed.
    pub fn shared_value(&self, class_name: &str, key: &str, name: &str) -> Gauge {
        self.values.entry(MetricName::new(class_name, key, name)).or_default().value().clone()
    }

    /// Expose the given value as a gauge under the given name.
    ///
    /// Registration is first-wins: if a gauge is already registered under the name, the
    /// existing gauge is kept and returned.
    pub fn register_gauge(&self, class_name: &str, key: &str, name: &str, gauge: Gauge) -> Gauge {
        self.gauges
            .entry(MetricName::new(class_name, key, name))
            .or_insert(gauge)
            .value()
            .clone()
    }

    /// Read the gauge registered under the given name.
    pub fn gauge(&self, class_name: &str, key: &str, name: &str) -> Option<i64> {
        self.gauges.get(&MetricName::new(class_name, key, name)).map(|gauge| gauge.get())
    }

    /// Get the counter under the given name, creating it if needed.
    pub fn counter(&self, class_name: &str, key: &str, name: &str) -> Counter {
        self.counters.entry(MetricName::new(class_name, key, name)).or_default().value().clone()
    }

    /// Get the histogram under the given name, creating it if needed.
    pub fn histogram(&self, class_name: &str, key: &str, name: &str) -> Histogram {
        self.histograms.entry(MetricName::new(class_name, key, name)).or_default().value().clone()
    }

    /// Read the histogram registered under the given name.
    pub fn histogram_snapshot(&self, class_name: &str, key: &str, name: &str) -> Option<HistogramSnapshot> {
        self.histograms.get(&MetricName::new(class_name, key, name)).map(|hist| hist.snapshot())
    }

    /// Remove any metric exposed under the given name.
    pub fn unregister(&self, class_name: &str, key: &str, name: &str) {
        let name = MetricName::new(class_name, key, name);
        self.gauges.remove(&name);
        self.counters.remove(&name);
        self.histograms.remove(&name);
    }

    /// The names of all exposed metrics, sorted.
    pub fn names(&self) -> Vec<MetricName> {
        let mut names: Vec<_> = self
            .gauges
            .iter()
            .map(|entry| entry.key().clone())
            .chain(self.counters.iter().map(|entry| entry.key().clone()))
            .chain(self.histograms.iter().map(|entry| entry.key().clone()))
            .collect();
        names.sort();
        names
    }
}

/// The gauges tracked for every connector task, in registration order.
const TASK_GAUGES: [&str; 5] = [
    NUM_CONFIG_PAUSED_PARTITIONS,
    NUM_AUTO_PAUSED_PARTITIONS_ON_ERROR,
    NUM_AUTO_PAUSED_PARTITIONS_ON_INFLIGHT_MESSAGES,
    NUM_AUTO_PAUSED_PARTITIONS_WAITING_FOR_DEST_TOPIC,
    NUM_TOPICS,
];

/// Common metrics of a source connector task.
///
/// Each gauge exists per task under `(class_name, key)` and summed over all tasks of the class
/// under `(class_name, AGGREGATE)`. Updates set the task's value and apply the same delta to the
/// aggregate.
pub struct ConnectorTaskMetrics {
    registry: Arc<MetricsRegistry>,
    class_name: String,
    key: String,
    /// The last value set for each gauge of `TASK_GAUGES`.
    last: [i64; 5],
    poll_duration_ms: Option<Histogram>,
    time_spent_between_polls_ms: Option<Histogram>,
    per_event_processing_time_nanos: Option<Histogram>,
}

impl ConnectorTaskMetrics {
    /// Create a new instance, registering all gauges of the task.
    ///
    /// Histograms are only registered when `enable_additional_metrics` is set.
    pub fn new(registry: Arc<MetricsRegistry>, class_name: &str, key: &str, enable_additional_metrics: bool) -> Self {
        for name in TASK_GAUGES {
            let value = registry.shared_value(class_name, key, name);
            // The awaiting-destination value is exposed under the aggregate key.
            let expose_key = if name == NUM_AUTO_PAUSED_PARTITIONS_WAITING_FOR_DEST_TOPIC { AGGREGATE } else { key };
            registry.register_gauge(class_name, expose_key, name, value);
        }
        let histogram = |name: &str| enable_additional_metrics.then(|| registry.histogram(class_name, key, name));
        let (poll_duration_ms, time_spent_between_polls_ms, per_event_processing_time_nanos) = (
            histogram(POLL_DURATION_MS),
            histogram(TIME_SPENT_BETWEEN_POLLS_MS),
            histogram(PER_EVENT_PROCESSING_TIME_NANOS),
        );
        for name in TASK_GAUGES {
            let aggregate = registry.shared_value(class_name, AGGREGATE, name);
            registry.register_gauge(class_name, AGGREGATE, name, aggregate);
        }
        Self {
            registry,
            class_name: class_name.to_string(),
            key: key.to_string(),
            last: [0; 5],
            poll_duration_ms,
            time_spent_between_polls_ms,
            per_event_processing_time_nanos,
        }
    }

    pub fn update_num_config_paused_partitions(&mut self, val: i64) {
        self.update(0, val);
    }

    pub fn update_num_auto_paused_partitions_on_error(&mut self, val: i64) {
        self.update(1, val);
    }

    pub fn update_num_auto_paused_partitions_on_in_flight_messages(&mut self, val: i64) {
        self.update(2, val);
    }

    pub fn update_num_auto_paused_partitions_awaiting_dest_topic(&mut self, val: i64) {
        self.update(3, val);
    }

    pub fn update_num_topics(&mut self, val: i64) {
        self.update(4, val);
    }

    pub fn update_poll_duration_ms(&self, val: u64) {
        if let Some(hist) = &self.poll_duration_ms {
            hist.update(val);
        }
    }

    pub fn update_time_spent_between_polls_ms(&self, val: u64) {
        if let Some(hist) = &self.time_spent_between_polls_ms {
            hist.update(val);
        }
    }

    pub fn update_per_event_processing_time_nanos(&self, val: u64) {
        if let Some(hist) = &self.per_event_processing_time_nanos {
            hist.update(val);
        }
    }

    /// Remove this task's contribution from all aggregates and unregister its metrics.
    ///
    /// Called when the task is shut down.
    pub fn deregister(&mut self) {
        for idx in 0..TASK_GAUGES.len() {
            self.update(idx, 0);
        }
        for name in TASK_GAUGES {
            self.registry.unregister(&self.class_name, &self.key, name);
        }
        if self.poll_duration_ms.is_some() {
            for name in [POLL_DURATION_MS, TIME_SPENT_BETWEEN_POLLS_MS, PER_EVENT_PROCESSING_TIME_NANOS] {
                self.registry.unregister(&self.class_name, &self.key, name);
            }
        }
    }

    fn update(&mut self, idx: usize, val: i64) {
        let name = TASK_GAUGES[idx];
        let delta = val - self.last[idx];
        self.registry.shared_value(&self.class_name, &self.key, name).add(delta);
        self.registry.shared_value(&self.class_name, AGGREGATE, name).add(delta);
        self.last[idx] = val;
    }
}
