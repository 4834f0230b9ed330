use std::collections::HashMap;

use anyhow::{Context, Result};
use parking_lot::Mutex;

use crate::assignment::ThroughputOracle;
use crate::error::TransportSendFailure;
use crate::models::{ClusterThroughputInfo, Datastream, DatastreamGroup, PartitionThroughputInfo};
use crate::producer::{RecordMetadata, SendCallback, Transport};

/// Build one single-datastream group per given name, using the name as task prefix.
pub fn groups(names: &[&str]) -> Vec<DatastreamGroup> {
    names.iter().map(|name| DatastreamGroup::new(*name, vec![Datastream::new(*name)])).collect()
}

/// Build a group whose only datastream carries the given metadata.
pub fn group_with_metadata(name: &str, metadata: &[(&str, &str)]) -> DatastreamGroup {
    let datastream = metadata.iter().fold(Datastream::new(name), |ds, (key, val)| ds.with_metadata(*key, *val));
    DatastreamGroup::new(name, vec![datastream])
}

/// Build a list of instance names.
pub fn instances(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// Build throughput info from `(partition, kb_rate)` pairs.
pub fn throughput(rates: &[(&str, u64)]) -> ClusterThroughputInfo {
    ClusterThroughputInfo::new(
        rates
            .iter()
            .map(|(partition, kb_rate)| (partition.to_string(), PartitionThroughputInfo::new(*kb_rate, *kb_rate)))
            .collect::<HashMap<_, _>>(),
    )
}

/// A throughput oracle which always reports the same info.
pub struct StaticThroughputOracle(pub ClusterThroughputInfo);

impl ThroughputOracle for StaticThroughputOracle {
    fn get(&self) -> ClusterThroughputInfo {
        self.0.clone()
    }
}

/// A transport which records sends and completes them only when told to.
pub struct MockTransport<R> {
    /// Pending sends, indexed by the order in which they were sent.
    sends: Mutex<Vec<Option<(R, SendCallback)>>>,
    /// The last periodic flush setting applied.
    periodic_flush: Mutex<Option<bool>>,
}

impl<R> MockTransport<R> {
    pub fn new() -> Self {
        Self {
            sends: Mutex::new(vec![]),
            periodic_flush: Mutex::new(None),
        }
    }

    /// The total number of records sent so far.
    pub fn sent_count(&self) -> usize {
        self.sends.lock().len()
    }

    /// The last periodic flush setting applied.
    pub fn periodic_flush(&self) -> Option<bool> {
        *self.periodic_flush.lock()
    }

    /// Complete the send with the given index, failing it if `failure` is given.
    pub fn complete(&self, idx: usize, failure: Option<&str>) -> Result<R> {
        let (record, callback) = self
            .sends
            .lock()
            .get_mut(idx)
            .and_then(Option::take)
            .context("send not found or already completed")?;
        let metadata = RecordMetadata {
            event_index: idx,
            ..Default::default()
        };
        callback(metadata, failure.map(|msg| TransportSendFailure(anyhow::anyhow!(msg.to_string()))));
        Ok(record)
    }
}

impl<R: Send + 'static> Transport for MockTransport<R> {
    type Record = R;

    fn send(&self, record: R, callback: SendCallback) {
        self.sends.lock().push(Some((record, callback)));
    }

    fn set_periodic_flush(&self, enabled: bool) {
        *self.periodic_flush.lock() = Some(enabled);
    }
}
