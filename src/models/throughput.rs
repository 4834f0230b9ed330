use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The observed inbound rates of a single partition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionThroughputInfo {
    /// Inbound bytes rate, in KB/s.
    pub kb_rate: u64,
    /// Inbound message rate, in messages/s.
    pub msg_rate: u64,
}

impl PartitionThroughputInfo {
    /// Create a new instance.
    pub fn new(kb_rate: u64, msg_rate: u64) -> Self {
        Self { kb_rate, msg_rate }
    }
}

/// Throughput information for all partitions known to the cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterThroughputInfo {
    /// Partition name to its observed rates.
    pub partition_info_map: HashMap<String, PartitionThroughputInfo>,
}

impl ClusterThroughputInfo {
    /// Create a new instance.
    pub fn new(partition_info_map: HashMap<String, PartitionThroughputInfo>) -> Self {
        Self { partition_info_map }
    }

    /// Get the rates of the given partition, falling back to `default` for unknown partitions.
    pub fn rate_or(&self, partition: &str, default: PartitionThroughputInfo) -> PartitionThroughputInfo {
        self.partition_info_map.get(partition).copied().unwrap_or(default)
    }
}
