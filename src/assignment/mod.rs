//! Task assignment.
//!
//! A rebalance round turns the set of datastream groups and live instances into a new
//! `Assignment`. The `BroadcastAssigner` decides how many tasks each group gets and on which
//! instances they live, reusing existing tasks wherever it can. For groups whose partitions are
//! placed by the cluster, the `LoadBasedPartitionAssigner` then spreads the group's partitions
//! across its tasks by observed throughput. The `AssignmentCoordinator` drives both and diffs the
//! result against the current assignment.

mod broadcast;
mod coordinator;
mod load_based;

use crate::error::AssignmentDiagnostic;
use crate::models::{Assignment, ClusterThroughputInfo};

pub use broadcast::{BroadcastAssigner, BroadcastConfig};
pub use coordinator::{drain_and_clear, AssignmentCoordinator, RebalanceOutcome};
pub use load_based::LoadBasedPartitionAssigner;

/// A source of per-partition throughput information.
pub trait ThroughputOracle: Send + Sync {
    /// Get the latest observed throughput of all known partitions.
    fn get(&self) -> ClusterThroughputInfo;
}

/// The output of an assigner: the assignment along with any non-fatal findings.
#[derive(Clone, Debug, Default)]
pub struct AssignmentOutcome {
    pub assignment: Assignment,
    pub diagnostics: Vec<AssignmentDiagnostic>,
}
