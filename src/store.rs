//! Checkpoint storage.
//!
//! Checkpoints are only kept in memory by the coordination core. Durable progress lives in an
//! external store, to which the controller commits task low-watermarks in their string form.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

use crate::models::TaskId;

/// An external store of committed task checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync + 'static {
    /// Commit the given checkpoints, replacing any previously committed for the same tasks.
    async fn commit(&self, checkpoints: HashMap<TaskId, String>) -> Result<()>;

    /// Get the last committed checkpoint of each of the given tasks.
    ///
    /// Tasks with no committed checkpoint are absent from the output.
    async fn get_committed(&self, tasks: &[TaskId]) -> Result<HashMap<TaskId, String>>;
}

/// A checkpoint store which keeps committed checkpoints in memory.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    committed: DashMap<TaskId, String>,
}

impl InMemoryCheckpointStore {
    /// Create a new instance.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn commit(&self, checkpoints: HashMap<TaskId, String>) -> Result<()> {
        tracing::trace!(tasks = checkpoints.len(), "committing checkpoints");
        for (task, checkpoint) in checkpoints {
            self.committed.insert(task, checkpoint);
        }
        Ok(())
    }

    async fn get_committed(&self, tasks: &[TaskId]) -> Result<HashMap<TaskId, String>> {
        Ok(tasks
            .iter()
            .filter_map(|task| self.committed.get(task).map(|checkpoint| (task.clone(), checkpoint.value().clone())))
            .collect())
    }
}
