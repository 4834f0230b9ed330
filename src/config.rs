//! Runtime configuration.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};

/// Runtime configuration data.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The logging config, which uses Rust's `env_logger` directives.
    pub rust_log: String,

    /// The number of tasks created per datastream group, unless overridden by the group's
    /// datastreams. When unset, groups get one task per live instance.
    #[serde(default, deserialize_with = "Config::parse_cap")]
    pub default_max_tasks: Option<usize>,
    /// The maximum number of tasks of a single group per instance, unless overridden by the
    /// group's datastreams. When unset, instances are not capped.
    #[serde(default, deserialize_with = "Config::parse_cap")]
    pub default_max_tasks_per_instance: Option<usize>,

    /// The time to wait for the in-flight records of a removed task to drain before its
    /// checkpoint tracker is force-cleared.
    #[serde(default = "Config::default_shutdown_drain_timeout_ms")]
    pub shutdown_drain_timeout_ms: u64,
    /// The interval at which the in-flight count of a draining task is observed.
    #[serde(default = "Config::default_drain_poll_interval_ms")]
    pub drain_poll_interval_ms: u64,
    /// The interval at which task low-watermarks are committed to the checkpoint store.
    #[serde(default = "Config::default_checkpoint_commit_interval_ms")]
    pub checkpoint_commit_interval_ms: u64,

    /// Whether partitions are placed onto tasks by the cluster based on throughput.
    #[serde(default)]
    pub partition_assignment_enabled: bool,
    /// The KB/s rate assumed for partitions with no observed throughput.
    #[serde(default = "Config::default_rate")]
    pub default_kb_rate: u64,
    /// The messages/s rate assumed for partitions with no observed throughput.
    #[serde(default = "Config::default_rate")]
    pub default_msg_rate: u64,
}

impl Config {
    /// Create a new config instance.
    ///
    /// Currently this just parses the runtime environment and builds the application config
    /// from that.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Result<Self> {
        envy::from_env().context("error building config from env")
    }

    /// Create a config instance for use in tests.
    #[cfg(test)]
    pub fn new_test() -> Result<std::sync::Arc<Self>> {
        Ok(std::sync::Arc::new(Self {
            rust_log: "".into(),
            default_max_tasks: None,
            default_max_tasks_per_instance: None,
            shutdown_drain_timeout_ms: 500,
            drain_poll_interval_ms: 10,
            checkpoint_commit_interval_ms: 50,
            partition_assignment_enabled: false,
            default_kb_rate: Self::default_rate(),
            default_msg_rate: Self::default_rate(),
        }))
    }

    /// The drain timeout as a duration.
    pub fn shutdown_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_drain_timeout_ms)
    }

    /// The drain poll interval as a duration.
    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }

    /// The checkpoint commit interval as a duration.
    pub fn checkpoint_commit_interval(&self) -> Duration {
        Duration::from_millis(self.checkpoint_commit_interval_ms)
    }

    /// Parse an optional task cap, where zero means unset.
    fn parse_cap<'de, D: Deserializer<'de>>(val: D) -> Result<Option<usize>, D::Error> {
        let cap: Option<usize> = Deserialize::deserialize(val)?;
        Ok(cap.filter(|cap| *cap > 0))
    }

    fn default_shutdown_drain_timeout_ms() -> u64 {
        30_000
    }

    fn default_drain_poll_interval_ms() -> u64 {
        100
    }

    fn default_checkpoint_commit_interval_ms() -> u64 {
        60_000
    }

    fn default_rate() -> u64 {
        5
    }
}
