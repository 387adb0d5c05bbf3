//! Event channel and progression engine configuration.

use serde::{Deserialize, Serialize};

/// Event channel backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelBackend {
    /// In-process broker; records do not survive a restart.
    #[default]
    Memory,
    /// Durable log in a SQLite file.
    Sqlite,
}

/// Event channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub backend: ChannelBackend,

    /// SQLite file for the durable log. Required by the `sqlite` backend.
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default = "default_partitions")]
    pub partitions: u32,

    #[serde(default = "default_task_topic")]
    pub task_topic: String,

    #[serde(default = "default_completion_topic")]
    pub completion_topic: String,

    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// Polling interval of the durable log when no record is ready.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            backend: ChannelBackend::default(),
            path: None,
            partitions: default_partitions(),
            task_topic: default_task_topic(),
            completion_topic: default_completion_topic(),
            consumer_group: default_consumer_group(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_partitions() -> u32 {
    8
}

fn default_task_topic() -> String {
    "task-queue".to_string()
}

fn default_completion_topic() -> String {
    "task-completions".to_string()
}

fn default_consumer_group() -> String {
    "orchestrator-group".to_string()
}

fn default_poll_interval_ms() -> u64 {
    100
}

/// Progression engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pause after releasing an event for redelivery.
    #[serde(default = "default_redelivery_backoff_ms")]
    pub redelivery_backoff_ms: u64,

    /// Skip completions already recorded in the processed ledger.
    #[serde(default = "crate::schema::default_true")]
    pub dedup_ledger: bool,

    /// Position of this process among the consumers of the group.
    #[serde(default)]
    pub member_index: u32,

    /// Number of consumers sharing the completion topic.
    #[serde(default = "default_member_count")]
    pub member_count: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            redelivery_backoff_ms: default_redelivery_backoff_ms(),
            dedup_ledger: true,
            member_index: 0,
            member_count: default_member_count(),
        }
    }
}

fn default_redelivery_backoff_ms() -> u64 {
    500
}

fn default_member_count() -> u32 {
    1
}
