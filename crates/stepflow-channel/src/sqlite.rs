//! Durable event log on SQLite.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;
use tracing::{debug, trace};

use stepflow_protocols::{ChannelError, Delivery, EventPublisher, EventSubscriber};

use crate::cursor::Cursors;
use crate::partition::{partition_for, PartitionAssignment};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS event_log (
    topic TEXT NOT NULL,
    partition_id INTEGER NOT NULL,
    seq INTEGER NOT NULL,
    event_key TEXT NOT NULL,
    payload BLOB NOT NULL,
    published_at TEXT NOT NULL,
    PRIMARY KEY (topic, partition_id, seq)
);

CREATE TABLE IF NOT EXISTS consumer_offsets (
    consumer_group TEXT NOT NULL,
    topic TEXT NOT NULL,
    partition_id INTEGER NOT NULL,
    committed INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (consumer_group, topic, partition_id)
);
"#;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Partitioned event log persisted in a SQLite file.
///
/// Records and committed offsets survive restarts, so anything a group had
/// not committed is delivered again when it resubscribes.
pub struct SqliteEventLog {
    conn: Connection,
    partitions: u32,
    poll_interval: Duration,
}

impl SqliteEventLog {
    /// Open (or create) a log file.
    pub async fn open(path: impl AsRef<Path>, partitions: u32) -> Result<Self, ChannelError> {
        let path = path.as_ref().to_path_buf();
        debug!("Opening event log at {}", path.display());
        let conn = Connection::open(path)
            .await
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;
        Self::init(conn, partitions).await
    }

    /// Create a log that lives only as long as this handle.
    pub async fn in_memory(partitions: u32) -> Result<Self, ChannelError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;
        Self::init(conn, partitions).await
    }

    async fn init(conn: Connection, partitions: u32) -> Result<Self, ChannelError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            conn,
            partitions: partitions.max(1),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// How long an idle subscriber waits before polling again.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    /// Subscribe to `topic` as a member of `group`, starting at the group's
    /// committed offsets.
    pub async fn subscribe(
        &self,
        topic: impl Into<String>,
        group: impl Into<String>,
        assignment: PartitionAssignment,
    ) -> Result<SqliteSubscriber, ChannelError> {
        let topic = topic.into();
        let group = group.into();

        let (g, t) = (group.clone(), topic.clone());
        let committed: HashMap<u32, u64> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT partition_id, committed FROM consumer_offsets
                     WHERE consumer_group = ?1 AND topic = ?2",
                )?;
                let rows = stmt
                    .query_map(params![g, t], |row| {
                        Ok((row.get::<_, u32>(0)?, row.get::<_, i64>(1)? as u64))
                    })?
                    .collect::<Result<HashMap<_, _>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(|e| ChannelError::ReceiveFailed(e.to_string()))?;

        let cursors = Cursors::new(
            topic,
            assignment.partitions(self.partitions),
            |p| committed.get(&p).copied().unwrap_or(0),
        );
        Ok(SqliteSubscriber {
            conn: self.conn.clone(),
            group,
            cursors,
            poll_interval: self.poll_interval,
        })
    }

    /// Committed offset of `group` on one partition of `topic`.
    pub async fn committed(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
    ) -> Result<u64, ChannelError> {
        let (g, t) = (group.to_string(), topic.to_string());
        self.conn
            .call(move |conn| {
                let committed: Option<i64> = conn
                    .query_row(
                        "SELECT committed FROM consumer_offsets
                         WHERE consumer_group = ?1 AND topic = ?2 AND partition_id = ?3",
                        params![g, t, partition],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(committed.unwrap_or(0) as u64)
            })
            .await
            .map_err(|e| ChannelError::ReceiveFailed(e.to_string()))
    }

    /// Every record published to `topic`, partition by partition.
    pub async fn records(&self, topic: &str) -> Result<Vec<Delivery>, ChannelError> {
        let t = topic.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT partition_id, seq, event_key, payload FROM event_log
                     WHERE topic = ?1 ORDER BY partition_id, seq",
                )?;
                let records = stmt
                    .query_map([&t], |row| {
                        Ok(Delivery {
                            topic: t.clone(),
                            partition: row.get(0)?,
                            offset: row.get::<_, i64>(1)? as u64,
                            key: row.get(2)?,
                            payload: row.get(3)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await
            .map_err(|e| ChannelError::ReceiveFailed(e.to_string()))
    }
}

#[async_trait]
impl EventPublisher for SqliteEventLog {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), ChannelError> {
        let partition = partition_for(key, self.partitions);
        let (t, k) = (topic.to_string(), key.to_string());
        let now = Utc::now().to_rfc3339();

        let seq = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let seq: i64 = tx.query_row(
                    "SELECT COALESCE(MAX(seq) + 1, 0) FROM event_log
                     WHERE topic = ?1 AND partition_id = ?2",
                    params![t, partition],
                    |row| row.get(0),
                )?;
                tx.execute(
                    "INSERT INTO event_log (topic, partition_id, seq, event_key, payload, published_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![t, partition, seq, k, payload, now],
                )?;
                tx.commit()?;
                Ok(seq)
            })
            .await
            .map_err(|e| ChannelError::PublishFailed(e.to_string()))?;

        trace!(topic, key, partition, offset = seq, "Appended record");
        Ok(())
    }
}

/// Subscriber handle on a [`SqliteEventLog`] topic.
pub struct SqliteSubscriber {
    conn: Connection,
    group: String,
    cursors: Cursors,
    poll_interval: Duration,
}

#[async_trait]
impl EventSubscriber for SqliteSubscriber {
    async fn recv(&mut self) -> Result<Delivery, ChannelError> {
        loop {
            let ready = self.cursors.ready();
            let topic = self.cursors.topic().to_string();

            let found = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare_cached(
                        "SELECT seq, event_key, payload FROM event_log
                         WHERE topic = ?1 AND partition_id = ?2 AND seq >= ?3
                         ORDER BY seq LIMIT 1",
                    )?;
                    for (partition, offset) in ready {
                        let row = stmt
                            .query_row(params![topic, partition, offset as i64], |row| {
                                Ok((
                                    row.get::<_, i64>(0)?,
                                    row.get::<_, String>(1)?,
                                    row.get::<_, Vec<u8>>(2)?,
                                ))
                            })
                            .optional()?;
                        if let Some((seq, key, payload)) = row {
                            return Ok(Some(Delivery {
                                topic,
                                partition,
                                offset: seq as u64,
                                key,
                                payload,
                            }));
                        }
                    }
                    Ok(None)
                })
                .await
                .map_err(|e| ChannelError::ReceiveFailed(e.to_string()))?;

            if let Some(delivery) = found {
                self.cursors.take(delivery.partition, delivery.offset);
                return Ok(delivery);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn commit(&mut self, delivery: &Delivery) -> Result<(), ChannelError> {
        self.cursors.settle(delivery, true)?;

        let group = self.group.clone();
        let topic = delivery.topic.clone();
        let partition = delivery.partition;
        let committed = (delivery.offset + 1) as i64;
        let now = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO consumer_offsets (consumer_group, topic, partition_id, committed, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(consumer_group, topic, partition_id)
                     DO UPDATE SET committed = MAX(committed, excluded.committed),
                                   updated_at = excluded.updated_at",
                    params![group, topic, partition, committed, now],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| ChannelError::CommitFailed(e.to_string()))
    }

    async fn rewind(&mut self, delivery: &Delivery) -> Result<(), ChannelError> {
        self.cursors.settle(delivery, false)
    }
}

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;
