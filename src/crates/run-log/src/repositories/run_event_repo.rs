//! Sqlite-backed `RunEventRepository` (§4.4 append/replay). Sequence
//! assignment is serialized per run with an in-process `tokio::sync::Mutex`
//! keyed by `run_id` (the `(run_id, sequence)` unique constraint in the
//! migration is the last-resort guard if two processes ever race the same
//! run, which the single-executor model of §5 rules out in practice).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::{FromRow, Row};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use ports::{EventChannel, PortError, Result as PortResult, RunEventRecord, RunEventRepository};

use crate::connection::DatabasePool;

#[derive(Debug, Clone, FromRow)]
struct RunEventRow {
    run_id: String,
    sequence: i64,
    timestamp: String,
    channel: String,
    kind: String,
    payload_json: String,
}

fn channel_tag(channel: EventChannel) -> &'static str {
    match channel {
        EventChannel::Planning => "planning",
        EventChannel::Execution => "execution",
    }
}

fn parse_channel(tag: &str) -> EventChannel {
    match tag {
        "execution" => EventChannel::Execution,
        _ => EventChannel::Planning,
    }
}

impl RunEventRow {
    fn into_record(self) -> Result<RunEventRecord, sqlx::Error> {
        Ok(RunEventRecord {
            run_id: Uuid::parse_str(&self.run_id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            sequence: self.sequence,
            timestamp: DateTime::parse_from_rfc3339(&self.timestamp)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
                .with_timezone(&Utc),
            channel: parse_channel(&self.channel),
            kind: self.kind,
            payload: serde_json::from_str(&self.payload_json).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        })
    }
}

/// Concrete `RunEventRepository` over a sqlite pool.
pub struct SqliteRunEventRepository {
    pool: DatabasePool,
    /// One lock per run actively being written to; serializes `append` so
    /// sequence assignment and persistence happen atomically (§4.4).
    run_locks: DashMap<Uuid, Arc<AsyncMutex<()>>>,
}

impl SqliteRunEventRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool, run_locks: DashMap::new() }
    }

    fn lock_for(&self, run_id: Uuid) -> Arc<AsyncMutex<()>> {
        self.run_locks.entry(run_id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }
}

#[async_trait]
impl RunEventRepository for SqliteRunEventRepository {
    async fn append(&self, run_id: Uuid, channel: EventChannel, kind: &str, payload: serde_json::Value) -> PortResult<RunEventRecord> {
        let lock = self.lock_for(run_id);
        let _guard = lock.lock().await;

        let next_sequence: i64 = sqlx::query(
            "SELECT COALESCE(MAX(sequence), 0) + 1 AS next FROM run_events WHERE run_id = ?",
        )
        .bind(run_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PortError::StorageUnavailable(e.to_string()))?
        .try_get("next")
        .map_err(|e| PortError::StorageUnavailable(e.to_string()))?;

        let timestamp = Utc::now();
        let payload_json = serde_json::to_string(&payload).map_err(|e| PortError::StorageUnavailable(e.to_string()))?;

        sqlx::query(
            "INSERT INTO run_events (run_id, sequence, timestamp, channel, kind, payload_json)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(run_id.to_string())
        .bind(next_sequence)
        .bind(timestamp.to_rfc3339())
        .bind(channel_tag(channel))
        .bind(kind)
        .bind(&payload_json)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::StorageUnavailable(e.to_string()))?;

        tracing::debug!(run_id = %run_id, sequence = next_sequence, kind, "run event appended");

        Ok(RunEventRecord { run_id, sequence: next_sequence, timestamp, channel, kind: kind.to_string(), payload })
    }

    async fn list_after(&self, run_id: Uuid, sequence: i64) -> PortResult<Vec<RunEventRecord>> {
        let rows: Vec<RunEventRow> = sqlx::query_as(
            "SELECT * FROM run_events WHERE run_id = ? AND sequence > ? ORDER BY sequence ASC",
        )
        .bind(run_id.to_string())
        .bind(sequence)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::StorageUnavailable(e.to_string()))?;

        rows.into_iter()
            .map(|r| r.into_record().map_err(|e| PortError::StorageUnavailable(e.to_string())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DatabaseConnection;

    async fn pool() -> DatabasePool {
        DatabaseConnection::connect("sqlite::memory:").await.unwrap().pool().clone()
    }

    #[tokio::test]
    async fn sequence_numbers_increase_without_gaps() {
        let repo = SqliteRunEventRepository::new(pool().await);
        let run_id = Uuid::new_v4();
        for i in 0..5 {
            let record = repo
                .append(run_id, EventChannel::Execution, "node-start", serde_json::json!({ "i": i }))
                .await
                .unwrap();
            assert_eq!(record.sequence, i + 1);
        }
    }

    #[tokio::test]
    async fn list_after_returns_only_newer_events_in_order() {
        let repo = SqliteRunEventRepository::new(pool().await);
        let run_id = Uuid::new_v4();
        for i in 0..10 {
            repo.append(run_id, EventChannel::Execution, "node-progress", serde_json::json!({ "i": i })).await.unwrap();
        }
        let after = repo.list_after(run_id, 5).await.unwrap();
        assert_eq!(after.len(), 5);
        assert_eq!(after.first().unwrap().sequence, 6);
        assert_eq!(after.last().unwrap().sequence, 10);
    }

    #[tokio::test]
    async fn concurrent_appends_to_same_run_never_collide() {
        let pool = pool().await;
        let repo = Arc::new(SqliteRunEventRepository::new(pool));
        let run_id = Uuid::new_v4();

        let mut handles = Vec::new();
        for i in 0..20 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.append(run_id, EventChannel::Execution, "node-progress", serde_json::json!({ "i": i })).await.unwrap()
            }));
        }
        let mut sequences: Vec<i64> = Vec::new();
        for h in handles {
            sequences.push(h.await.unwrap().sequence);
        }
        sequences.sort_unstable();
        let expected: Vec<i64> = (1..=20).collect();
        assert_eq!(sequences, expected);
    }
}
