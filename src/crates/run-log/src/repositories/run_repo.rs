//! Sqlite-backed `RunRepository`, the home of the CAS status primitive
//! (§4.4, §4.3 FSM) that makes `created → running` idempotent and prevents a
//! terminal status from ever being overwritten by a stale `running` update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use ports::{PortError, Result as PortResult, Run, RunRepository, RunStatus};

use crate::connection::DatabasePool;

#[derive(Debug, Clone, FromRow)]
struct RunRow {
    id: String,
    workflow_id: String,
    project_id: Option<String>,
    status: String,
    started_at: String,
    finished_at: Option<String>,
    summary: Option<String>,
}

fn status_tag(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Created => "created",
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
        RunStatus::Cancelled => "cancelled",
    }
}

fn parse_status(tag: &str) -> RunStatus {
    match tag {
        "running" => RunStatus::Running,
        "completed" => RunStatus::Completed,
        "failed" => RunStatus::Failed,
        "cancelled" => RunStatus::Cancelled,
        _ => RunStatus::Created,
    }
}

impl RunRow {
    fn into_run(self) -> Result<Run, sqlx::Error> {
        Ok(Run {
            id: Uuid::parse_str(&self.id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            workflow_id: Uuid::parse_str(&self.workflow_id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            project_id: self.project_id.map(|p| Uuid::parse_str(&p)).transpose().map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            status: parse_status(&self.status),
            started_at: DateTime::parse_from_rfc3339(&self.started_at)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
                .with_timezone(&Utc),
            finished_at: self
                .finished_at
                .map(|f| DateTime::parse_from_rfc3339(&f).map(|d| d.with_timezone(&Utc)))
                .transpose()
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            summary: self.summary,
        })
    }
}

/// Concrete `RunRepository` over a sqlite pool.
pub struct SqliteRunRepository {
    pool: DatabasePool,
}

impl SqliteRunRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunRepository for SqliteRunRepository {
    async fn create(&self, run: Run) -> PortResult<Run> {
        sqlx::query(
            "INSERT INTO runs (id, workflow_id, project_id, status, started_at, finished_at, summary)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(run.id.to_string())
        .bind(run.workflow_id.to_string())
        .bind(run.project_id.map(|p| p.to_string()))
        .bind(status_tag(run.status))
        .bind(run.started_at.to_rfc3339())
        .bind(run.finished_at.map(|f| f.to_rfc3339()))
        .bind(&run.summary)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::StorageUnavailable(e.to_string()))?;

        tracing::info!(run_id = %run.id, workflow_id = %run.workflow_id, "run created");
        Ok(run)
    }

    async fn find_by_id(&self, id: Uuid) -> PortResult<Run> {
        let row: Option<RunRow> = sqlx::query_as("SELECT * FROM runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PortError::StorageUnavailable(e.to_string()))?;

        row.ok_or_else(|| PortError::UnknownRun(id.to_string()))?
            .into_run()
            .map_err(|e| PortError::StorageUnavailable(e.to_string()))
    }

    /// CAS transition (§4.4): the `UPDATE ... WHERE status = ?` guard makes
    /// the swap atomic at the database level — two concurrent callers race
    /// the same `UPDATE`, and sqlite's row-level serialization ensures
    /// exactly one `rows_affected() == 1` (§8 scenario 5).
    async fn update_status_if_current(&self, id: Uuid, expected: RunStatus, new: RunStatus) -> PortResult<bool> {
        let finished_at = new.is_terminal().then(|| Utc::now().to_rfc3339());

        let result = sqlx::query(
            "UPDATE runs SET status = ?, finished_at = COALESCE(?, finished_at)
             WHERE id = ? AND status = ?",
        )
        .bind(status_tag(new))
        .bind(&finished_at)
        .bind(id.to_string())
        .bind(status_tag(expected))
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::StorageUnavailable(e.to_string()))?;

        let swapped = result.rows_affected() == 1;
        if swapped {
            tracing::info!(run_id = %id, from = status_tag(expected), to = status_tag(new), "run status transitioned");
        } else {
            tracing::debug!(run_id = %id, expected = status_tag(expected), to = status_tag(new), "CAS transition rejected, stale expectation");
        }
        Ok(swapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DatabaseConnection;

    async fn pool() -> DatabasePool {
        let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
        let _ = tracing_subscriber::fmt().with_env_filter(rust_log).try_init();
        DatabaseConnection::connect("sqlite::memory:").await.unwrap().pool().clone()
    }

    #[tokio::test]
    async fn cas_transition_succeeds_once() {
        let repo = SqliteRunRepository::new(pool().await);
        let run = Run::new(Uuid::new_v4(), None);
        let id = run.id;
        repo.create(run).await.unwrap();

        assert!(repo.update_status_if_current(id, RunStatus::Created, RunStatus::Running).await.unwrap());
        assert!(!repo.update_status_if_current(id, RunStatus::Created, RunStatus::Running).await.unwrap());
    }

    #[tokio::test]
    async fn terminal_status_is_never_overwritten_by_stale_running_update() {
        let repo = SqliteRunRepository::new(pool().await);
        let run = Run::new(Uuid::new_v4(), None);
        let id = run.id;
        repo.create(run).await.unwrap();

        assert!(repo.update_status_if_current(id, RunStatus::Created, RunStatus::Running).await.unwrap());
        assert!(repo.update_status_if_current(id, RunStatus::Running, RunStatus::Completed).await.unwrap());

        // A stale worker still believes the run is "running".
        let stale = repo.update_status_if_current(id, RunStatus::Running, RunStatus::Running).await.unwrap();
        assert!(!stale);

        let found = repo.find_by_id(id).await.unwrap();
        assert_eq!(found.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn concurrent_cas_callers_exactly_one_wins() {
        let pool = pool().await;
        let run = Run::new(Uuid::new_v4(), None);
        let id = run.id;
        SqliteRunRepository::new(pool.clone()).create(run).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                SqliteRunRepository::new(pool)
                    .update_status_if_current(id, RunStatus::Created, RunStatus::Running)
                    .await
                    .unwrap()
            }));
        }
        let mut wins = 0;
        for h in handles {
            if h.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }
}
