//! Sqlite-backed `WorkflowRepository` (§4.6, §6 `workflows` table), grounded
//! in `orchestrator::db::repositories::workflow_repo` — same `query_as`/
//! `RETURNING *` idiom, but column shape follows §6's persisted layout
//! (`document_json` carries only `{nodes, edges}`; everything else is a
//! queryable column).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use graph_model::{Edge, Node, Workflow, WorkflowStatus};
use ports::{PortError, Result as PortResult, WorkflowRepository};

use crate::connection::DatabasePool;

#[derive(Debug, Clone, FromRow)]
struct WorkflowRow {
    id: String,
    project_id: Option<String>,
    name: String,
    status: String,
    document_json: String,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl WorkflowRow {
    fn into_workflow(self) -> Result<Workflow, crate::error::EventLogError> {
        let doc: Document = serde_json::from_str(&self.document_json)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let status = match self.status.as_str() {
            "draft" => WorkflowStatus::Draft,
            "active" => WorkflowStatus::Active,
            _ => WorkflowStatus::Archived,
        };
        Ok(Workflow {
            id: Uuid::parse_str(&self.id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            name: self.name,
            project_id: self
                .project_id
                .map(|p| Uuid::parse_str(&p))
                .transpose()
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            nodes: doc.nodes,
            edges: doc.edges,
            status,
            created_at: DateTime::parse_from_rfc3339(&self.created_at)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
                .with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(&self.updated_at)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
                .with_timezone(&Utc),
        })
    }
}

fn status_tag(status: WorkflowStatus) -> &'static str {
    match status {
        WorkflowStatus::Draft => "draft",
        WorkflowStatus::Active => "active",
        WorkflowStatus::Archived => "archived",
    }
}

/// Concrete `WorkflowRepository` over a sqlite pool.
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowRepository for SqliteWorkflowRepository {
    async fn create(&self, workflow: Workflow) -> PortResult<Workflow> {
        let doc = Document { nodes: workflow.nodes.clone(), edges: workflow.edges.clone() };
        let document_json = serde_json::to_string(&doc)
            .map_err(|e| PortError::StorageUnavailable(e.to_string()))?;

        sqlx::query(
            "INSERT INTO workflows (id, project_id, name, status, document_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(workflow.id.to_string())
        .bind(workflow.project_id.map(|p| p.to_string()))
        .bind(&workflow.name)
        .bind(status_tag(workflow.status))
        .bind(&document_json)
        .bind(workflow.created_at.to_rfc3339())
        .bind(workflow.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::StorageUnavailable(e.to_string()))?;

        tracing::info!(workflow_id = %workflow.id, "workflow created");
        Ok(workflow)
    }

    async fn find_by_id(&self, id: Uuid, caller_project_id: Option<Uuid>) -> PortResult<Workflow> {
        let row: Option<WorkflowRow> = sqlx::query_as("SELECT * FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PortError::StorageUnavailable(e.to_string()))?;

        let row = row.ok_or_else(|| PortError::UnknownWorkflow(id.to_string()))?;

        // §4.6: never leak a record whose project_id doesn't match the caller's scope.
        if row.project_id.as_deref() != caller_project_id.map(|p| p.to_string()).as_deref() {
            return Err(PortError::UnknownWorkflow(id.to_string()));
        }

        row.into_workflow().map_err(|e| e.into())
    }

    async fn update(&self, workflow: Workflow) -> PortResult<Workflow> {
        let doc = Document { nodes: workflow.nodes.clone(), edges: workflow.edges.clone() };
        let document_json = serde_json::to_string(&doc)
            .map_err(|e| PortError::StorageUnavailable(e.to_string()))?;
        let updated_at = Utc::now();

        let affected = sqlx::query(
            "UPDATE workflows SET name = ?, status = ?, document_json = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&workflow.name)
        .bind(status_tag(workflow.status))
        .bind(&document_json)
        .bind(updated_at.to_rfc3339())
        .bind(workflow.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::StorageUnavailable(e.to_string()))?;

        if affected.rows_affected() == 0 {
            return Err(PortError::UnknownWorkflow(workflow.id.to_string()));
        }

        Ok(Workflow { updated_at, ..workflow })
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
    async fn create_and_find_round_trips() {
        let repo = SqliteWorkflowRepository::new(pool().await);
        let project = Uuid::new_v4();
        let wf = Workflow::new("demo", Some(project));
        let id = wf.id;
        repo.create(wf).await.unwrap();

        let found = repo.find_by_id(id, Some(project)).await.unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.name, "demo");
    }

    #[tokio::test]
    async fn find_rejects_mismatched_project_scope() {
        let repo = SqliteWorkflowRepository::new(pool().await);
        let wf = Workflow::new("demo", Some(Uuid::new_v4()));
        let id = wf.id;
        repo.create(wf).await.unwrap();

        let err = repo.find_by_id(id, Some(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, PortError::UnknownWorkflow(_)));
    }

    #[tokio::test]
    async fn update_persists_node_changes() {
        let repo = SqliteWorkflowRepository::new(pool().await);
        let mut wf = Workflow::new("demo", None);
        wf.nodes.push(Node::new("start", "start", serde_json::json!({})).unwrap());
        let id = wf.id;
        repo.create(wf.clone()).await.unwrap();

        wf.nodes.push(Node::new("end", "end", serde_json::json!({})).unwrap());
        repo.update(wf).await.unwrap();

        let found = repo.find_by_id(id, None).await.unwrap();
        assert_eq!(found.nodes.len(), 2);
    }
}
