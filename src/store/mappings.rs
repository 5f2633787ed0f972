use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::models::{EngineEntityId, WorkflowMapping, WorkflowStatus};

const MAPPING_COLUMNS: &str = "workflow_id, beads_issue_id, engine_entity_id, workflow_type, \
     status, priority, metadata, created_at, updated_at";

/// Durable `workflow_mappings` table: one row per workflow, never deleted.
#[derive(Debug, Clone)]
pub struct MappingStore {
    pool: SqlitePool,
}

impl MappingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(BridgeError::StoreUnavailable)
    }

    /// Insert a new mapping and return its row id.
    pub async fn create(&self, mapping: &WorkflowMapping) -> Result<i64> {
        let metadata = serde_json::to_string(&mapping.metadata)?;

        let result = sqlx::query(
            r#"
            INSERT INTO workflow_mappings
                (workflow_id, beads_issue_id, engine_entity_id, workflow_type, status, priority, metadata, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&mapping.workflow_id)
        .bind(&mapping.issue_id)
        .bind(mapping.engine_entity_id)
        .bind(&mapping.workflow_type)
        .bind(mapping.status)
        .bind(mapping.priority)
        .bind(metadata)
        .bind(mapping.created_at)
        .bind(mapping.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                BridgeError::DuplicateWorkflow {
                    workflow_id: mapping.workflow_id.clone(),
                }
            }
            other => other.into(),
        })?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find(&self, workflow_id: &str) -> Result<Option<WorkflowMapping>> {
        let row = sqlx::query(&format!(
            "SELECT {MAPPING_COLUMNS} FROM workflow_mappings WHERE workflow_id = ?1"
        ))
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(mapping_from_row).transpose()
    }

    pub async fn get(&self, workflow_id: &str) -> Result<WorkflowMapping> {
        self.find(workflow_id)
            .await?
            .ok_or_else(|| BridgeError::not_found(workflow_id))
    }

    /// Write a new status. Returns true when this call moved the workflow out
    /// of a live status into a terminal one.
    ///
    /// A terminal row only accepts a re-write of the same status; the guards
    /// live in the UPDATEs so concurrent writers cannot race them.
    pub async fn update_status(&self, workflow_id: &str, status: WorkflowStatus) -> Result<bool> {
        let now = Utc::now();
        let moved = sqlx::query(
            r#"
            UPDATE workflow_mappings
            SET status = ?1, updated_at = ?2
            WHERE workflow_id = ?3
              AND status NOT IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(status)
        .bind(now)
        .bind(workflow_id)
        .execute(&self.pool)
        .await?;

        if moved.rows_affected() > 0 {
            return Ok(status.is_terminal());
        }

        let rewritten = sqlx::query(
            "UPDATE workflow_mappings SET updated_at = ?1 WHERE workflow_id = ?2 AND status = ?3",
        )
        .bind(now)
        .bind(workflow_id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        if rewritten.rows_affected() > 0 {
            return Ok(false);
        }

        let current: Option<WorkflowStatus> =
            sqlx::query_scalar("SELECT status FROM workflow_mappings WHERE workflow_id = ?1")
                .bind(workflow_id)
                .fetch_optional(&self.pool)
                .await?;

        match current {
            None => Err(BridgeError::not_found(workflow_id)),
            Some(from) => Err(BridgeError::InvalidTransition {
                workflow_id: workflow_id.to_string(),
                from,
                to: status,
            }),
        }
    }

    /// Record the engine entity id. Once set, only the same id is accepted.
    pub async fn set_engine_entity_id(
        &self,
        workflow_id: &str,
        entity_id: EngineEntityId,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_mappings
            SET engine_entity_id = ?1, updated_at = ?2
            WHERE workflow_id = ?3
              AND (engine_entity_id IS NULL OR engine_entity_id = ?1)
            "#,
        )
        .bind(entity_id)
        .bind(Utc::now())
        .bind(workflow_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!(workflow_id = %workflow_id, entity_id = %entity_id, "Persisted engine entity mapping");
            return Ok(());
        }

        match self.find(workflow_id).await? {
            None => Err(BridgeError::not_found(workflow_id)),
            Some(mapping) => Err(BridgeError::EntityConflict {
                workflow_id: workflow_id.to_string(),
                existing: mapping.engine_entity_id.unwrap_or(entity_id),
                requested: entity_id,
            }),
        }
    }

    pub async fn list_by_status(&self, statuses: &[WorkflowStatus]) -> Result<Vec<WorkflowMapping>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {MAPPING_COLUMNS} FROM workflow_mappings WHERE status IN ("
        ));
        let mut separated = query.separated(", ");
        for status in statuses {
            separated.push_bind(*status);
        }
        separated.push_unseparated(") ORDER BY id ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(mapping_from_row).collect()
    }

    /// Every workflow that has been linked to an engine entity.
    pub async fn list_entity_mappings(&self) -> Result<Vec<(String, EngineEntityId)>> {
        let rows = sqlx::query_as(
            r#"
            SELECT workflow_id, engine_entity_id
            FROM workflow_mappings
            WHERE engine_entity_id IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn issue_id(&self, workflow_id: &str) -> Result<Option<String>> {
        let issue_id = sqlx::query_scalar(
            "SELECT beads_issue_id FROM workflow_mappings WHERE workflow_id = ?1",
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(issue_id)
    }
}

fn mapping_from_row(row: &SqliteRow) -> Result<WorkflowMapping> {
    let metadata: String = row.try_get("metadata")?;

    Ok(WorkflowMapping {
        workflow_id: row.try_get("workflow_id")?,
        issue_id: row.try_get("beads_issue_id")?,
        engine_entity_id: row.try_get("engine_entity_id")?,
        workflow_type: row.try_get("workflow_type")?,
        status: row.try_get("status")?,
        priority: row.try_get("priority")?,
        metadata: serde_json::from_str(&metadata)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
