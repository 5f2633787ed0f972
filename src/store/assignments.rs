use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::Result;
use crate::models::AgentAssignment;

const ASSIGNMENT_COLUMNS: &str = "id, workflow_id, agent_type, agent_id, status, assigned_at, \
     completed_at, handoff_from, handoff_to";

/// Rows touched by a single handoff transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffRecord {
    pub closed_assignments: u64,
    pub assignment_id: i64,
}

/// `agent_assignments`: the history of which agent held which workflow.
#[derive(Debug, Clone)]
pub struct AssignmentStore {
    pool: SqlitePool,
}

impl AssignmentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a new `assigned` row for the workflow.
    pub async fn open(
        &self,
        workflow_id: &str,
        agent_type: &str,
        agent_id: &str,
        handoff_from: Option<&str>,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO agent_assignments (workflow_id, agent_type, agent_id, status, assigned_at, handoff_from)
            VALUES (?1, ?2, ?3, 'assigned', ?4, ?5)
            "#,
        )
        .bind(workflow_id)
        .bind(agent_type)
        .bind(agent_id)
        .bind(Utc::now())
        .bind(handoff_from)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Most recently opened assignment that is still `assigned` or `started`.
    pub async fn current(&self, workflow_id: &str) -> Result<Option<AgentAssignment>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS}
            FROM agent_assignments
            WHERE workflow_id = ?1 AND status IN ('assigned', 'started')
            ORDER BY id DESC
            LIMIT 1
            "#
        ))
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(assignment_from_row).transpose()
    }

    /// Full assignment history in the order rows were opened.
    pub async fn list(&self, workflow_id: &str) -> Result<Vec<AgentAssignment>> {
        let rows = sqlx::query(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM agent_assignments WHERE workflow_id = ?1 ORDER BY id ASC"
        ))
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(assignment_from_row).collect()
    }

    /// Mark the agent's open assignment as picked up.
    pub async fn mark_started(&self, workflow_id: &str, agent_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE agent_assignments
            SET status = 'started'
            WHERE workflow_id = ?1 AND agent_id = ?2 AND status = 'assigned'
            "#,
        )
        .bind(workflow_id)
        .bind(agent_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn cancel_open(&self, workflow_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE agent_assignments
            SET status = 'cancelled', completed_at = ?1
            WHERE workflow_id = ?2 AND status IN ('assigned', 'started')
            "#,
        )
        .bind(Utc::now())
        .bind(workflow_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Close every open assignment held by `from` (matched by agent id or agent
    /// type) and open one for `to_agent_id`, in a single transaction.
    pub async fn handoff(
        &self,
        workflow_id: &str,
        from: &str,
        to_agent_id: &str,
        to_agent_type: &str,
    ) -> Result<HandoffRecord> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let closed = sqlx::query(
            r#"
            UPDATE agent_assignments
            SET status = 'completed', completed_at = ?1, handoff_to = ?2
            WHERE workflow_id = ?3
              AND status IN ('assigned', 'started')
              AND (agent_id = ?4 OR agent_type = ?4)
            "#,
        )
        .bind(now)
        .bind(to_agent_id)
        .bind(workflow_id)
        .bind(from)
        .execute(&mut *tx)
        .await?;

        let opened = sqlx::query(
            r#"
            INSERT INTO agent_assignments (workflow_id, agent_type, agent_id, status, assigned_at, handoff_from)
            VALUES (?1, ?2, ?3, 'assigned', ?4, ?5)
            "#,
        )
        .bind(workflow_id)
        .bind(to_agent_type)
        .bind(to_agent_id)
        .bind(now)
        .bind(from)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(HandoffRecord {
            closed_assignments: closed.rows_affected(),
            assignment_id: opened.last_insert_rowid(),
        })
    }

    /// Return every `started` assignment to `assigned` so agents pick it up again.
    pub async fn reset_started(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE agent_assignments SET status = 'assigned' WHERE status = 'started'",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

fn assignment_from_row(row: &SqliteRow) -> Result<AgentAssignment> {
    Ok(AgentAssignment {
        id: row.try_get("id")?,
        workflow_id: row.try_get("workflow_id")?,
        agent_type: row.try_get("agent_type")?,
        agent_id: row.try_get("agent_id")?,
        status: row.try_get("status")?,
        assigned_at: row.try_get("assigned_at")?,
        completed_at: row.try_get("completed_at")?,
        handoff_from: row.try_get("handoff_from")?,
        handoff_to: row.try_get("handoff_to")?,
    })
}
