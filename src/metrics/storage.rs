use chrono::{NaiveDate, Utc};
use sqlx::{Row, SqlitePool};

use super::types::DailyWorkflowStats;
use crate::error::Result;

/// `workflow_analytics`: one row per day and workflow type.
#[derive(Debug, Clone)]
pub struct MetricsStore {
    pool: SqlitePool,
}

impl MetricsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Write the rows in one transaction. An existing row for the same day and
    /// type is overwritten with the newer totals.
    pub async fn upsert_daily(&self, rows: &[DailyWorkflowStats]) -> Result<usize> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO workflow_analytics
                    (date, workflow_type, total_workflows, successful_workflows,
                     failed_workflows, cancelled_workflows, avg_execution_time_ms, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT (date, workflow_type) DO UPDATE SET
                    total_workflows = excluded.total_workflows,
                    successful_workflows = excluded.successful_workflows,
                    failed_workflows = excluded.failed_workflows,
                    cancelled_workflows = excluded.cancelled_workflows,
                    avg_execution_time_ms = excluded.avg_execution_time_ms,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(row.date)
            .bind(&row.workflow_type)
            .bind(row.total_workflows)
            .bind(row.successful_workflows)
            .bind(row.failed_workflows)
            .bind(row.cancelled_workflows)
            .bind(row.avg_execution_time_ms)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(rows.len())
    }

    pub async fn daily(&self, date: NaiveDate) -> Result<Vec<DailyWorkflowStats>> {
        let rows = sqlx::query(
            r#"
            SELECT date, workflow_type, total_workflows, successful_workflows,
                   failed_workflows, cancelled_workflows, avg_execution_time_ms
            FROM workflow_analytics
            WHERE date = ?1
            ORDER BY workflow_type
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(DailyWorkflowStats {
                    date: row.try_get("date")?,
                    workflow_type: row.try_get("workflow_type")?,
                    total_workflows: row.try_get("total_workflows")?,
                    successful_workflows: row.try_get("successful_workflows")?,
                    failed_workflows: row.try_get("failed_workflows")?,
                    cancelled_workflows: row.try_get("cancelled_workflows")?,
                    avg_execution_time_ms: row.try_get("avg_execution_time_ms")?,
                })
            })
            .collect()
    }
}
