use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::error::Result;
use crate::models::{Analytics, AnalyticsFilters, WorkflowResult};

/// Aggregates over results created inside a time window.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultAggregate {
    pub count: i64,
    pub avg_execution_time_ms: Option<f64>,
    pub avg_confidence_score: Option<f64>,
    pub avg_quality_score: Option<f64>,
}

/// Append-only `workflow_results`.
#[derive(Debug, Clone)]
pub struct ResultStore {
    pool: SqlitePool,
}

impl ResultStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, result: &WorkflowResult) -> Result<i64> {
        let data = serde_json::to_string(&result.data)?;
        let artifacts = serde_json::to_string(&result.artifacts)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO workflow_results
                (workflow_id, agent_type, result_type, result_data, confidence_score,
                 quality_score, execution_time_ms, artifacts, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&result.workflow_id)
        .bind(&result.agent_type)
        .bind(&result.result_type)
        .bind(data)
        .bind(result.confidence_score)
        .bind(result.quality_score)
        .bind(result.execution_time_ms)
        .bind(artifacts)
        .bind(result.created_at)
        .execute(&self.pool)
        .await?;

        Ok(inserted.last_insert_rowid())
    }

    /// Results for a workflow, newest first.
    pub async fn list(&self, workflow_id: &str) -> Result<Vec<WorkflowResult>> {
        let rows = sqlx::query(
            r#"
            SELECT workflow_id, agent_type, result_type, result_data, confidence_score,
                   quality_score, execution_time_ms, artifacts, created_at
            FROM workflow_results
            WHERE workflow_id = ?1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(result_from_row).collect()
    }

    pub async fn count(&self, workflow_id: &str) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM workflow_results WHERE workflow_id = ?1")
            .bind(workflow_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    pub async fn performance_since(&self, since: DateTime<Utc>) -> Result<ResultAggregate> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS result_count,
                   AVG(execution_time_ms) AS avg_execution_time_ms,
                   AVG(confidence_score) AS avg_confidence_score,
                   AVG(quality_score) AS avg_quality_score
            FROM workflow_results
            WHERE created_at >= ?1
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(ResultAggregate {
            count: row.try_get("result_count")?,
            avg_execution_time_ms: row.try_get("avg_execution_time_ms")?,
            avg_confidence_score: row.try_get("avg_confidence_score")?,
            avg_quality_score: row.try_get("avg_quality_score")?,
        })
    }

    /// Workflow counts per status plus the mean result execution time,
    /// restricted by the workflow-level filters.
    pub async fn analytics(&self, filters: &AnalyticsFilters) -> Result<Analytics> {
        let mut counts = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN m.status = 'active' THEN 1 ELSE 0 END), 0) AS active,
                COALESCE(SUM(CASE WHEN m.status = 'completed' THEN 1 ELSE 0 END), 0) AS completed,
                COALESCE(SUM(CASE WHEN m.status = 'failed' THEN 1 ELSE 0 END), 0) AS failed,
                COALESCE(SUM(CASE WHEN m.status = 'cancelled' THEN 1 ELSE 0 END), 0) AS cancelled
            FROM workflow_mappings m
            WHERE 1 = 1
            "#,
        );
        push_filters(&mut counts, filters);
        let row = counts.build().fetch_one(&self.pool).await?;

        let total: i64 = row.try_get("total")?;
        let completed: i64 = row.try_get("completed")?;

        let mut durations = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT AVG(r.execution_time_ms)
            FROM workflow_results r
            JOIN workflow_mappings m ON m.workflow_id = r.workflow_id
            WHERE 1 = 1
            "#,
        );
        push_filters(&mut durations, filters);
        let avg_execution_time_ms: Option<f64> = durations
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let success_rate = if total > 0 {
            completed as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Ok(Analytics {
            total_workflows: total,
            active_workflows: row.try_get("active")?,
            completed_workflows: completed,
            failed_workflows: row.try_get("failed")?,
            cancelled_workflows: row.try_get("cancelled")?,
            success_rate,
            avg_execution_time_ms,
        })
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filters: &AnalyticsFilters) {
    if let Some(workflow_type) = &filters.workflow_type {
        query.push(" AND m.workflow_type = ").push_bind(workflow_type.clone());
    }
    if let Some(status) = filters.status {
        query.push(" AND m.status = ").push_bind(status);
    }
    if let Some(start) = filters.start_date {
        query.push(" AND m.created_at >= ").push_bind(start);
    }
    if let Some(end) = filters.end_date {
        query.push(" AND m.created_at <= ").push_bind(end);
    }
}

fn result_from_row(row: &SqliteRow) -> Result<WorkflowResult> {
    let data: String = row.try_get("result_data")?;
    let artifacts: Option<String> = row.try_get("artifacts")?;

    Ok(WorkflowResult {
        workflow_id: row.try_get("workflow_id")?,
        agent_type: row.try_get("agent_type")?,
        result_type: row.try_get("result_type")?,
        data: serde_json::from_str(&data)?,
        confidence_score: row.try_get("confidence_score")?,
        quality_score: row.try_get("quality_score")?,
        execution_time_ms: row.try_get("execution_time_ms")?,
        artifacts: match artifacts {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        },
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;
    use chrono::Duration;
    use serde_json::json;

    fn result(workflow_id: &str, result_type: &str, created_at: DateTime<Utc>) -> WorkflowResult {
        WorkflowResult {
            workflow_id: workflow_id.to_string(),
            agent_type: "research".to_string(),
            result_type: result_type.to_string(),
            data: json!({"summary": result_type}),
            confidence_score: 0.8,
            quality_score: 0.6,
            execution_time_ms: 1000,
            artifacts: vec!["report.md".to_string()],
            created_at,
        }
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let store = ResultStore::new(db.pool().clone());
        let now = Utc::now();

        store.append(&result("wf-1", "draft", now - Duration::seconds(10))).await.unwrap();
        store.append(&result("wf-1", "final", now)).await.unwrap();
        store.append(&result("wf-2", "other", now)).await.unwrap();

        let results = store.list("wf-1").await.unwrap();
        let types: Vec<_> = results.iter().map(|r| r.result_type.as_str()).collect();
        assert_eq!(types, vec!["final", "draft"]);
        assert_eq!(results[0].artifacts, vec!["report.md".to_string()]);
        assert_eq!(results[0].data, json!({"summary": "final"}));
    }

    #[tokio::test]
    async fn test_aggregate_window() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let store = ResultStore::new(db.pool().clone());
        let now = Utc::now();

        store.append(&result("wf-1", "old", now - Duration::hours(2))).await.unwrap();
        let mut recent = result("wf-1", "new", now);
        recent.execution_time_ms = 3000;
        store.append(&recent).await.unwrap();

        let aggregate = store.performance_since(now - Duration::hours(1)).await.unwrap();
        assert_eq!(aggregate.count, 1);
        assert_eq!(aggregate.avg_execution_time_ms, Some(3000.0));

        let empty = store.performance_since(now + Duration::hours(1)).await.unwrap();
        assert_eq!(empty.count, 0);
        assert_eq!(empty.avg_confidence_score, None);
    }
}
