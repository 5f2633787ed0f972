use chrono::Utc;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::CoordinationBridge;
use crate::best_effort::BestEffortOp;
use crate::error::Result;
use crate::events::EventType;
use crate::models::{Analytics, AnalyticsFilters, PerformanceMetrics, WorkflowResult};

impl CoordinationBridge {
    /// Append a result and note it on the workflow's issue.
    pub async fn store_results(&self, workflow_id: &str, result: WorkflowResult) -> Result<()> {
        let result = WorkflowResult {
            workflow_id: workflow_id.to_string(),
            ..result
        };
        self.results.append(&result).await?;

        self.comment_best_effort(
            BestEffortOp::ResultsComment,
            workflow_id,
            &format!(
                "Results stored: {} (confidence: {:.2})",
                result.result_type, result.confidence_score
            ),
        )
        .await;

        self.publish(
            EventType::ResultStored,
            workflow_id,
            json!({
                "agent_type": result.agent_type,
                "result_type": result.result_type,
                "confidence_score": result.confidence_score,
                "quality_score": result.quality_score,
            }),
        );
        debug!(workflow_id = %workflow_id, result_type = %result.result_type, "Result stored");
        Ok(())
    }

    /// Results for a workflow, newest first.
    pub async fn get_results(&self, workflow_id: &str) -> Result<Vec<WorkflowResult>> {
        self.results.list(workflow_id).await
    }

    pub async fn get_workflow_analytics(&self, filters: &AnalyticsFilters) -> Result<Analytics> {
        self.results.analytics(filters).await
    }

    /// Result aggregates over the trailing `period`.
    pub async fn get_performance_metrics(&self, period: Duration) -> Result<PerformanceMetrics> {
        let window = chrono::Duration::from_std(period).unwrap_or(chrono::Duration::MAX);
        let since = Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

        let aggregate = self.results.performance_since(since).await?;

        Ok(PerformanceMetrics {
            period_seconds: i64::try_from(period.as_secs()).unwrap_or(i64::MAX),
            result_count: aggregate.count,
            avg_execution_time_ms: aggregate.avg_execution_time_ms,
            avg_confidence_score: aggregate.avg_confidence_score,
            avg_quality_score: aggregate.avg_quality_score,
        })
    }
}
