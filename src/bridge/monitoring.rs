use chrono::Utc;
use tracing::{info, warn};

use super::CoordinationBridge;
use crate::error::Result;
use crate::metrics::{MetricsCollector, MetricsSnapshot, WorkflowOutcome};
use crate::models::WorkflowStatus;

impl CoordinationBridge {
    /// The in-process collector, for step timings, gauges and counters
    /// reported by callers.
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Collector snapshot with the agent registry figures filled in.
    pub async fn metrics_snapshot(&self) -> Result<MetricsSnapshot> {
        let mut snapshot = self.metrics.snapshot();

        for stats in self.agents.type_stats().await? {
            snapshot.agents.total_registered += stats.registered;
            snapshot.agents.total_active += stats.active;

            let entry = snapshot.agents.by_type.entry(stats.agent_type).or_default();
            entry.registered = stats.registered;
            entry.active = stats.active;
            entry.total_assignments = stats.total_assignments;
            entry.avg_workload_percent = stats.avg_workload_percent;
        }

        Ok(snapshot)
    }

    /// Persist today's per-type totals. Returns the number of rows written.
    pub async fn flush_metrics(&self) -> Result<usize> {
        let rows = self.metrics.daily_stats(Utc::now().date_naive());
        let written = self.metrics_store.upsert_daily(&rows).await?;
        info!(rows = written, "Metrics flushed");
        Ok(written)
    }

    /// Feed a workflow's end into the collector. Runs after the status write
    /// has committed, so a read failure here is logged and skipped.
    pub(super) async fn record_workflow_end(&self, workflow_id: &str, status: WorkflowStatus) {
        let Some(outcome) = WorkflowOutcome::from_status(status) else {
            return;
        };

        match self.mappings.get(workflow_id).await {
            Ok(mapping) => {
                let elapsed = (Utc::now() - mapping.created_at)
                    .to_std()
                    .unwrap_or_default();
                self.metrics
                    .record_workflow_end(workflow_id, &mapping.workflow_type, elapsed, outcome);
            }
            Err(e) => {
                warn!(workflow_id = %workflow_id, error = %e, "Could not record workflow end");
            }
        }
    }
}
