use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;
use tracing::{info, warn, Instrument};

use super::CoordinationBridge;
use crate::best_effort::BestEffortOp;
use crate::error::Result;
use crate::events::EventType;
use crate::external::IssueUpdate;
use crate::models::WorkflowStatus;
use crate::telemetry::{create_bridge_span, generate_correlation_id};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub workflows_found: usize,
    pub workflows_restored: usize,
    pub workflows_failed: Vec<String>,
    pub agents_reset: u64,
    pub errors: Vec<String>,
    pub duration_ms: u64,
    pub recovered_at: DateTime<Utc>,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.workflows_failed.is_empty() && self.errors.is_empty()
    }
}

impl CoordinationBridge {
    /// Resume every workflow left `active` or `paused` by an unclean shutdown.
    ///
    /// Only an unreachable store aborts the run. Per-workflow failures are
    /// collected in the report and the batch continues.
    pub async fn recover_from_crash(&self) -> Result<RecoveryReport> {
        let correlation_id = generate_correlation_id();
        let span = create_bridge_span("recover_from_crash", None, &correlation_id);

        async move {
            let started = Instant::now();
            self.mappings.health_check().await?;

            let open = self
                .mappings
                .list_by_status(&[WorkflowStatus::Active, WorkflowStatus::Paused])
                .await?;

            info!(workflows_found = open.len(), "Starting crash recovery");

            let mut workflows_failed = Vec::new();
            let mut errors = Vec::new();
            let mut restored = Vec::new();

            for mapping in &open {
                let workflow_id = mapping.workflow_id.as_str();

                let Some(entity_id) = self.cache.lookup(workflow_id) else {
                    workflows_failed.push(workflow_id.to_string());
                    errors.push(format!("restore {workflow_id}: no engine entity mapping"));
                    continue;
                };

                if let Err(e) = self.engine.resume(entity_id).await {
                    warn!(workflow_id = %workflow_id, entity_id = %entity_id, error = %e, "Engine resume failed");
                    workflows_failed.push(workflow_id.to_string());
                    errors.push(format!("restore {workflow_id}: {e}"));
                    continue;
                }

                self.publish(
                    EventType::WorkflowRecovered,
                    workflow_id,
                    json!({ "source": "crash_recovery", "entity_id": entity_id }),
                );
                restored.push(mapping);
            }

            let agents_reset = match self.assignments.reset_started().await {
                Ok(count) => count,
                Err(e) => {
                    errors.push(format!("agent reset: {e}"));
                    0
                }
            };

            let in_progress = IssueUpdate::status(WorkflowStatus::Active.issue_state());
            for mapping in &restored {
                if let Err(e) = self
                    .tracker
                    .update_issue(&mapping.issue_id, &in_progress)
                    .await
                {
                    errors.push(format!("beads sync {}: {e}", mapping.issue_id));
                    self.best_effort.record(
                        BestEffortOp::RecoveryIssueSync,
                        &mapping.workflow_id,
                        e,
                    );
                }
            }

            let report = RecoveryReport {
                workflows_found: open.len(),
                workflows_restored: restored.len(),
                workflows_failed,
                agents_reset,
                errors,
                duration_ms: started.elapsed().as_millis() as u64,
                recovered_at: Utc::now(),
            };

            info!(
                workflows_found = report.workflows_found,
                workflows_restored = report.workflows_restored,
                workflows_failed = report.workflows_failed.len(),
                agents_reset = report.agents_reset,
                duration_ms = report.duration_ms,
                "Crash recovery finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }
}
