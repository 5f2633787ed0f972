use serde_json::json;
use tracing::{info, Instrument};

use super::{generate_agent_id, generate_workflow_id, CoordinationBridge};
use crate::best_effort::BestEffortOp;
use crate::error::Result;
use crate::events::EventType;
use crate::external::{CreateIssueRequest, IssueUpdate};
use crate::models::{StartWorkflowRequest, Workflow, WorkflowMapping, WorkflowStatus};
use crate::telemetry::{create_bridge_span, generate_correlation_id};

impl CoordinationBridge {
    /// Open a tracker issue and a mapping for a new workflow.
    ///
    /// Issue creation and the mapping insert are fatal; nothing is written to
    /// the coordination database when the tracker rejects the issue. Engine
    /// execution is a separate step, see [`execute_via_engine`].
    ///
    /// [`execute_via_engine`]: CoordinationBridge::execute_via_engine
    pub async fn start_workflow(&self, request: StartWorkflowRequest) -> Result<Workflow> {
        let correlation_id = generate_correlation_id();
        let span = create_bridge_span("start_workflow", None, &correlation_id);

        async move {
            let title = if request.issue_title.trim().is_empty() {
                format!("{} workflow", request.workflow_type)
            } else {
                request.issue_title.clone()
            };

            let issue = self
                .tracker
                .create_issue(&CreateIssueRequest {
                    title,
                    description: None,
                    issue_type: request.workflow_type.clone(),
                    priority: request.priority,
                    labels: vec![request.workflow_type.clone(), "workflow".to_string()],
                })
                .await?;

            let workflow_id = generate_workflow_id(&request.workflow_type);
            let mapping = WorkflowMapping::new(
                &workflow_id,
                &issue.id,
                &request.workflow_type,
                request.priority,
                json!({
                    "variables": request.variables,
                    "template_id": request.template_id,
                }),
            );
            self.mappings.create(&mapping).await?;

            let agent_id = match &request.agent_type {
                Some(agent_type) => {
                    let agent_id = generate_agent_id(agent_type);
                    self.assignments
                        .open(&workflow_id, agent_type, &agent_id, None)
                        .await?;
                    self.publish(
                        EventType::AgentAssigned,
                        &workflow_id,
                        json!({ "agent_id": agent_id, "agent_type": agent_type }),
                    );
                    Some(agent_id)
                }
                None => None,
            };

            self.metrics.record_workflow_start(
                &workflow_id,
                &request.workflow_type,
                request.agent_type.as_deref(),
            );

            self.publish(
                EventType::WorkflowStarted,
                &workflow_id,
                json!({
                    "beads_issue_id": issue.id,
                    "workflow_type": request.workflow_type,
                    "agent_type": request.agent_type,
                    "priority": request.priority,
                }),
            );

            info!(
                workflow_id = %workflow_id,
                issue_id = %issue.id,
                workflow_type = %request.workflow_type,
                "Workflow started"
            );

            Ok(Workflow {
                id: workflow_id,
                issue_id: mapping.issue_id,
                workflow_type: mapping.workflow_type,
                status: mapping.status,
                priority: mapping.priority,
                agent_id,
                engine_entity_id: None,
                started_at: mapping.created_at,
                updated_at: mapping.updated_at,
                metadata: mapping.metadata,
            })
        }
        .instrument(span)
        .await
    }

    pub async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow> {
        let mapping = self.mappings.get(workflow_id).await?;
        let current = self.assignments.current(workflow_id).await?;

        Ok(Workflow {
            id: mapping.workflow_id,
            issue_id: mapping.issue_id,
            workflow_type: mapping.workflow_type,
            status: mapping.status,
            priority: mapping.priority,
            agent_id: current.map(|assignment| assignment.agent_id),
            engine_entity_id: mapping.engine_entity_id,
            started_at: mapping.created_at,
            updated_at: mapping.updated_at,
            metadata: mapping.metadata,
        })
    }

    /// Persist a status change, then mirror it onto the tracker issue.
    ///
    /// Terminal workflows accept only a re-write of their own status. The
    /// tracker sync never fails the call. Only the call that ends a workflow
    /// feeds the metrics collector.
    pub async fn update_workflow_status(
        &self,
        workflow_id: &str,
        status: WorkflowStatus,
    ) -> Result<()> {
        let correlation_id = generate_correlation_id();
        let span = create_bridge_span("update_workflow_status", Some(workflow_id), &correlation_id);

        async move {
            let ended = self.mappings.update_status(workflow_id, status).await?;
            if ended {
                self.record_workflow_end(workflow_id, status).await;
            }
            self.sync_issue_status(workflow_id, status).await;

            self.publish(
                EventType::WorkflowStatusChanged,
                workflow_id,
                json!({ "new_status": status }),
            );

            info!(workflow_id = %workflow_id, status = %status, "Workflow status updated");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Logical cancellation: no engine-side abort is attempted.
    pub async fn cancel_workflow(&self, workflow_id: &str, reason: &str) -> Result<()> {
        self.update_workflow_status(workflow_id, WorkflowStatus::Cancelled)
            .await?;

        let cancelled = self.assignments.cancel_open(workflow_id).await?;

        self.comment_best_effort(
            BestEffortOp::CancelComment,
            workflow_id,
            &format!("Workflow cancelled: {reason}"),
        )
        .await;

        self.publish(
            EventType::WorkflowCancelled,
            workflow_id,
            json!({ "reason": reason, "assignments_cancelled": cancelled }),
        );

        info!(
            workflow_id = %workflow_id,
            reason = %reason,
            assignments_cancelled = cancelled,
            "Workflow cancelled"
        );
        Ok(())
    }

    async fn sync_issue_status(&self, workflow_id: &str, status: WorkflowStatus) {
        let issue_id = match self.mappings.issue_id(workflow_id).await {
            Ok(Some(issue_id)) => issue_id,
            Ok(None) => return,
            Err(e) => {
                self.best_effort
                    .record(BestEffortOp::IssueStatusSync, workflow_id, e);
                return;
            }
        };

        let update = IssueUpdate::status(status.issue_state());
        if let Err(e) = self.tracker.update_issue(&issue_id, &update).await {
            self.best_effort
                .record(BestEffortOp::IssueStatusSync, workflow_id, e);
        }
    }
}
