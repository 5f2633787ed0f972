use serde_json::json;
use tracing::{info, Instrument};

use super::CoordinationBridge;
use crate::best_effort::BestEffortOp;
use crate::error::Result;
use crate::events::EventType;
use crate::telemetry::{create_bridge_span, generate_correlation_id};

impl CoordinationBridge {
    /// Move a workflow from one agent to another.
    ///
    /// `from_agent` matches open assignments by agent id or agent type. The
    /// engine signal and the tracker comment are best-effort; the assignment
    /// swap is a single transaction and always happens. A workflow that has
    /// reached a terminal status is refused before anything is sent.
    pub async fn coordinate_handoff(
        &self,
        workflow_id: &str,
        from_agent: &str,
        to_agent: &str,
    ) -> Result<()> {
        let correlation_id = generate_correlation_id();
        let span = create_bridge_span("coordinate_handoff", Some(workflow_id), &correlation_id);

        async move {
            self.open_mapping(workflow_id).await?;

            if let Err(e) = self
                .send_handoff_signal(workflow_id, from_agent, to_agent)
                .await
            {
                self.best_effort
                    .record(BestEffortOp::HandoffSignal, workflow_id, e);
            }

            let to_agent_type = self
                .agents
                .agent_type(to_agent)
                .await?
                .unwrap_or_else(|| to_agent.to_string());

            let record = self
                .assignments
                .handoff(workflow_id, from_agent, to_agent, &to_agent_type)
                .await?;

            self.publish(
                EventType::AgentHandoff,
                workflow_id,
                json!({
                    "from_agent": from_agent,
                    "to_agent": to_agent,
                    "to_agent_type": to_agent_type,
                    "assignment_id": record.assignment_id,
                    "closed_assignments": record.closed_assignments,
                }),
            );

            self.comment_best_effort(
                BestEffortOp::HandoffComment,
                workflow_id,
                &format!("Handoff from {from_agent} to {to_agent}"),
            )
            .await;

            info!(
                workflow_id = %workflow_id,
                from_agent = %from_agent,
                to_agent = %to_agent,
                closed_assignments = record.closed_assignments,
                "Agent handoff coordinated"
            );
            Ok(())
        }
        .instrument(span)
        .await
    }
}
