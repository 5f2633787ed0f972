use serde_json::json;
use tracing::{debug, info};

use super::CoordinationBridge;
use crate::error::{BridgeError, Result};
use crate::events::EventType;
use crate::models::{Agent, AgentStatus};

impl CoordinationBridge {
    /// Register an agent, or refresh an existing registration.
    pub async fn register_agent(&self, agent: &Agent) -> Result<()> {
        self.agents.upsert(agent).await?;
        info!(agent_id = %agent.id, agent_type = %agent.agent_type, "Agent registered");
        Ok(())
    }

    pub async fn unregister_agent(&self, agent_id: &str) -> Result<()> {
        if !self.agents.deactivate(agent_id).await? {
            return Err(agent_not_found(agent_id));
        }
        info!(agent_id = %agent_id, "Agent unregistered");
        Ok(())
    }

    /// Agent-reported status. Only `active` agents are handoff candidates.
    pub async fn report_agent_status(&self, agent_id: &str, status: AgentStatus) -> Result<()> {
        if !self.agents.set_status(agent_id, status).await? {
            return Err(agent_not_found(agent_id));
        }
        debug!(agent_id = %agent_id, status = %status, "Agent status reported");
        Ok(())
    }

    pub async fn get_agent_status(&self, agent_id: &str) -> Result<Agent> {
        self.agents
            .get(agent_id)
            .await?
            .ok_or_else(|| agent_not_found(agent_id))
    }

    /// Open an assignment of the workflow to a registered agent.
    ///
    /// Completed, failed and cancelled workflows refuse new assignments.
    pub async fn assign_workflow(&self, workflow_id: &str, agent_id: &str) -> Result<()> {
        let agent_type = self
            .agents
            .agent_type(agent_id)
            .await?
            .ok_or_else(|| agent_not_found(agent_id))?;
        self.open_mapping(workflow_id).await?;

        let assignment_id = self
            .assignments
            .open(workflow_id, &agent_type, agent_id, None)
            .await?;

        self.publish(
            EventType::AgentAssigned,
            workflow_id,
            json!({
                "agent_id": agent_id,
                "agent_type": agent_type,
                "assignment_id": assignment_id,
            }),
        );
        info!(workflow_id = %workflow_id, agent_id = %agent_id, "Workflow assigned");
        Ok(())
    }
}

fn agent_not_found(agent_id: &str) -> BridgeError {
    BridgeError::AgentNotFound {
        agent_id: agent_id.to_string(),
    }
}
