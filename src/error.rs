use thiserror::Error;

use crate::external::{EngineError, TrackerError};
use crate::models::{EngineEntityId, WorkflowStatus};

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors surfaced to callers of the coordination bridge.
///
/// Only failures that abort an operation appear here. Best-effort failures
/// (tracker sync, comments, handoff signals) are logged and recorded in the
/// [`BestEffortLog`](crate::best_effort::BestEffortLog) instead.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("workflow not found: {workflow_id}")]
    NotFound { workflow_id: String },

    #[error("agent not found: {agent_id}")]
    AgentNotFound { agent_id: String },

    #[error("no active {agent_type} agent has a free slot")]
    NoAvailableAgent { agent_type: String },

    #[error("workflow already exists: {workflow_id}")]
    DuplicateWorkflow { workflow_id: String },

    #[error("workflow {workflow_id} is {from} and cannot move to {to}")]
    InvalidTransition {
        workflow_id: String,
        from: WorkflowStatus,
        to: WorkflowStatus,
    },

    #[error("workflow {workflow_id} is {status} and takes no new assignments")]
    WorkflowClosed {
        workflow_id: String,
        status: WorkflowStatus,
    },

    #[error("no engine entity mapping for workflow {workflow_id}")]
    EntityMappingMissing { workflow_id: String },

    #[error("workflow {workflow_id} is already linked to engine entity {existing}, refusing {requested}")]
    EntityConflict {
        workflow_id: String,
        existing: EngineEntityId,
        requested: EngineEntityId,
    },

    #[error("coordination database unhealthy: {0}")]
    StoreUnavailable(#[source] sqlx::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("issue tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("workflow engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BridgeError {
    pub fn not_found(workflow_id: &str) -> Self {
        BridgeError::NotFound {
            workflow_id: workflow_id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BridgeError::NotFound { .. })
    }
}
