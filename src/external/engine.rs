//! Workflow engine abstraction
//!
//! The engine runs workflow functions durably and assigns each run an
//! [`EngineEntityId`]. The bridge never schedules work itself; it only asks the
//! engine to execute, resume, signal and report on workflows.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::models::EngineEntityId;

#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("Workflow function not registered: {workflow_name}")]
    NotRegistered { workflow_name: String },
    #[error("Engine entity not found: {entity_id}")]
    EntityNotFound { entity_id: EngineEntityId },
    #[error("Signal {signal} rejected by entity {entity_id}: {message}")]
    SignalRejected {
        entity_id: EngineEntityId,
        signal: String,
        message: String,
    },
    #[error("Workflow execution failed: {message}")]
    ExecutionFailed { message: String },
    #[error("Engine is shut down")]
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Queue to run on; the engine's default queue when unset.
    pub queue: Option<String>,
    pub max_retries: Option<u32>,
}

/// Execution request naming a workflow function previously registered with the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineRequest {
    pub workflow_name: String,
    pub args: Value,
    #[serde(default)]
    pub options: EngineOptions,
}

impl EngineRequest {
    pub fn new(workflow_name: impl Into<String>, args: Value) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            args,
            options: EngineOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineWorkflowInfo {
    pub entity_id: EngineEntityId,
    pub workflow_name: String,
    pub status: String,
}

/// Handle on an execution the engine has accepted.
#[async_trait]
pub trait EngineFuture: Send + Sync {
    /// Resolves once the engine has assigned identifiers to the execution.
    async fn wait_for_ids(&self) -> Result<(), EngineError>;

    fn has_entity(&self) -> bool;

    fn entity_id(&self) -> Option<EngineEntityId>;
}

#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn execute(&self, request: EngineRequest) -> Result<Arc<dyn EngineFuture>, EngineError>;

    async fn resume(&self, entity_id: EngineEntityId) -> Result<Arc<dyn EngineFuture>, EngineError>;

    async fn publish_signal(
        &self,
        entity_id: EngineEntityId,
        signal: &str,
        payload: Value,
    ) -> Result<(), EngineError>;

    async fn get_workflow(&self, entity_id: EngineEntityId) -> Result<EngineWorkflowInfo, EngineError>;
}
