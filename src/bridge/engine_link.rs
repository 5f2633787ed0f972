use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

use super::CoordinationBridge;
use crate::best_effort::{BestEffortLog, BestEffortOp};
use crate::cache::EntityMapCache;
use crate::error::{BridgeError, Result};
use crate::events::{Event, EventBus, EventType};
use crate::external::{EngineFuture, EngineRequest, EngineWorkflowInfo};
use crate::models::EngineEntityId;
use crate::store::MappingStore;
use crate::telemetry::{create_bridge_span, generate_correlation_id};

/// Engine signal name delivered on agent handoff.
pub const HANDOFF_SIGNAL: &str = "agent_handoff";

/// How the background entity-link job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityLinkOutcome {
    /// The id was persisted and cached.
    Linked(EngineEntityId),
    /// The engine resolved the execution without an entity.
    NoEntity,
    /// No id within the configured wait. The mapping stays unlinked.
    Pending,
    Cancelled,
    Failed(String),
}

/// A running engine execution plus the job linking it to its workflow.
///
/// Dropping this value detaches the link job; it keeps running to completion.
pub struct EngineExecution {
    future: Arc<dyn EngineFuture>,
    link: JoinHandle<EntityLinkOutcome>,
    cancel: CancellationToken,
}

impl EngineExecution {
    pub fn future(&self) -> &Arc<dyn EngineFuture> {
        &self.future
    }

    /// Stop waiting for the entity id.
    pub fn cancel_link(&self) {
        self.cancel.cancel();
    }

    pub fn is_link_finished(&self) -> bool {
        self.link.is_finished()
    }

    pub async fn link_outcome(self) -> EntityLinkOutcome {
        match self.link.await {
            Ok(outcome) => outcome,
            Err(e) => EntityLinkOutcome::Failed(e.to_string()),
        }
    }
}

struct EntityLinkJob {
    workflow_id: String,
    future: Arc<dyn EngineFuture>,
    mappings: MappingStore,
    cache: Arc<EntityMapCache>,
    events: Arc<EventBus>,
    best_effort: Arc<BestEffortLog>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl EntityLinkJob {
    async fn run(self) -> EntityLinkOutcome {
        let waited = tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!(workflow_id = %self.workflow_id, "Entity link cancelled");
                return EntityLinkOutcome::Cancelled;
            }
            waited = tokio::time::timeout(self.timeout, self.future.wait_for_ids()) => waited,
        };

        match waited {
            Err(_) => {
                self.best_effort.record(
                    BestEffortOp::EntityLink,
                    &self.workflow_id,
                    format!(
                        "engine assigned no entity id within {}s",
                        self.timeout.as_secs_f64()
                    ),
                );
                EntityLinkOutcome::Pending
            }
            Ok(Err(e)) => {
                self.best_effort
                    .record(BestEffortOp::EntityLink, &self.workflow_id, &e);
                EntityLinkOutcome::Failed(e.to_string())
            }
            Ok(Ok(())) => self.link().await,
        }
    }

    async fn link(&self) -> EntityLinkOutcome {
        let entity_id = match self.future.entity_id() {
            Some(entity_id) if self.future.has_entity() => entity_id,
            _ => {
                self.best_effort.record(
                    BestEffortOp::EntityLink,
                    &self.workflow_id,
                    "engine execution resolved without an entity",
                );
                return EntityLinkOutcome::NoEntity;
            }
        };

        let persisted = match self
            .mappings
            .set_engine_entity_id(&self.workflow_id, entity_id)
            .await
        {
            Ok(()) => self.cache.record(&self.workflow_id, entity_id),
            Err(e) => Err(e),
        };
        if let Err(e) = persisted {
            self.best_effort
                .record(BestEffortOp::EntityLink, &self.workflow_id, &e);
            return EntityLinkOutcome::Failed(e.to_string());
        }

        self.events.publish(Event::new(
            EventType::WorkflowEngineLinked,
            &self.workflow_id,
            json!({ "entity_id": entity_id }),
        ));
        info!(workflow_id = %self.workflow_id, entity_id = %entity_id, "Workflow linked to engine entity");
        EntityLinkOutcome::Linked(entity_id)
    }
}

impl CoordinationBridge {
    /// Run a registered workflow function on the engine for an existing workflow.
    ///
    /// Returns as soon as the engine accepts the execution. A background job
    /// waits (bounded by `entity_wait_timeout_seconds`) for the engine to assign
    /// an entity id, then persists and caches it.
    pub async fn execute_via_engine(
        &self,
        workflow_id: &str,
        request: EngineRequest,
    ) -> Result<EngineExecution> {
        self.mappings.get(workflow_id).await?;

        let future = self.engine.execute(request).await?;
        let cancel = CancellationToken::new();

        let job = EntityLinkJob {
            workflow_id: workflow_id.to_string(),
            future: Arc::clone(&future),
            mappings: self.mappings.clone(),
            cache: Arc::clone(&self.cache),
            events: Arc::clone(&self.events),
            best_effort: Arc::clone(&self.best_effort),
            timeout: self.settings.entity_wait_timeout(),
            cancel: cancel.clone(),
        };

        let correlation_id = generate_correlation_id();
        let span = create_bridge_span("link_engine_entity", Some(workflow_id), &correlation_id);
        let link = tokio::spawn(job.run().instrument(span));

        Ok(EngineExecution {
            future,
            link,
            cancel,
        })
    }

    /// Deliver an `agent_handoff` signal to the workflow's engine entity.
    pub async fn send_handoff_signal(
        &self,
        workflow_id: &str,
        from_agent: &str,
        to_agent: &str,
    ) -> Result<()> {
        let entity_id =
            self.cache
                .lookup(workflow_id)
                .ok_or_else(|| BridgeError::EntityMappingMissing {
                    workflow_id: workflow_id.to_string(),
                })?;

        self.engine
            .publish_signal(
                entity_id,
                HANDOFF_SIGNAL,
                json!({
                    "from_agent": from_agent,
                    "to_agent": to_agent,
                    "timestamp": Utc::now(),
                }),
            )
            .await?;

        debug!(workflow_id = %workflow_id, entity_id = %entity_id, "Handoff signal delivered");
        Ok(())
    }

    /// Engine-side view of a linked workflow.
    pub async fn engine_workflow_info(&self, workflow_id: &str) -> Result<EngineWorkflowInfo> {
        let entity_id =
            self.cache
                .lookup(workflow_id)
                .ok_or_else(|| BridgeError::EntityMappingMissing {
                    workflow_id: workflow_id.to_string(),
                })?;

        Ok(self.engine.get_workflow(entity_id).await?)
    }
}
