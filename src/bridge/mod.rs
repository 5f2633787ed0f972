//! Coordination bridge between the workflow engine and the beads tracker
//!
//! The bridge owns the coordination database and keeps it consistent with two
//! systems it does not control. Writes to the database are authoritative and
//! fatal on failure; the mirrored tracker updates, comments and engine
//! signals are best-effort and land in the [`BestEffortLog`] when they fail.

mod agents;
mod engine_link;
mod handoff;
mod lifecycle;
mod monitoring;
mod planner;
mod recovery;
mod results;

pub use engine_link::{EngineExecution, EntityLinkOutcome, HANDOFF_SIGNAL};
pub use planner::{AgentScore, HandoffPlan, HandoffPlanner, RebalanceSuggestion};
pub use recovery::RecoveryReport;

use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::best_effort::{BestEffortFailure, BestEffortLog, BestEffortOp};
use crate::cache::EntityMapCache;
use crate::config::BridgeSettings;
use crate::error::{BridgeError, Result};
use crate::events::{Event, EventBus, EventType, PublishOutcome};
use crate::external::{IssueTracker, WorkflowEngine};
use crate::metrics::{MetricsCollector, MetricsStore};
use crate::models::{EngineEntityId, WorkflowMapping};
use crate::store::{AgentStore, AssignmentStore, MappingStore, ResultStore};

pub struct CoordinationBridge {
    mappings: MappingStore,
    assignments: AssignmentStore,
    results: ResultStore,
    agents: AgentStore,
    metrics_store: MetricsStore,
    metrics: Arc<MetricsCollector>,
    cache: Arc<EntityMapCache>,
    events: Arc<EventBus>,
    best_effort: Arc<BestEffortLog>,
    tracker: Arc<dyn IssueTracker>,
    engine: Arc<dyn WorkflowEngine>,
    settings: BridgeSettings,
}

impl CoordinationBridge {
    /// Build a bridge over a migrated pool and rehydrate the entity cache from it.
    pub async fn new(
        pool: SqlitePool,
        tracker: Arc<dyn IssueTracker>,
        engine: Arc<dyn WorkflowEngine>,
        settings: BridgeSettings,
    ) -> Result<Self> {
        let mappings = MappingStore::new(pool.clone());
        let cache = Arc::new(EntityMapCache::new());
        cache.rehydrate(&mappings).await?;

        let bridge = Self {
            mappings,
            assignments: AssignmentStore::new(pool.clone()),
            results: ResultStore::new(pool.clone()),
            agents: AgentStore::new(pool.clone()),
            metrics_store: MetricsStore::new(pool),
            metrics: Arc::new(MetricsCollector::new(settings.metrics_sample_capacity)),
            cache,
            events: Arc::new(EventBus::new(
                settings.event_buffer_capacity,
                settings.event_history_limit,
            )),
            best_effort: Arc::new(BestEffortLog::new(settings.best_effort_log_capacity)),
            tracker,
            engine,
            settings,
        };

        info!(
            cached_entities = bridge.cache.len(),
            event_buffer_capacity = bridge.settings.event_buffer_capacity,
            "Coordination bridge ready"
        );
        Ok(bridge)
    }

    /// Receive lifecycle events of one type.
    pub fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<Event> {
        self.events.subscribe(event_type)
    }

    pub fn subscribe_all(&self) -> mpsc::Receiver<Event> {
        self.events.subscribe_all()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Best-effort failures retained so far, oldest first.
    pub fn best_effort_failures(&self) -> Vec<BestEffortFailure> {
        self.best_effort.snapshot()
    }

    /// Cached engine entity id for a workflow, if the engine has assigned one.
    pub fn engine_entity_id(&self, workflow_id: &str) -> Option<EngineEntityId> {
        self.cache.lookup(workflow_id)
    }

    pub fn planner(&self) -> HandoffPlanner {
        HandoffPlanner::new(self.agents.clone(), self.results.clone())
    }

    pub async fn health_check(&self) -> Result<()> {
        self.mappings.health_check().await
    }

    /// Mapping of a workflow that can still take agents.
    async fn open_mapping(&self, workflow_id: &str) -> Result<WorkflowMapping> {
        let mapping = self.mappings.get(workflow_id).await?;
        if mapping.status.is_terminal() {
            return Err(BridgeError::WorkflowClosed {
                workflow_id: workflow_id.to_string(),
                status: mapping.status,
            });
        }
        Ok(mapping)
    }

    fn publish(&self, event_type: EventType, workflow_id: &str, data: Value) -> PublishOutcome {
        self.events.publish(Event::new(event_type, workflow_id, data))
    }

    /// Add a comment to the workflow's issue, recording any failure.
    async fn comment_best_effort(&self, operation: BestEffortOp, workflow_id: &str, text: &str) {
        let issue_id = match self.mappings.issue_id(workflow_id).await {
            Ok(Some(issue_id)) => issue_id,
            Ok(None) => return,
            Err(e) => {
                self.best_effort.record(operation, workflow_id, e);
                return;
            }
        };

        if let Err(e) = self.tracker.add_comment(&issue_id, text).await {
            self.best_effort.record(operation, workflow_id, e);
        }
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

pub(crate) fn generate_workflow_id(workflow_type: &str) -> String {
    format!("wf-{workflow_type}-{}", short_id())
}

pub(crate) fn generate_agent_id(agent_type: &str) -> String {
    format!("{agent_type}-agent-{}", short_id())
}
