// beads-workflow - coordination bridge between a durable workflow engine and
// the beads issue tracker

pub mod best_effort;
pub mod bridge;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod external;
pub mod metrics;
pub mod models;
pub mod store;
pub mod telemetry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export key types for easy access
pub use best_effort::{BestEffortFailure, BestEffortLog, BestEffortOp};
pub use bridge::{
    AgentScore, CoordinationBridge, EngineExecution, EntityLinkOutcome, HandoffPlan,
    HandoffPlanner, RebalanceSuggestion, RecoveryReport, HANDOFF_SIGNAL,
};
pub use cache::EntityMapCache;
pub use config::{config, init_config, BridgeConfig, BridgeSettings};
pub use database::DatabaseManager;
pub use error::{BridgeError, Result};
pub use events::{Event, EventBus, EventType, PublishOutcome};
pub use external::{
    BeadsCliTracker, EngineError, EngineFuture, EngineRequest, IssueTracker, TrackerError,
    WorkflowEngine,
};
pub use metrics::{MetricsCollector, MetricsSnapshot, MetricsStore, WorkflowOutcome};
pub use models::{
    Agent, AgentAssignment, Analytics, AnalyticsFilters, EngineEntityId, PerformanceMetrics,
    StartWorkflowRequest, Workflow, WorkflowMapping, WorkflowResult, WorkflowStatus,
};
pub use telemetry::{create_bridge_span, generate_correlation_id, init_telemetry};
