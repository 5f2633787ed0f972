//! Domain records shared by the stores and the coordination bridge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {kind} status: {value}")]
pub struct ParseStatusError {
    pub kind: &'static str,
    pub value: String,
}

/// Lifecycle status of a tracked workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Active,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub const ALL: [WorkflowStatus; 5] = [
        WorkflowStatus::Active,
        WorkflowStatus::Paused,
        WorkflowStatus::Completed,
        WorkflowStatus::Failed,
        WorkflowStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Active => "active",
            WorkflowStatus::Paused => "paused",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses accept no further transitions to a different status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }

    /// Workflows left in these states after a crash may still be running engine-side.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, WorkflowStatus::Active | WorkflowStatus::Paused)
    }

    /// Issue-tracker state mirrored for this workflow status.
    pub fn issue_state(&self) -> &'static str {
        match self {
            WorkflowStatus::Active => "in_progress",
            WorkflowStatus::Completed => "closed",
            WorkflowStatus::Failed => "blocked",
            WorkflowStatus::Paused => "blocked",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkflowStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError {
                kind: "workflow",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Assigned,
    Started,
    Completed,
    Cancelled,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::Started => "started",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, AssignmentStatus::Assigned | AssignmentStatus::Started)
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Inactive,
    Busy,
    Error,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Inactive => "inactive",
            AgentStatus::Busy => "busy",
            AgentStatus::Error => "error",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier the workflow engine assigns to a running workflow instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct EngineEntityId(pub i64);

impl fmt::Display for EngineEntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Durable link between the external workflow id, the engine entity and the beads issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMapping {
    pub workflow_id: String,
    pub issue_id: String,
    pub engine_entity_id: Option<EngineEntityId>,
    pub workflow_type: String,
    pub status: WorkflowStatus,
    pub priority: i32,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowMapping {
    pub fn new(
        workflow_id: impl Into<String>,
        issue_id: impl Into<String>,
        workflow_type: impl Into<String>,
        priority: i32,
        metadata: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: workflow_id.into(),
            issue_id: issue_id.into(),
            engine_entity_id: None,
            workflow_type: workflow_type.into(),
            status: WorkflowStatus::Active,
            priority,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAssignment {
    pub id: i64,
    pub workflow_id: String,
    pub agent_type: String,
    pub agent_id: String,
    pub status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub handoff_from: Option<String>,
    pub handoff_to: Option<String>,
}

/// One result produced by an agent for a workflow. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub agent_type: String,
    pub result_type: String,
    pub data: Value,
    pub confidence_score: f64,
    pub quality_score: f64,
    pub execution_time_ms: i64,
    #[serde(default)]
    pub artifacts: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub tasks_completed_today: i64,
    pub avg_task_duration_ms: i64,
    pub success_rate: f64,
    pub error_rate: f64,
}

/// A registered agent able to pick up workflow assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub agent_type: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub capabilities: Map<String, Value>,
    #[serde(default)]
    pub configuration: Map<String, Value>,
    pub max_workload: i64,
    pub current_workload: i64,
    pub last_heartbeat: DateTime<Utc>,
    pub performance_stats: Option<PerformanceStats>,
}

impl Agent {
    pub fn new(id: impl Into<String>, agent_type: impl Into<String>, max_workload: i64) -> Self {
        Self {
            id: id.into(),
            agent_type: agent_type.into(),
            status: AgentStatus::Active,
            capabilities: Map::new(),
            configuration: Map::new(),
            max_workload,
            current_workload: 0,
            last_heartbeat: Utc::now(),
            performance_stats: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartWorkflowRequest {
    pub issue_title: String,
    pub workflow_type: String,
    pub agent_type: Option<String>,
    pub priority: i32,
    #[serde(default)]
    pub variables: Map<String, Value>,
    pub template_id: Option<String>,
}

/// Caller-facing view of a workflow: the mapping joined with its current assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub issue_id: String,
    pub workflow_type: String,
    pub status: WorkflowStatus,
    pub priority: i32,
    pub agent_id: Option<String>,
    pub engine_entity_id: Option<EngineEntityId>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsFilters {
    pub workflow_type: Option<String>,
    pub status: Option<WorkflowStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    pub total_workflows: i64,
    pub active_workflows: i64,
    pub completed_workflows: i64,
    pub failed_workflows: i64,
    pub cancelled_workflows: i64,
    /// Completed over total, as a percentage.
    pub success_rate: f64,
    pub avg_execution_time_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub period_seconds: i64,
    pub result_count: i64,
    pub avg_execution_time_ms: Option<f64>,
    pub avg_confidence_score: Option<f64>,
    pub avg_quality_score: Option<f64>,
}
