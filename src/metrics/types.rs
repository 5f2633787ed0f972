use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::WorkflowStatus;

/// How a workflow left the live statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowOutcome {
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowOutcome {
    /// `None` for the live statuses.
    pub fn from_status(status: WorkflowStatus) -> Option<Self> {
        match status {
            WorkflowStatus::Completed => Some(WorkflowOutcome::Completed),
            WorkflowStatus::Failed => Some(WorkflowOutcome::Failed),
            WorkflowStatus::Cancelled => Some(WorkflowOutcome::Cancelled),
            WorkflowStatus::Active | WorkflowStatus::Paused => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub workflows: WorkflowMetrics,
    pub agents: AgentMetrics,
    /// Keyed by `workflow_type/step`.
    pub steps: BTreeMap<String, StepMetrics>,
    pub gauges: BTreeMap<String, f64>,
    pub counters: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    pub total_started: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_cancelled: u64,
    /// Started and not yet ended.
    pub active_count: u64,
    /// Completed as a percentage of started.
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub p50_duration_ms: f64,
    pub p95_duration_ms: f64,
    pub p99_duration_ms: f64,
    pub by_type: BTreeMap<String, WorkflowTypeMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTypeMetrics {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub total_registered: i64,
    pub total_active: i64,
    pub by_type: BTreeMap<String, AgentTypeMetrics>,
}

/// Registry figures come from the coordination database; `running_workflows`
/// is the collector's own count of started, unfinished workflows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentTypeMetrics {
    pub registered: i64,
    pub active: i64,
    pub total_assignments: i64,
    pub avg_workload_percent: f64,
    pub running_workflows: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepMetrics {
    pub total_executions: u64,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
}

/// One `workflow_analytics` row: the collector's totals for a type on a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyWorkflowStats {
    pub date: NaiveDate,
    pub workflow_type: String,
    pub total_workflows: i64,
    pub successful_workflows: i64,
    pub failed_workflows: i64,
    pub cancelled_workflows: i64,
    pub avg_execution_time_ms: f64,
}
