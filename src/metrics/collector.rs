use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::types::{
    AgentMetrics, DailyWorkflowStats, MetricsSnapshot, StepMetrics, WorkflowMetrics,
    WorkflowOutcome, WorkflowTypeMetrics,
};

/// Bounded window of duration samples, in milliseconds.
#[derive(Debug, Default)]
struct Samples(VecDeque<f64>);

impl Samples {
    fn push(&mut self, duration: Duration, capacity: usize) {
        while self.0.len() >= capacity {
            self.0.pop_front();
        }
        self.0.push_back(duration.as_nanos() as f64 / 1_000_000.0);
    }

    fn mean(&self) -> f64 {
        if self.0.is_empty() {
            return 0.0;
        }
        self.0.iter().sum::<f64>() / self.0.len() as f64
    }

    /// Nearest-rank below: index `(len - 1) * p`, truncated.
    fn percentile(&self, p: f64) -> f64 {
        if self.0.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.0.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let index = ((sorted.len() - 1) as f64 * p) as usize;
        sorted[index.min(sorted.len() - 1)]
    }
}

#[derive(Debug, Default)]
struct WorkflowTotals {
    started: u64,
    completed: u64,
    failed: u64,
    cancelled: u64,
    durations: Samples,
}

impl WorkflowTotals {
    fn ended(&self) -> u64 {
        self.completed + self.failed + self.cancelled
    }

    fn record_end(&mut self, duration: Duration, outcome: WorkflowOutcome, capacity: usize) {
        self.durations.push(duration, capacity);
        match outcome {
            WorkflowOutcome::Completed => self.completed += 1,
            WorkflowOutcome::Failed => self.failed += 1,
            WorkflowOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

#[derive(Debug, Default)]
struct StepTotals {
    successes: u64,
    failures: u64,
    durations: Samples,
}

#[derive(Debug, Default)]
struct State {
    all: WorkflowTotals,
    by_type: HashMap<String, WorkflowTotals>,
    /// Started and not yet ended, with the agent type they started on.
    running: HashMap<String, Option<String>>,
    steps: HashMap<String, StepTotals>,
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

/// In-process workflow metrics: lifecycle counters, duration percentiles,
/// per-step outcomes and free-form gauges and counters.
///
/// The bridge feeds it from `start_workflow` and from status updates that end
/// a workflow. Counters live in memory until [`reset`]; [`daily_stats`]
/// produces the rows persisted by
/// [`MetricsStore`](super::MetricsStore).
///
/// [`reset`]: MetricsCollector::reset
/// [`daily_stats`]: MetricsCollector::daily_stats
#[derive(Debug)]
pub struct MetricsCollector {
    started_at: Instant,
    sample_capacity: usize,
    state: RwLock<State>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl MetricsCollector {
    pub fn new(sample_capacity: usize) -> Self {
        Self {
            started_at: Instant::now(),
            sample_capacity: sample_capacity.max(1),
            state: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_workflow_start(
        &self,
        workflow_id: &str,
        workflow_type: &str,
        agent_type: Option<&str>,
    ) {
        let mut state = self.write();
        state.all.started += 1;
        state
            .by_type
            .entry(workflow_type.to_string())
            .or_default()
            .started += 1;
        state
            .running
            .insert(workflow_id.to_string(), agent_type.map(str::to_string));
        drop(state);

        debug!(
            metrics.workflow_id = workflow_id,
            metrics.workflow_type = workflow_type,
            metrics.agent_type = agent_type,
            "Workflow start recorded"
        );
    }

    /// Workflows not started through this collector, such as those that
    /// were running before a restart, still count towards the totals.
    pub fn record_workflow_end(
        &self,
        workflow_id: &str,
        workflow_type: &str,
        duration: Duration,
        outcome: WorkflowOutcome,
    ) {
        let capacity = self.sample_capacity;
        let mut state = self.write();
        state.all.record_end(duration, outcome, capacity);
        state
            .by_type
            .entry(workflow_type.to_string())
            .or_default()
            .record_end(duration, outcome, capacity);
        let agent_type = state.running.remove(workflow_id).flatten();
        drop(state);

        info!(
            metrics.workflow_id = workflow_id,
            metrics.workflow_type = workflow_type,
            metrics.agent_type = agent_type.as_deref(),
            metrics.duration_ms = duration.as_millis() as u64,
            metrics.outcome = ?outcome,
            "Workflow end recorded"
        );
    }

    pub fn record_step_execution(
        &self,
        workflow_type: &str,
        step: &str,
        duration: Duration,
        success: bool,
    ) {
        let capacity = self.sample_capacity;
        let mut state = self.write();
        let totals = state
            .steps
            .entry(format!("{workflow_type}/{step}"))
            .or_default();
        totals.durations.push(duration, capacity);
        if success {
            totals.successes += 1;
        } else {
            totals.failures += 1;
        }
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        self.write().gauges.insert(name.to_string(), value);
    }

    pub fn increment_counter(&self, name: &str, delta: i64) {
        *self.write().counters.entry(name.to_string()).or_default() += delta;
    }

    /// Point-in-time view. Agent registry figures are left at zero; the
    /// bridge fills them from the coordination database.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.read();

        let workflows = WorkflowMetrics {
            total_started: state.all.started,
            total_completed: state.all.completed,
            total_failed: state.all.failed,
            total_cancelled: state.all.cancelled,
            active_count: state.all.started.saturating_sub(state.all.ended()),
            success_rate: percentage(state.all.completed, state.all.started),
            avg_duration_ms: state.all.durations.mean(),
            p50_duration_ms: state.all.durations.percentile(0.50),
            p95_duration_ms: state.all.durations.percentile(0.95),
            p99_duration_ms: state.all.durations.percentile(0.99),
            by_type: state
                .by_type
                .iter()
                .map(|(workflow_type, totals)| {
                    (
                        workflow_type.clone(),
                        WorkflowTypeMetrics {
                            started: totals.started,
                            completed: totals.completed,
                            failed: totals.failed,
                            cancelled: totals.cancelled,
                            success_rate: percentage(totals.completed, totals.started),
                            avg_duration_ms: totals.durations.mean(),
                        },
                    )
                })
                .collect(),
        };

        let mut agents = AgentMetrics::default();
        for agent_type in state.running.values().flatten() {
            agents
                .by_type
                .entry(agent_type.clone())
                .or_default()
                .running_workflows += 1;
        }

        let steps = state
            .steps
            .iter()
            .map(|(key, totals)| {
                let total = totals.successes + totals.failures;
                (
                    key.clone(),
                    StepMetrics {
                        total_executions: total,
                        successes: totals.successes,
                        failures: totals.failures,
                        success_rate: percentage(totals.successes, total),
                        avg_duration_ms: totals.durations.mean(),
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            timestamp: Utc::now(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            workflows,
            agents,
            steps,
            gauges: state.gauges.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            counters: state.counters.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        }
    }

    /// Current totals for every workflow type that has started at least once,
    /// stamped with `date`.
    pub fn daily_stats(&self, date: NaiveDate) -> Vec<DailyWorkflowStats> {
        let state = self.read();
        let mut rows: Vec<DailyWorkflowStats> = state
            .by_type
            .iter()
            .filter(|(_, totals)| totals.started > 0)
            .map(|(workflow_type, totals)| DailyWorkflowStats {
                date,
                workflow_type: workflow_type.clone(),
                total_workflows: to_i64(totals.started),
                successful_workflows: to_i64(totals.completed),
                failed_workflows: to_i64(totals.failed),
                cancelled_workflows: to_i64(totals.cancelled),
                avg_execution_time_ms: totals.durations.mean(),
            })
            .collect();
        rows.sort_by(|a, b| a.workflow_type.cmp(&b.workflow_type));
        rows
    }

    /// Drop every counter, sample, gauge and step record.
    pub fn reset(&self) {
        *self.write() = State::default();
        debug!("Metrics reset");
    }
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
