//! Agent selection and load rebalancing for handoffs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::store::{AgentLoad, AgentStore, ResultStore};

const AVAILABILITY_WEIGHT: f64 = 0.40;
const SUCCESS_WEIGHT: f64 = 0.35;
const SPEED_WEIGHT: f64 = 0.25;
/// Average durations at or above this score zero for speed.
const SPEED_CEILING_MS: f64 = 600_000.0;
const OVERLOADED_FACTOR: f64 = 0.8;
const UNDERLOADED_FACTOR: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentScore {
    pub agent_id: String,
    pub agent_type: String,
    pub score: f64,
    pub current_workload: i64,
    pub max_workload: i64,
    pub available_slots: i64,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub reason: String,
}

impl AgentScore {
    fn from_load(load: AgentLoad, success_rate: f64, avg_duration_ms: f64) -> Self {
        let mut score = Self {
            agent_id: load.agent_id.clone(),
            agent_type: load.agent_type.clone(),
            score: 0.0,
            current_workload: load.current_workload,
            max_workload: load.max_workload,
            available_slots: load.available_slots(),
            success_rate,
            avg_duration_ms,
            reason: String::new(),
        };
        score.score = score.composite();
        score
    }

    fn composite(&self) -> f64 {
        let availability = if self.max_workload > 0 {
            self.available_slots as f64 / self.max_workload as f64
        } else {
            0.0
        };
        let success = self.success_rate / 100.0;
        let speed = if self.avg_duration_ms > 0.0 {
            (1.0 - self.avg_duration_ms / SPEED_CEILING_MS).max(0.0)
        } else {
            1.0
        };

        availability * AVAILABILITY_WEIGHT + success * SUCCESS_WEIGHT + speed * SPEED_WEIGHT
    }

    fn explain(&self) -> String {
        format!(
            "selected {} (score={:.2}): {}/{} slots used, {:.0}% success rate, avg {:.0}ms",
            self.agent_id,
            self.score,
            self.current_workload,
            self.max_workload,
            self.success_rate,
            self.avg_duration_ms
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffPlan {
    pub workflow_id: String,
    pub from_agent_id: String,
    pub to_agent_id: String,
    pub to_agent_type: String,
    pub score: f64,
    pub reason: String,
    pub result_count: i64,
    pub planned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceSuggestion {
    pub from_agent_id: String,
    pub to_agent_id: String,
    pub agent_type: String,
    pub from_load_percent: f64,
    pub to_load_percent: f64,
    pub reason: String,
}

/// Scores registered agents on availability, success history and speed.
#[derive(Debug, Clone)]
pub struct HandoffPlanner {
    agents: AgentStore,
    results: ResultStore,
}

impl HandoffPlanner {
    pub fn new(agents: AgentStore, results: ResultStore) -> Self {
        Self { agents, results }
    }

    /// Highest scoring active agent of `agent_type` with a free slot.
    /// Ties go to the less loaded agent.
    pub async fn select_best_agent(&self, agent_type: &str) -> Result<AgentScore> {
        let candidates = self.agents.candidates(agent_type).await?;

        let mut best: Option<AgentScore> = None;
        for load in candidates {
            let success_rate = self
                .agents
                .success_rate(&load.agent_id)
                .await?
                .unwrap_or(100.0);
            let avg_duration_ms = self
                .agents
                .avg_duration_ms(&load.agent_id)
                .await?
                .unwrap_or(0.0);

            let candidate = AgentScore::from_load(load, success_rate, avg_duration_ms);
            debug!(agent_id = %candidate.agent_id, score = candidate.score, "Scored handoff candidate");

            if best.as_ref().map_or(true, |b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }

        let mut best = best.ok_or_else(|| BridgeError::NoAvailableAgent {
            agent_type: agent_type.to_string(),
        })?;
        best.reason = best.explain();
        Ok(best)
    }

    pub async fn plan_handoff(
        &self,
        workflow_id: &str,
        from_agent_id: &str,
        target_agent_type: &str,
    ) -> Result<HandoffPlan> {
        let target = self.select_best_agent(target_agent_type).await?;
        let result_count = self.results.count(workflow_id).await?;

        Ok(HandoffPlan {
            workflow_id: workflow_id.to_string(),
            from_agent_id: from_agent_id.to_string(),
            to_agent_id: target.agent_id,
            to_agent_type: target.agent_type,
            score: target.score,
            reason: target.reason,
            result_count,
            planned_at: Utc::now(),
        })
    }

    /// Pair each agent at 80 % load or more with the first same-type agent
    /// under 50 %.
    pub async fn rebalance(&self) -> Result<Vec<RebalanceSuggestion>> {
        let loads = self.agents.active_loads().await?;

        let suggestions = loads
            .iter()
            .filter(|overloaded| overloaded.load_factor() >= OVERLOADED_FACTOR)
            .filter_map(|overloaded| {
                loads
                    .iter()
                    .find(|candidate| {
                        candidate.agent_id != overloaded.agent_id
                            && candidate.agent_type == overloaded.agent_type
                            && candidate.load_factor() < UNDERLOADED_FACTOR
                    })
                    .map(|candidate| {
                        let from = overloaded.load_factor() * 100.0;
                        let to = candidate.load_factor() * 100.0;
                        RebalanceSuggestion {
                            from_agent_id: overloaded.agent_id.clone(),
                            to_agent_id: candidate.agent_id.clone(),
                            agent_type: overloaded.agent_type.clone(),
                            from_load_percent: from,
                            to_load_percent: to,
                            reason: format!(
                                "{} is at {:.0}% load, {} is at {:.0}% load",
                                overloaded.agent_id, from, candidate.agent_id, to
                            ),
                        }
                    })
            })
            .collect();

        Ok(suggestions)
    }
}
