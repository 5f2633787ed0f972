use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::Result;
use crate::models::{Agent, AgentStatus, PerformanceStats};

/// Workload is derived from open assignments rather than stored, so it
/// cannot drift from the assignment history.
const ACTIVE_LOADS: &str = r#"
    SELECT ac.agent_id,
           ac.agent_type,
           ac.max_workload,
           (SELECT COUNT(*) FROM agent_assignments aa
            WHERE aa.agent_id = ac.agent_id AND aa.status IN ('assigned', 'started')) AS current_workload
    FROM agent_configurations ac
    WHERE ac.status = 'active'
"#;

/// Point-in-time load of one active agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentLoad {
    pub agent_id: String,
    pub agent_type: String,
    pub current_workload: i64,
    pub max_workload: i64,
}

impl AgentLoad {
    pub fn available_slots(&self) -> i64 {
        (self.max_workload - self.current_workload).max(0)
    }

    pub fn load_factor(&self) -> f64 {
        if self.max_workload > 0 {
            self.current_workload as f64 / self.max_workload as f64
        } else {
            0.0
        }
    }
}

/// Registry figures for one agent type.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentTypeStats {
    pub agent_type: String,
    pub registered: i64,
    pub active: i64,
    pub total_assignments: i64,
    /// Mean of open assignments over `max_workload`, as a percentage.
    pub avg_workload_percent: f64,
}

/// `agent_configurations`: registered agents and their limits.
#[derive(Debug, Clone)]
pub struct AgentStore {
    pool: SqlitePool,
}

impl AgentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register an agent, or refresh an existing registration and mark it active.
    pub async fn upsert(&self, agent: &Agent) -> Result<()> {
        let now = Utc::now();
        let configuration = serde_json::to_string(&agent.configuration)?;
        let capabilities = serde_json::to_string(&agent.capabilities)?;
        let performance = agent
            .performance_stats
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO agent_configurations
                (id, agent_type, agent_id, configuration, capabilities, max_workload,
                 status, last_heartbeat, performance_metrics, created_at, updated_at)
            VALUES (?1, ?2, ?1, ?3, ?4, ?5, 'active', ?6, ?7, ?6, ?6)
            ON CONFLICT (id) DO UPDATE SET
                agent_type = excluded.agent_type,
                configuration = excluded.configuration,
                capabilities = excluded.capabilities,
                max_workload = excluded.max_workload,
                status = 'active',
                last_heartbeat = excluded.last_heartbeat,
                performance_metrics = COALESCE(excluded.performance_metrics, performance_metrics),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&agent.id)
        .bind(&agent.agent_type)
        .bind(configuration)
        .bind(capabilities)
        .bind(agent.max_workload)
        .bind(now)
        .bind(performance)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mark an agent inactive. Returns false when the agent is unknown.
    pub async fn deactivate(&self, agent_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE agent_configurations SET status = 'inactive', updated_at = ?1 WHERE agent_id = ?2",
        )
        .bind(Utc::now())
        .bind(agent_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, agent_id: &str) -> Result<Option<Agent>> {
        let row = sqlx::query(
            r#"
            SELECT ac.agent_id, ac.agent_type, ac.status, ac.configuration, ac.capabilities,
                   ac.max_workload, ac.last_heartbeat, ac.performance_metrics,
                   (SELECT COUNT(*) FROM agent_assignments aa
                    WHERE aa.agent_id = ac.agent_id AND aa.status IN ('assigned', 'started')) AS current_workload
            FROM agent_configurations ac
            WHERE ac.agent_id = ?1
            "#,
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(agent_from_row).transpose()
    }

    pub async fn agent_type(&self, agent_id: &str) -> Result<Option<String>> {
        let agent_type =
            sqlx::query_scalar("SELECT agent_type FROM agent_configurations WHERE agent_id = ?1")
                .bind(agent_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(agent_type)
    }

    /// Record a status report, which also counts as a heartbeat.
    pub async fn set_status(&self, agent_id: &str, status: AgentStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE agent_configurations SET status = ?1, last_heartbeat = ?2, updated_at = ?2 WHERE agent_id = ?3",
        )
        .bind(status)
        .bind(Utc::now())
        .bind(agent_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Active agents of a type with a free slot, least loaded first.
    pub async fn candidates(&self, agent_type: &str) -> Result<Vec<AgentLoad>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT * FROM ({ACTIVE_LOADS})
            WHERE agent_type = ?1 AND current_workload < max_workload
            ORDER BY current_workload ASC, agent_id ASC
            "#
        ))
        .bind(agent_type)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(load_from_row).collect()
    }

    /// Every active agent, most loaded first.
    pub async fn active_loads(&self) -> Result<Vec<AgentLoad>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT * FROM ({ACTIVE_LOADS})
            ORDER BY CAST(current_workload AS REAL) / MAX(max_workload, 1) DESC, agent_id ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(load_from_row).collect()
    }

    /// Registry figures grouped by agent type, across every status.
    pub async fn type_stats(&self) -> Result<Vec<AgentTypeStats>> {
        let rows = sqlx::query(
            r#"
            SELECT agent_type,
                   COUNT(*) AS registered,
                   SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END) AS active,
                   SUM(assignments) AS total_assignments,
                   AVG(CAST(open_assignments AS REAL) / MAX(max_workload, 1)) * 100.0 AS avg_workload_percent
            FROM (
                SELECT ac.agent_type, ac.status, ac.max_workload,
                       (SELECT COUNT(*) FROM agent_assignments aa
                        WHERE aa.agent_id = ac.agent_id) AS assignments,
                       (SELECT COUNT(*) FROM agent_assignments aa
                        WHERE aa.agent_id = ac.agent_id AND aa.status IN ('assigned', 'started')) AS open_assignments
                FROM agent_configurations ac
            )
            GROUP BY agent_type
            ORDER BY agent_type
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(AgentTypeStats {
                    agent_type: row.try_get("agent_type")?,
                    registered: row.try_get("registered")?,
                    active: row.try_get("active")?,
                    total_assignments: row.try_get("total_assignments")?,
                    avg_workload_percent: row.try_get("avg_workload_percent")?,
                })
            })
            .collect()
    }

    /// Share of the agent's assignments that completed, as a percentage.
    /// `None` when the agent has no assignment history.
    pub async fn success_rate(&self, agent_id: &str) -> Result<Option<f64>> {
        let (total, completed): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0)
            FROM agent_assignments
            WHERE agent_id = ?1
            "#,
        )
        .bind(agent_id)
        .fetch_one(&self.pool)
        .await?;

        if total == 0 {
            return Ok(None);
        }
        Ok(Some(completed as f64 / total as f64 * 100.0))
    }

    /// Average execution time of results on workflows this agent was assigned to.
    pub async fn avg_duration_ms(&self, agent_id: &str) -> Result<Option<f64>> {
        let avg = sqlx::query_scalar(
            r#"
            SELECT AVG(wr.execution_time_ms)
            FROM workflow_results wr
            WHERE wr.workflow_id IN (
                SELECT DISTINCT workflow_id FROM agent_assignments WHERE agent_id = ?1
            )
            "#,
        )
        .bind(agent_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(avg)
    }
}

fn load_from_row(row: &SqliteRow) -> Result<AgentLoad> {
    Ok(AgentLoad {
        agent_id: row.try_get("agent_id")?,
        agent_type: row.try_get("agent_type")?,
        current_workload: row.try_get("current_workload")?,
        max_workload: row.try_get("max_workload")?,
    })
}

fn agent_from_row(row: &SqliteRow) -> Result<Agent> {
    let configuration: String = row.try_get("configuration")?;
    let capabilities: String = row.try_get("capabilities")?;
    let performance: Option<String> = row.try_get("performance_metrics")?;

    Ok(Agent {
        id: row.try_get("agent_id")?,
        agent_type: row.try_get("agent_type")?,
        status: row.try_get("status")?,
        capabilities: serde_json::from_str(&capabilities)?,
        configuration: serde_json::from_str(&configuration)?,
        max_workload: row.try_get("max_workload")?,
        current_workload: row.try_get("current_workload")?,
        last_heartbeat: row.try_get("last_heartbeat")?,
        performance_stats: performance
            .map(|raw| serde_json::from_str::<PerformanceStats>(&raw))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;
    use crate::store::AssignmentStore;

    async fn stores() -> (AgentStore, AssignmentStore) {
        let db = DatabaseManager::in_memory().await.unwrap();
        (
            AgentStore::new(db.pool().clone()),
            AssignmentStore::new(db.pool().clone()),
        )
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let (agents, _) = stores().await;
        let mut agent = Agent::new("research-agent-1", "research", 3);
        agent
            .capabilities
            .insert("languages".to_string(), serde_json::json!(["rust"]));
        agents.upsert(&agent).await.unwrap();

        let loaded = agents.get("research-agent-1").await.unwrap().unwrap();
        assert_eq!(loaded.agent_type, "research");
        assert_eq!(loaded.status, AgentStatus::Active);
        assert_eq!(loaded.current_workload, 0);
        assert_eq!(loaded.capabilities, agent.capabilities);

        assert!(agents.deactivate("research-agent-1").await.unwrap());
        assert!(!agents.deactivate("ghost").await.unwrap());

        // Re-registering reactivates
        agents.upsert(&agent).await.unwrap();
        assert_eq!(
            agents.get("research-agent-1").await.unwrap().unwrap().status,
            AgentStatus::Active
        );
    }

    #[tokio::test]
    async fn test_workload_follows_open_assignments() {
        let (agents, assignments) = stores().await;
        agents.upsert(&Agent::new("a1", "code", 2)).await.unwrap();
        agents.upsert(&Agent::new("a2", "code", 2)).await.unwrap();

        assignments.open("wf-1", "code", "a1", None).await.unwrap();
        assignments.open("wf-2", "code", "a1", None).await.unwrap();
        assignments.open("wf-3", "code", "a2", None).await.unwrap();

        let candidates = agents.candidates("code").await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].agent_id, "a2");
        assert_eq!(candidates[0].available_slots(), 1);

        let loads = agents.active_loads().await.unwrap();
        assert_eq!(loads[0].agent_id, "a1");
        assert_eq!(loads[0].load_factor(), 1.0);

        assignments.cancel_open("wf-1").await.unwrap();
        assert_eq!(agents.get("a1").await.unwrap().unwrap().current_workload, 1);
    }

    #[tokio::test]
    async fn test_type_stats() {
        let (agents, assignments) = stores().await;
        assert!(agents.type_stats().await.unwrap().is_empty());

        agents.upsert(&Agent::new("c1", "code", 2)).await.unwrap();
        agents.upsert(&Agent::new("c2", "code", 4)).await.unwrap();
        agents.upsert(&Agent::new("r1", "review", 1)).await.unwrap();
        agents.deactivate("r1").await.unwrap();

        assignments.open("wf-1", "code", "c1", None).await.unwrap();
        assignments.open("wf-2", "code", "c1", None).await.unwrap();
        assignments.open("wf-3", "code", "c2", None).await.unwrap();
        assignments.cancel_open("wf-3").await.unwrap();

        let stats = agents.type_stats().await.unwrap();
        assert_eq!(stats.len(), 2);
        let code = &stats[0];
        assert_eq!(code.agent_type, "code");
        assert_eq!(code.registered, 2);
        assert_eq!(code.active, 2);
        assert_eq!(code.total_assignments, 3);
        // c1 at 100%, c2 at 0%
        assert!((code.avg_workload_percent - 50.0).abs() < 1e-9);

        let review = &stats[1];
        assert_eq!(review.registered, 1);
        assert_eq!(review.active, 0);
        assert_eq!(review.total_assignments, 0);
    }

    #[tokio::test]
    async fn test_success_rate() {
        let (agents, assignments) = stores().await;
        assert_eq!(agents.success_rate("a1").await.unwrap(), None);

        assignments.open("wf-1", "code", "a1", None).await.unwrap();
        assignments.handoff("wf-1", "a1", "a2", "code").await.unwrap();
        assignments.open("wf-2", "code", "a1", None).await.unwrap();

        assert_eq!(agents.success_rate("a1").await.unwrap(), Some(50.0));
        assert_eq!(agents.avg_duration_ms("a1").await.unwrap(), None);
    }
}
