//! Agent registry, explicit assignment, results and analytics.

use beads_workflow::best_effort::BestEffortOp;
use beads_workflow::models::AgentStatus;
use beads_workflow::{
    Agent, AnalyticsFilters, BridgeError, EventType, WorkflowResult, WorkflowStatus,
};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::time::Duration;

mod common;
use common::{request, Harness};

fn result(result_type: &str, confidence: f64, execution_time_ms: i64) -> WorkflowResult {
    WorkflowResult {
        workflow_id: String::new(),
        agent_type: "research".to_string(),
        result_type: result_type.to_string(),
        data: json!({ "summary": result_type }),
        confidence_score: confidence,
        quality_score: 0.7,
        execution_time_ms,
        artifacts: vec!["notes.md".to_string()],
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_register_and_unregister_agent() {
    let h = Harness::new().await;
    h.bridge
        .register_agent(&Agent::new("research-1", "research", 3))
        .await
        .unwrap();

    let agent = h.bridge.get_agent_status("research-1").await.unwrap();
    assert_eq!(agent.agent_type, "research");
    assert_eq!(agent.status, AgentStatus::Active);
    assert_eq!(agent.max_workload, 3);
    assert_eq!(agent.current_workload, 0);

    h.bridge.unregister_agent("research-1").await.unwrap();
    assert_eq!(
        h.bridge.get_agent_status("research-1").await.unwrap().status,
        AgentStatus::Inactive
    );

    // Registering again reactivates
    h.bridge
        .register_agent(&Agent::new("research-1", "research", 5))
        .await
        .unwrap();
    let agent = h.bridge.get_agent_status("research-1").await.unwrap();
    assert_eq!(agent.status, AgentStatus::Active);
    assert_eq!(agent.max_workload, 5);
}

#[tokio::test]
async fn test_reported_status_controls_candidacy() {
    let h = Harness::new().await;
    h.bridge
        .register_agent(&Agent::new("code-1", "code", 2))
        .await
        .unwrap();

    h.bridge
        .report_agent_status("code-1", AgentStatus::Busy)
        .await
        .unwrap();
    assert_eq!(
        h.bridge.get_agent_status("code-1").await.unwrap().status,
        AgentStatus::Busy
    );
    assert!(matches!(
        h.bridge.planner().select_best_agent("code").await.unwrap_err(),
        BridgeError::NoAvailableAgent { .. }
    ));

    h.bridge
        .report_agent_status("code-1", AgentStatus::Active)
        .await
        .unwrap();
    assert_eq!(
        h.bridge.planner().select_best_agent("code").await.unwrap().agent_id,
        "code-1"
    );
}

#[tokio::test]
async fn test_unknown_agents() {
    let h = Harness::new().await;

    assert!(matches!(
        h.bridge.unregister_agent("ghost").await.unwrap_err(),
        BridgeError::AgentNotFound { agent_id } if agent_id == "ghost"
    ));
    assert!(matches!(
        h.bridge.get_agent_status("ghost").await.unwrap_err(),
        BridgeError::AgentNotFound { .. }
    ));
    assert!(matches!(
        h.bridge
            .report_agent_status("ghost", AgentStatus::Busy)
            .await
            .unwrap_err(),
        BridgeError::AgentNotFound { .. }
    ));
}

#[tokio::test]
async fn test_assign_workflow_to_registered_agent() {
    let h = Harness::new().await;
    let workflow = h.bridge.start_workflow(request("code", None)).await.unwrap();
    let mut assigned = h.bridge.subscribe(EventType::AgentAssigned);

    let err = h
        .bridge
        .assign_workflow(&workflow.id, "code-1")
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::AgentNotFound { .. }));

    h.bridge
        .register_agent(&Agent::new("code-1", "code", 2))
        .await
        .unwrap();
    h.bridge.assign_workflow(&workflow.id, "code-1").await.unwrap();

    assert_eq!(
        h.bridge.get_workflow(&workflow.id).await.unwrap().agent_id.as_deref(),
        Some("code-1")
    );
    assert_eq!(
        h.bridge.get_agent_status("code-1").await.unwrap().current_workload,
        1
    );
    let event = assigned.try_recv().unwrap();
    assert_eq!(event.data["agent_type"], "code");

    // Cancelling closes the assignment and frees the slot
    h.bridge.cancel_workflow(&workflow.id, "no longer needed").await.unwrap();
    assert_eq!(
        h.bridge.get_agent_status("code-1").await.unwrap().current_workload,
        0
    );
}

#[tokio::test]
async fn test_assign_unknown_workflow() {
    let h = Harness::new().await;
    h.bridge
        .register_agent(&Agent::new("code-1", "code", 2))
        .await
        .unwrap();

    let err = h
        .bridge
        .assign_workflow("wf-missing", "code-1")
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_terminal_workflow_refuses_assignment() {
    let h = Harness::new().await;
    h.bridge
        .register_agent(&Agent::new("code-1", "code", 1))
        .await
        .unwrap();
    let workflow = h.bridge.start_workflow(request("code", None)).await.unwrap();
    h.bridge.cancel_workflow(&workflow.id, "dropped").await.unwrap();
    let mut assigned = h.bridge.subscribe(EventType::AgentAssigned);

    let err = h
        .bridge
        .assign_workflow(&workflow.id, "code-1")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BridgeError::WorkflowClosed { status: WorkflowStatus::Cancelled, .. }
    ));
    assert_eq!(
        h.bridge.get_agent_status("code-1").await.unwrap().current_workload,
        0
    );
    assert!(assigned.try_recv().is_err());
    // The slot stays free for live work
    assert_eq!(
        h.bridge.planner().select_best_agent("code").await.unwrap().agent_id,
        "code-1"
    );

    for status in [WorkflowStatus::Completed, WorkflowStatus::Failed] {
        let workflow = h.bridge.start_workflow(request("code", None)).await.unwrap();
        h.bridge
            .update_workflow_status(&workflow.id, status)
            .await
            .unwrap();
        assert!(matches!(
            h.bridge.assign_workflow(&workflow.id, "code-1").await.unwrap_err(),
            BridgeError::WorkflowClosed { .. }
        ));
    }
}

#[tokio::test]
async fn test_store_and_list_results() {
    let h = Harness::new().await;
    let workflow = h.bridge.start_workflow(request("research", None)).await.unwrap();
    let mut stored = h.bridge.subscribe(EventType::ResultStored);

    h.bridge
        .store_results(&workflow.id, result("draft", 0.5, 800))
        .await
        .unwrap();
    h.bridge
        .store_results(&workflow.id, result("final", 0.9, 1200))
        .await
        .unwrap();

    let results = h.bridge.get_results(&workflow.id).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].result_type, "final");
    assert_eq!(results[0].workflow_id, workflow.id);
    assert_eq!(results[0].artifacts, vec!["notes.md".to_string()]);
    assert_eq!(results[1].result_type, "draft");

    let comments: Vec<String> = h.tracker.comments().into_iter().map(|(_, c)| c).collect();
    assert_eq!(
        comments,
        vec![
            "Results stored: draft (confidence: 0.50)".to_string(),
            "Results stored: final (confidence: 0.90)".to_string(),
        ]
    );

    assert_eq!(stored.try_recv().unwrap().data["result_type"], "draft");
}

#[tokio::test]
async fn test_results_comment_failure_is_recorded() {
    let h = Harness::new().await;
    let workflow = h.bridge.start_workflow(request("research", None)).await.unwrap();
    h.tracker.fail_comment(true);

    h.bridge
        .store_results(&workflow.id, result("draft", 0.5, 800))
        .await
        .unwrap();

    assert_eq!(h.bridge.get_results(&workflow.id).await.unwrap().len(), 1);
    let failures = h.bridge.best_effort_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].operation, BestEffortOp::ResultsComment);
    assert_eq!(failures[0].workflow_id, workflow.id);
}

#[tokio::test]
async fn test_workflow_analytics() {
    let h = Harness::new().await;
    let mut ids = Vec::new();
    for workflow_type in ["research", "research", "research", "code"] {
        ids.push(
            h.bridge
                .start_workflow(request(workflow_type, None))
                .await
                .unwrap()
                .id,
        );
    }
    h.bridge
        .update_workflow_status(&ids[0], WorkflowStatus::Completed)
        .await
        .unwrap();
    h.bridge
        .update_workflow_status(&ids[1], WorkflowStatus::Failed)
        .await
        .unwrap();
    h.bridge
        .update_workflow_status(&ids[3], WorkflowStatus::Completed)
        .await
        .unwrap();
    h.bridge
        .store_results(&ids[0], result("final", 0.9, 1000))
        .await
        .unwrap();
    h.bridge
        .store_results(&ids[3], result("patch", 0.9, 3000))
        .await
        .unwrap();

    let all = h
        .bridge
        .get_workflow_analytics(&AnalyticsFilters::default())
        .await
        .unwrap();
    assert_eq!(all.total_workflows, 4);
    assert_eq!(all.active_workflows, 1);
    assert_eq!(all.completed_workflows, 2);
    assert_eq!(all.failed_workflows, 1);
    assert_eq!(all.success_rate, 50.0);
    assert_eq!(all.avg_execution_time_ms, Some(2000.0));

    let research = h
        .bridge
        .get_workflow_analytics(&AnalyticsFilters {
            workflow_type: Some("research".to_string()),
            ..AnalyticsFilters::default()
        })
        .await
        .unwrap();
    assert_eq!(research.total_workflows, 3);
    assert_eq!(research.completed_workflows, 1);
    assert_eq!(research.avg_execution_time_ms, Some(1000.0));

    let future = h
        .bridge
        .get_workflow_analytics(&AnalyticsFilters {
            start_date: Some(Utc::now() + ChronoDuration::hours(1)),
            ..AnalyticsFilters::default()
        })
        .await
        .unwrap();
    assert_eq!(future.total_workflows, 0);
    assert_eq!(future.success_rate, 0.0);
    assert_eq!(future.avg_execution_time_ms, None);
}

#[tokio::test]
async fn test_performance_metrics_window() {
    let h = Harness::new().await;
    let workflow = h.bridge.start_workflow(request("research", None)).await.unwrap();

    let empty = h
        .bridge
        .get_performance_metrics(Duration::from_secs(3600))
        .await
        .unwrap();
    assert_eq!(empty.result_count, 0);
    assert_eq!(empty.avg_confidence_score, None);

    h.bridge
        .store_results(&workflow.id, result("a", 0.5, 1000))
        .await
        .unwrap();
    h.bridge
        .store_results(&workflow.id, result("b", 1.0, 2000))
        .await
        .unwrap();

    let metrics = h
        .bridge
        .get_performance_metrics(Duration::from_secs(3600))
        .await
        .unwrap();
    assert_eq!(metrics.period_seconds, 3600);
    assert_eq!(metrics.result_count, 2);
    assert_eq!(metrics.avg_execution_time_ms, Some(1500.0));
    assert_eq!(metrics.avg_confidence_score, Some(0.75));
}

#[tokio::test]
async fn test_performance_metrics_unbounded_window() {
    let h = Harness::new().await;
    let workflow = h.bridge.start_workflow(request("research", None)).await.unwrap();
    h.bridge
        .store_results(&workflow.id, result("a", 0.5, 1000))
        .await
        .unwrap();

    let metrics = h
        .bridge
        .get_performance_metrics(Duration::MAX)
        .await
        .unwrap();

    assert_eq!(metrics.period_seconds, i64::MAX);
    assert_eq!(metrics.result_count, 1);

    let metrics = h
        .bridge
        .get_performance_metrics(Duration::from_secs(u64::MAX / 2 + 1))
        .await
        .unwrap();
    assert_eq!(metrics.period_seconds, i64::MAX);
}
