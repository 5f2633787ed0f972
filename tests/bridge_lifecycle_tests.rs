//! Workflow lifecycle through the coordination bridge: start, status updates,
//! cancellation and engine linking.

use beads_workflow::best_effort::BestEffortOp;
use beads_workflow::testing::IdAssignment;
use beads_workflow::{
    BridgeError, BridgeSettings, EngineEntityId, EngineRequest, EntityLinkOutcome, EventType,
    WorkflowStatus,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{request, Harness};

#[tokio::test]
async fn test_start_get_update_scenario() {
    let h = Harness::new().await;

    let started = h
        .bridge
        .start_workflow(request("research", Some("research")))
        .await
        .unwrap();

    assert!(started.id.starts_with("wf-research-"));
    assert_eq!(started.status, WorkflowStatus::Active);
    let agent_id = started.agent_id.clone().unwrap();
    assert!(agent_id.starts_with("research-agent-"));

    let issue = h.tracker.issue(&started.issue_id).unwrap();
    assert_eq!(issue.title, "Run research");
    assert_eq!(issue.labels, vec!["research", "workflow"]);

    let fetched = h.bridge.get_workflow(&started.id).await.unwrap();
    assert_eq!(fetched.status, WorkflowStatus::Active);
    assert_eq!(fetched.issue_id, started.issue_id);
    assert_eq!(fetched.agent_id.as_deref(), Some(agent_id.as_str()));

    h.bridge
        .update_workflow_status(&started.id, WorkflowStatus::Paused)
        .await
        .unwrap();

    let fetched = h.bridge.get_workflow(&started.id).await.unwrap();
    assert_eq!(fetched.status, WorkflowStatus::Paused);
    assert_eq!(h.tracker.issue(&started.issue_id).unwrap().status, "blocked");
}

#[tokio::test]
async fn test_start_records_variables_and_template() {
    let h = Harness::new().await;
    let mut req = request("code", None);
    req.variables.insert("repo".to_string(), json!("beads"));
    req.template_id = Some("tpl-7".to_string());

    let workflow = h.bridge.start_workflow(req).await.unwrap();

    assert_eq!(workflow.agent_id, None);
    assert_eq!(
        workflow.metadata,
        json!({"variables": {"repo": "beads"}, "template_id": "tpl-7"})
    );
    assert_eq!(
        h.bridge.get_workflow(&workflow.id).await.unwrap().metadata,
        workflow.metadata
    );
}

#[tokio::test]
async fn test_status_rewrite_is_idempotent() {
    let h = Harness::new().await;
    let workflow = h.bridge.start_workflow(request("research", None)).await.unwrap();
    let mut changes = h.bridge.subscribe(EventType::WorkflowStatusChanged);

    h.bridge
        .update_workflow_status(&workflow.id, WorkflowStatus::Completed)
        .await
        .unwrap();
    let first = h.bridge.get_workflow(&workflow.id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;

    h.bridge
        .update_workflow_status(&workflow.id, WorkflowStatus::Completed)
        .await
        .unwrap();
    let second = h.bridge.get_workflow(&workflow.id).await.unwrap();

    assert_eq!(second.status, WorkflowStatus::Completed);
    assert!(second.updated_at > first.updated_at);

    for _ in 0..2 {
        let event = changes.try_recv().unwrap();
        assert_eq!(event.workflow_id, workflow.id);
        assert_eq!(event.data["new_status"], "completed");
    }
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn test_terminal_status_rejects_other_transitions() {
    let h = Harness::new().await;
    let workflow = h.bridge.start_workflow(request("research", None)).await.unwrap();
    h.bridge
        .update_workflow_status(&workflow.id, WorkflowStatus::Failed)
        .await
        .unwrap();

    let mut changes = h.bridge.subscribe(EventType::WorkflowStatusChanged);
    let err = h
        .bridge
        .update_workflow_status(&workflow.id, WorkflowStatus::Active)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BridgeError::InvalidTransition {
            from: WorkflowStatus::Failed,
            to: WorkflowStatus::Active,
            ..
        }
    ));
    assert_eq!(
        h.bridge.get_workflow(&workflow.id).await.unwrap().status,
        WorkflowStatus::Failed
    );
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn test_unknown_workflow_is_not_found() {
    let h = Harness::new().await;

    assert!(h.bridge.get_workflow("wf-missing").await.unwrap_err().is_not_found());
    assert!(h
        .bridge
        .update_workflow_status("wf-missing", WorkflowStatus::Paused)
        .await
        .unwrap_err()
        .is_not_found());
    assert!(h
        .bridge
        .cancel_workflow("wf-missing", "no reason")
        .await
        .unwrap_err()
        .is_not_found());
    assert!(h.tracker.updates().is_empty());
}

#[tokio::test]
async fn test_tracker_failure_during_start_creates_nothing() {
    let h = Harness::new().await;
    h.tracker.fail_create(true);
    let mut events = h.bridge.subscribe_all();

    let err = h
        .bridge
        .start_workflow(request("research", Some("research")))
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Tracker(_)));
    let analytics = h
        .bridge
        .get_workflow_analytics(&Default::default())
        .await
        .unwrap();
    assert_eq!(analytics.total_workflows, 0);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_tracker_failure_during_status_update_is_recorded() {
    let h = Harness::new().await;
    let workflow = h.bridge.start_workflow(request("research", None)).await.unwrap();
    h.tracker.fail_update(true);

    h.bridge
        .update_workflow_status(&workflow.id, WorkflowStatus::Paused)
        .await
        .unwrap();

    assert_eq!(
        h.bridge.get_workflow(&workflow.id).await.unwrap().status,
        WorkflowStatus::Paused
    );
    let failures = h.bridge.best_effort_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].operation, BestEffortOp::IssueStatusSync);
    assert_eq!(failures[0].workflow_id, workflow.id);
}

#[tokio::test]
async fn test_cancel_closes_assignments_and_comments() {
    let h = Harness::new().await;
    let workflow = h
        .bridge
        .start_workflow(request("research", Some("research")))
        .await
        .unwrap();
    let mut cancelled = h.bridge.subscribe(EventType::WorkflowCancelled);

    h.bridge
        .cancel_workflow(&workflow.id, "superseded")
        .await
        .unwrap();

    let fetched = h.bridge.get_workflow(&workflow.id).await.unwrap();
    assert_eq!(fetched.status, WorkflowStatus::Cancelled);
    assert_eq!(fetched.agent_id, None);

    assert_eq!(
        h.tracker.comments(),
        vec![(workflow.issue_id.clone(), "Workflow cancelled: superseded".to_string())]
    );
    assert_eq!(h.tracker.issue(&workflow.issue_id).unwrap().status, "cancelled");

    let event = cancelled.try_recv().unwrap();
    assert_eq!(event.data["reason"], "superseded");
    assert_eq!(event.data["assignments_cancelled"], 1);
}

#[tokio::test]
async fn test_cancel_comment_failure_does_not_fail_cancel() {
    let h = Harness::new().await;
    let workflow = h.bridge.start_workflow(request("research", None)).await.unwrap();
    h.tracker.fail_comment(true);

    h.bridge.cancel_workflow(&workflow.id, "timeout").await.unwrap();

    let operations: Vec<_> = h
        .bridge
        .best_effort_failures()
        .into_iter()
        .map(|failure| failure.operation)
        .collect();
    assert_eq!(operations, vec![BestEffortOp::CancelComment]);
}

#[tokio::test]
async fn test_concurrent_starts_do_not_cross_contaminate() {
    let h = Harness::new().await;

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let bridge = Arc::clone(&h.bridge);
            tokio::spawn(async move {
                let workflow_type = format!("type{i}");
                let workflow = bridge
                    .start_workflow(request(&workflow_type, Some(&workflow_type)))
                    .await
                    .unwrap();
                (workflow_type, workflow)
            })
        })
        .collect();

    let mut ids = HashSet::new();
    let mut issues = HashSet::new();
    for task in tasks {
        let (workflow_type, workflow) = task.await.unwrap();
        let fetched = h.bridge.get_workflow(&workflow.id).await.unwrap();

        assert_eq!(fetched.workflow_type, workflow_type);
        assert_eq!(fetched.issue_id, workflow.issue_id);
        assert_eq!(fetched.agent_id, workflow.agent_id);
        assert!(fetched
            .agent_id
            .unwrap()
            .starts_with(&format!("{workflow_type}-agent-")));

        ids.insert(workflow.id);
        issues.insert(workflow.issue_id);
    }

    assert_eq!(ids.len(), 20);
    assert_eq!(issues.len(), 20);
    assert_eq!(h.tracker.issue_count(), 20);
}

#[tokio::test]
async fn test_execute_via_engine_links_entity() {
    let h = Harness::new().await;
    let workflow = h.bridge.start_workflow(request("research", None)).await.unwrap();
    let mut linked = h.bridge.subscribe(EventType::WorkflowEngineLinked);

    let execution = h
        .bridge
        .execute_via_engine(
            &workflow.id,
            EngineRequest::new("research_flow", json!({"topic": "caching"})),
        )
        .await
        .unwrap();
    assert!(execution.future().has_entity());

    assert_eq!(
        execution.link_outcome().await,
        EntityLinkOutcome::Linked(EngineEntityId(1))
    );
    assert_eq!(h.bridge.engine_entity_id(&workflow.id), Some(EngineEntityId(1)));
    assert_eq!(
        h.bridge.get_workflow(&workflow.id).await.unwrap().engine_entity_id,
        Some(EngineEntityId(1))
    );
    assert_eq!(linked.recv().await.unwrap().data["entity_id"], 1);
    assert_eq!(h.engine.executed()[0].workflow_name, "research_flow");
}

#[tokio::test]
async fn test_execute_via_engine_requires_mapping() {
    let h = Harness::new().await;

    let err = h
        .bridge
        .execute_via_engine("wf-missing", EngineRequest::new("research_flow", json!({})))
        .await
        .err()
        .unwrap();

    assert!(err.is_not_found());
    assert!(h.engine.executed().is_empty());
}

#[tokio::test]
async fn test_entity_wait_timeout_reports_pending() {
    let h = Harness::with_settings(BridgeSettings {
        entity_wait_timeout_seconds: 1,
        ..BridgeSettings::default()
    })
    .await;
    h.engine.set_id_assignment(IdAssignment::Never);
    let workflow = h.bridge.start_workflow(request("research", None)).await.unwrap();

    let execution = h
        .bridge
        .execute_via_engine(&workflow.id, EngineRequest::new("slow_flow", json!({})))
        .await
        .unwrap();

    assert_eq!(execution.link_outcome().await, EntityLinkOutcome::Pending);
    assert_eq!(h.bridge.engine_entity_id(&workflow.id), None);
    assert_eq!(
        h.bridge.best_effort_failures()[0].operation,
        BestEffortOp::EntityLink
    );
}

#[tokio::test]
async fn test_entity_link_can_be_cancelled() {
    let h = Harness::new().await;
    h.engine.set_id_assignment(IdAssignment::Never);
    let workflow = h.bridge.start_workflow(request("research", None)).await.unwrap();

    let execution = h
        .bridge
        .execute_via_engine(&workflow.id, EngineRequest::new("slow_flow", json!({})))
        .await
        .unwrap();
    assert!(!execution.is_link_finished());
    execution.cancel_link();

    assert_eq!(execution.link_outcome().await, EntityLinkOutcome::Cancelled);
    assert!(h.bridge.best_effort_failures().is_empty());
}

#[tokio::test]
async fn test_execution_without_entity() {
    let h = Harness::new().await;
    h.engine.set_id_assignment(IdAssignment::NoEntity);
    let workflow = h.bridge.start_workflow(request("research", None)).await.unwrap();

    let execution = h
        .bridge
        .execute_via_engine(&workflow.id, EngineRequest::new("inline_flow", json!({})))
        .await
        .unwrap();

    assert_eq!(execution.link_outcome().await, EntityLinkOutcome::NoEntity);
    assert_eq!(h.bridge.get_workflow(&workflow.id).await.unwrap().engine_entity_id, None);
}
