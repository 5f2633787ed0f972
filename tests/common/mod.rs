#![allow(dead_code)]

use beads_workflow::testing::{RecordingTracker, ScriptedEngine};
use beads_workflow::{BridgeSettings, CoordinationBridge, DatabaseManager, StartWorkflowRequest};
use std::sync::Arc;

pub struct Harness {
    pub bridge: Arc<CoordinationBridge>,
    pub tracker: Arc<RecordingTracker>,
    pub engine: Arc<ScriptedEngine>,
    pub db: DatabaseManager,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_settings(BridgeSettings::default()).await
    }

    pub async fn with_settings(settings: BridgeSettings) -> Self {
        let db = DatabaseManager::in_memory().await.unwrap();
        let tracker = Arc::new(RecordingTracker::new());
        let engine = Arc::new(ScriptedEngine::new());
        let bridge = CoordinationBridge::new(
            db.pool().clone(),
            tracker.clone(),
            engine.clone(),
            settings,
        )
        .await
        .unwrap();

        Self {
            bridge: Arc::new(bridge),
            tracker,
            engine,
            db,
        }
    }

    /// A fresh bridge over the same database, tracker and engine, as after a restart.
    pub async fn restart(&self) -> Arc<CoordinationBridge> {
        let bridge = CoordinationBridge::new(
            self.db.pool().clone(),
            self.tracker.clone(),
            self.engine.clone(),
            BridgeSettings::default(),
        )
        .await
        .unwrap();
        Arc::new(bridge)
    }
}

pub fn request(workflow_type: &str, agent_type: Option<&str>) -> StartWorkflowRequest {
    StartWorkflowRequest {
        issue_title: format!("Run {workflow_type}"),
        workflow_type: workflow_type.to_string(),
        agent_type: agent_type.map(str::to_string),
        priority: 2,
        ..Default::default()
    }
}
