//! In-memory fakes for the engine and tracker seams.
//!
//! Used by the crate's own tests. Embedders who want to exercise a bridge
//! without a running engine or a `bd` binary enable the `testing` feature.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::external::{
    CreateIssueRequest, EngineError, EngineFuture, EngineRequest, EngineWorkflowInfo, Issue,
    IssueTracker, IssueUpdate, TrackerError, WorkflowEngine,
};
use crate::models::EngineEntityId;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Tracker that keeps issues in memory and records every call.
#[derive(Debug, Default)]
pub struct RecordingTracker {
    next_issue: AtomicU64,
    issues: Mutex<HashMap<String, Issue>>,
    updates: Mutex<Vec<(String, IssueUpdate)>>,
    comments: Mutex<Vec<(String, String)>>,
    fail_create: AtomicBool,
    fail_update: AtomicBool,
    fail_comment: AtomicBool,
}

impl RecordingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    pub fn fail_comment(&self, fail: bool) {
        self.fail_comment.store(fail, Ordering::SeqCst);
    }

    pub fn issue(&self, issue_id: &str) -> Option<Issue> {
        lock(&self.issues).get(issue_id).cloned()
    }

    pub fn issue_count(&self) -> usize {
        lock(&self.issues).len()
    }

    /// Successful updates in call order.
    pub fn updates(&self) -> Vec<(String, IssueUpdate)> {
        lock(&self.updates).clone()
    }

    /// Successful comments in call order.
    pub fn comments(&self) -> Vec<(String, String)> {
        lock(&self.comments).clone()
    }

    fn unavailable() -> TrackerError {
        TrackerError::Unavailable {
            message: "tracker offline".to_string(),
        }
    }
}

#[async_trait]
impl IssueTracker for RecordingTracker {
    async fn create_issue(&self, request: &CreateIssueRequest) -> Result<Issue, TrackerError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }

        let number = self.next_issue.fetch_add(1, Ordering::SeqCst) + 1;
        let issue = Issue {
            id: format!("bd-{number}"),
            title: request.title.clone(),
            status: "open".to_string(),
            issue_type: request.issue_type.clone(),
            priority: request.priority,
            labels: request.labels.clone(),
        };
        lock(&self.issues).insert(issue.id.clone(), issue.clone());
        Ok(issue)
    }

    async fn update_issue(&self, issue_id: &str, update: &IssueUpdate) -> Result<(), TrackerError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }

        let mut issues = lock(&self.issues);
        let issue = issues
            .get_mut(issue_id)
            .ok_or_else(|| TrackerError::IssueNotFound {
                issue_id: issue_id.to_string(),
            })?;
        if let Some(status) = &update.status {
            issue.status = status.clone();
        }
        if let Some(priority) = update.priority {
            issue.priority = priority;
        }
        drop(issues);

        lock(&self.updates).push((issue_id.to_string(), update.clone()));
        Ok(())
    }

    async fn add_comment(&self, issue_id: &str, text: &str) -> Result<(), TrackerError> {
        if self.fail_comment.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        if !lock(&self.issues).contains_key(issue_id) {
            return Err(TrackerError::IssueNotFound {
                issue_id: issue_id.to_string(),
            });
        }

        lock(&self.comments).push((issue_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// How [`ScriptedEngine`] resolves entity ids for new executions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdAssignment {
    /// Assign sequential ids immediately.
    Immediate,
    /// Never resolve `wait_for_ids`.
    Never,
    /// Resolve without an entity.
    NoEntity,
    /// Fail `wait_for_ids` with this message.
    Fail(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSignal {
    pub entity_id: EngineEntityId,
    pub name: String,
    pub payload: Value,
}

#[derive(Debug)]
pub struct ScriptedFuture {
    entity_id: Option<EngineEntityId>,
    assignment: IdAssignment,
}

#[async_trait]
impl EngineFuture for ScriptedFuture {
    async fn wait_for_ids(&self) -> Result<(), EngineError> {
        match &self.assignment {
            IdAssignment::Never => std::future::pending().await,
            IdAssignment::Fail(message) => Err(EngineError::ExecutionFailed {
                message: message.clone(),
            }),
            IdAssignment::Immediate | IdAssignment::NoEntity => Ok(()),
        }
    }

    fn has_entity(&self) -> bool {
        self.entity_id.is_some()
    }

    fn entity_id(&self) -> Option<EngineEntityId> {
        self.entity_id
    }
}

/// Engine double with scripted id assignment, resume failures and signal capture.
#[derive(Debug)]
pub struct ScriptedEngine {
    next_entity: AtomicI64,
    assignment: Mutex<IdAssignment>,
    known: Mutex<HashMap<EngineEntityId, String>>,
    resume_failures: Mutex<HashSet<EngineEntityId>>,
    signal_failure: Mutex<Option<String>>,
    executed: Mutex<Vec<EngineRequest>>,
    resumed: Mutex<Vec<EngineEntityId>>,
    signals: Mutex<Vec<RecordedSignal>>,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            next_entity: AtomicI64::new(1),
            assignment: Mutex::new(IdAssignment::Immediate),
            known: Mutex::new(HashMap::new()),
            resume_failures: Mutex::new(HashSet::new()),
            signal_failure: Mutex::new(None),
            executed: Mutex::new(Vec::new()),
            resumed: Mutex::new(Vec::new()),
            signals: Mutex::new(Vec::new()),
        }
    }

    pub fn set_id_assignment(&self, assignment: IdAssignment) {
        *lock(&self.assignment) = assignment;
    }

    /// Make `resume` fail for one entity.
    pub fn fail_resume(&self, entity_id: EngineEntityId) {
        lock(&self.resume_failures).insert(entity_id);
    }

    /// Make every `publish_signal` fail with `message`.
    pub fn fail_signals(&self, message: impl Into<String>) {
        *lock(&self.signal_failure) = Some(message.into());
    }

    pub fn executed(&self) -> Vec<EngineRequest> {
        lock(&self.executed).clone()
    }

    pub fn resumed(&self) -> Vec<EngineEntityId> {
        lock(&self.resumed).clone()
    }

    pub fn signals(&self) -> Vec<RecordedSignal> {
        lock(&self.signals).clone()
    }
}

#[async_trait]
impl WorkflowEngine for ScriptedEngine {
    async fn execute(&self, request: EngineRequest) -> Result<Arc<dyn EngineFuture>, EngineError> {
        let assignment = lock(&self.assignment).clone();
        let entity_id = match assignment {
            IdAssignment::Immediate => {
                let id = EngineEntityId(self.next_entity.fetch_add(1, Ordering::SeqCst));
                lock(&self.known).insert(id, request.workflow_name.clone());
                Some(id)
            }
            _ => None,
        };

        lock(&self.executed).push(request);
        Ok(Arc::new(ScriptedFuture {
            entity_id,
            assignment,
        }))
    }

    async fn resume(&self, entity_id: EngineEntityId) -> Result<Arc<dyn EngineFuture>, EngineError> {
        if lock(&self.resume_failures).contains(&entity_id) {
            return Err(EngineError::EntityNotFound { entity_id });
        }

        lock(&self.resumed).push(entity_id);
        Ok(Arc::new(ScriptedFuture {
            entity_id: Some(entity_id),
            assignment: IdAssignment::Immediate,
        }))
    }

    async fn publish_signal(
        &self,
        entity_id: EngineEntityId,
        signal: &str,
        payload: Value,
    ) -> Result<(), EngineError> {
        if let Some(message) = lock(&self.signal_failure).clone() {
            return Err(EngineError::SignalRejected {
                entity_id,
                signal: signal.to_string(),
                message,
            });
        }

        lock(&self.signals).push(RecordedSignal {
            entity_id,
            name: signal.to_string(),
            payload,
        });
        Ok(())
    }

    async fn get_workflow(&self, entity_id: EngineEntityId) -> Result<EngineWorkflowInfo, EngineError> {
        let known = lock(&self.known);
        let workflow_name = known
            .get(&entity_id)
            .cloned()
            .ok_or(EngineError::EntityNotFound { entity_id })?;

        Ok(EngineWorkflowInfo {
            entity_id,
            workflow_name,
            status: if lock(&self.resumed).contains(&entity_id) {
                "resumed".to_string()
            } else {
                "running".to_string()
            },
        })
    }
}
