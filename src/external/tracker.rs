//! Beads issue tracker abstraction
//!
//! Every workflow is mirrored as a beads issue for human visibility. The bridge
//! creates the issue up front and afterwards only pushes status changes and
//! comments, all through [`IssueTracker`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use super::command::{CommandError, CommandExecutor, ProcessCommandExecutor};
use crate::config::TrackerConfig;

#[derive(Debug, Error, Clone)]
pub enum TrackerError {
    #[error("Issue not found: {issue_id}")]
    IssueNotFound { issue_id: String },
    #[error("Beads command failed: {message}")]
    CommandFailed { message: String },
    #[error("Invalid response from beads: {message}")]
    InvalidResponse { message: String },
    #[error("Issue tracker unavailable: {message}")]
    Unavailable { message: String },
    #[error("Command execution error: {source}")]
    CommandError {
        #[from]
        source: CommandError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateIssueRequest {
    pub title: String,
    pub description: Option<String>,
    pub issue_type: String,
    pub priority: i32,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub issue_type: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Partial update; unset fields are left untouched on the issue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueUpdate {
    pub status: Option<String>,
    pub assignee: Option<String>,
    pub priority: Option<i32>,
}

impl IssueUpdate {
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn create_issue(&self, request: &CreateIssueRequest) -> Result<Issue, TrackerError>;

    async fn update_issue(&self, issue_id: &str, update: &IssueUpdate) -> Result<(), TrackerError>;

    async fn add_comment(&self, issue_id: &str, text: &str) -> Result<(), TrackerError>;
}

/// Drives the `bd` command line tool.
pub struct BeadsCliTracker {
    executor: Arc<dyn CommandExecutor>,
    bd_path: String,
    actor: String,
}

impl BeadsCliTracker {
    pub fn new(executor: Arc<dyn CommandExecutor>, bd_path: &str, actor: &str) -> Self {
        Self {
            executor,
            bd_path: bd_path.to_string(),
            actor: actor.to_string(),
        }
    }

    /// Tracker running the configured `bd` binary as a child process.
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(Arc::new(ProcessCommandExecutor), &config.bd_path, &config.actor)
    }

    async fn execute_bd_command(
        &self,
        args: &[&str],
        issue_id: Option<&str>,
    ) -> Result<String, TrackerError> {
        let mut full_args = vec!["--actor", self.actor.as_str()];
        full_args.extend_from_slice(args);

        let output = self.executor.execute(&self.bd_path, &full_args).await?;

        if !output.success() {
            return Err(self.classify_bd_error(issue_id, &output.stderr));
        }

        Ok(output.stdout)
    }

    fn classify_bd_error(&self, issue_id: Option<&str>, stderr: &str) -> TrackerError {
        if let (Some(issue_id), true) = (issue_id, stderr.contains("not found")) {
            TrackerError::IssueNotFound {
                issue_id: issue_id.to_string(),
            }
        } else if stderr.contains("database is locked") || stderr.contains("no beads database") {
            TrackerError::Unavailable {
                message: stderr.trim().to_string(),
            }
        } else {
            TrackerError::CommandFailed {
                message: stderr.trim().to_string(),
            }
        }
    }
}

#[async_trait]
impl IssueTracker for BeadsCliTracker {
    async fn create_issue(&self, request: &CreateIssueRequest) -> Result<Issue, TrackerError> {
        let priority = request.priority.to_string();
        let labels = request.labels.join(",");
        let mut args = vec![
            "create",
            request.title.as_str(),
            "--type",
            request.issue_type.as_str(),
            "--priority",
            priority.as_str(),
        ];

        if let Some(description) = &request.description {
            args.extend(["--description", description.as_str()]);
        }

        if !labels.is_empty() {
            args.extend(["--labels", labels.as_str()]);
        }
        args.push("--json");

        let output = self.execute_bd_command(&args, None).await?;

        serde_json::from_str(output.trim()).map_err(|e| TrackerError::InvalidResponse {
            message: format!("Failed to parse created issue JSON: {e}"),
        })
    }

    async fn update_issue(&self, issue_id: &str, update: &IssueUpdate) -> Result<(), TrackerError> {
        let priority = update.priority.map(|p| p.to_string());
        let mut args = vec!["update", issue_id];

        if let Some(status) = &update.status {
            args.extend(["--status", status.as_str()]);
        }
        if let Some(assignee) = &update.assignee {
            args.extend(["--assignee", assignee.as_str()]);
        }
        if let Some(priority) = &priority {
            args.extend(["--priority", priority.as_str()]);
        }

        if args.len() == 2 {
            return Ok(());
        }

        self.execute_bd_command(&args, Some(issue_id)).await?;
        Ok(())
    }

    async fn add_comment(&self, issue_id: &str, text: &str) -> Result<(), TrackerError> {
        self.execute_bd_command(&["comments", "add", issue_id, text], Some(issue_id))
            .await?;
        Ok(())
    }
}
