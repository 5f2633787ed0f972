//! Record of side effects that failed without failing the caller's operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use tracing::warn;

/// Side effects the bridge performs on a best-effort basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BestEffortOp {
    IssueStatusSync,
    CancelComment,
    HandoffComment,
    HandoffSignal,
    ResultsComment,
    EntityLink,
    RecoveryIssueSync,
}

impl BestEffortOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BestEffortOp::IssueStatusSync => "issue_status_sync",
            BestEffortOp::CancelComment => "cancel_comment",
            BestEffortOp::HandoffComment => "handoff_comment",
            BestEffortOp::HandoffSignal => "handoff_signal",
            BestEffortOp::ResultsComment => "results_comment",
            BestEffortOp::EntityLink => "entity_link",
            BestEffortOp::RecoveryIssueSync => "recovery_issue_sync",
        }
    }
}

impl fmt::Display for BestEffortOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestEffortFailure {
    pub operation: BestEffortOp,
    pub workflow_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Bounded log of best-effort failures. Oldest entries are evicted first.
#[derive(Debug)]
pub struct BestEffortLog {
    capacity: usize,
    entries: Mutex<VecDeque<BestEffortFailure>>,
}

impl BestEffortLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Log the failure as a warning and keep it for later inspection.
    pub fn record(&self, operation: BestEffortOp, workflow_id: &str, error: impl fmt::Display) {
        let message = error.to_string();
        warn!(
            operation = %operation,
            workflow_id = %workflow_id,
            error = %message,
            "Best-effort operation failed"
        );

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(BestEffortFailure {
            operation,
            workflow_id: workflow_id.to_string(),
            message,
            timestamp: Utc::now(),
        });
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<BestEffortFailure> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().cloned().collect()
    }

    pub fn drain(&self) -> Vec<BestEffortFailure> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_is_bounded() {
        let log = BestEffortLog::new(2);
        log.record(BestEffortOp::CancelComment, "wf-1", "first");
        log.record(BestEffortOp::HandoffSignal, "wf-2", "second");
        log.record(BestEffortOp::IssueStatusSync, "wf-3", "third");

        let entries = log.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].workflow_id, "wf-2");
        assert_eq!(entries[1].operation, BestEffortOp::IssueStatusSync);
        assert_eq!(entries[1].message, "third");
    }

    #[test]
    fn test_drain_empties_log() {
        let log = BestEffortLog::new(8);
        log.record(BestEffortOp::ResultsComment, "wf-1", "tracker offline");

        assert_eq!(log.drain().len(), 1);
        assert!(log.is_empty());
    }
}
