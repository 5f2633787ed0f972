//! Workflow metrics
//!
//! [`MetricsCollector`] aggregates lifecycle counters and duration samples in
//! memory; [`MetricsStore`] persists its daily per-type totals to the
//! `workflow_analytics` table.

mod collector;
mod storage;
mod types;

pub use collector::MetricsCollector;
pub use storage::MetricsStore;
pub use types::*;
