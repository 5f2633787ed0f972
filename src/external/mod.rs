//! External system abstractions
//!
//! Trait-based seams for the two systems the bridge coordinates: the durable
//! workflow engine and the beads issue tracker. The bridge only ever talks to
//! them through these traits, so tests substitute in-memory fakes and
//! production wires real clients.

pub mod command;
pub mod engine;
pub mod tracker;

pub use command::{CommandError, CommandExecutor, CommandOutput, ProcessCommandExecutor};
pub use engine::{
    EngineError, EngineFuture, EngineOptions, EngineRequest, EngineWorkflowInfo, WorkflowEngine,
};
pub use tracker::{BeadsCliTracker, CreateIssueRequest, Issue, IssueTracker, IssueUpdate, TrackerError};
