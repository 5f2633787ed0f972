//! Coordination database stores
//!
//! Thin typed wrappers over the sqlx pool. Each write is a single statement or
//! an explicit transaction; correctness under concurrent callers comes from
//! SQLite's row-level guarantees, not from application locks.

pub mod agents;
pub mod assignments;
pub mod mappings;
pub mod results;

pub use agents::{AgentLoad, AgentStore, AgentTypeStats};
pub use assignments::{AssignmentStore, HandoffRecord};
pub use mappings::MappingStore;
pub use results::{ResultAggregate, ResultStore};
