//! The Event Log (C4): append-only `RunEvent` storage with CAS-guarded
//! `Run` status transitions, best-effort non-blocking ingestion, and
//! ordered replay — the durability backbone the Planner and Executor write
//! through without ever touching sqlite directly (§4.4).

pub mod connection;
pub mod error;
pub mod recorder;
pub mod repositories;

pub use connection::{DatabaseConnection, DatabasePool};
pub use error::{EventLogError, Result};
pub use recorder::EventRecorder;
pub use repositories::{SqliteRunEventRepository, SqliteRunRepository, SqliteWorkflowRepository};
