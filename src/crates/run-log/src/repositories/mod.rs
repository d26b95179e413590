//! Concrete sqlx repository implementations of the `ports` crate's
//! persistence traits (§4.6, §6).

pub mod run_event_repo;
pub mod run_repo;
pub mod workflow_repo;

pub use run_event_repo::SqliteRunEventRepository;
pub use run_repo::SqliteRunRepository;
pub use workflow_repo::SqliteWorkflowRepository;
