//! The Port Layer (§4.6): abstract boundaries the Planner and Executor
//! depend on instead of concrete LLM clients, HTTP clients, or a database.
//! Dependency inversion lives here — `workflow-planner` and
//! `workflow-executor` import only the traits in this crate.

pub mod confirmation;
pub mod error;
pub mod http;
pub mod knowledge;
pub mod llm;
pub mod repository;

#[cfg(feature = "reqwest-client")]
pub mod http_client;

#[cfg(feature = "testing")]
pub mod testing;

pub use confirmation::{ConfirmationDecision, ConfirmationPort};
pub use error::{PortError, Result};
pub use http::{HttpMethod, HttpPort, HttpRequest, HttpResponse};
pub use knowledge::{KnowledgeChunk, KnowledgePort};
pub use llm::{ChatCompletion, ChatMessage, ChatToken, LlmPort, Role};
pub use repository::{EventChannel, Run, RunEventRecord, RunEventRepository, RunRepository, RunStatus, WorkflowRepository};
