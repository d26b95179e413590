//! Knowledge Port (§4.6): optional per-workflow retrieval used by the
//! Planner's `query_knowledge` action and by `knowledge` nodes at execution
//! time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub text: String,
    pub source: String,
    pub score: f64,
}

#[async_trait]
pub trait KnowledgePort: Send + Sync {
    async fn retrieve(&self, query: &str, scope: Option<&str>, top_k: usize) -> Result<Vec<KnowledgeChunk>>;
}
