//! The concrete `LlmPort` adapter (§4.6): an OpenAI-compatible remote
//! chat-completion client. `workflow-planner` depends only on
//! `ports::LlmPort`; this crate is what a binary wiring the system together
//! would construct and hand in.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::{OpenAiLlmPort, RemoteLlmConfig};
//! use ports::{ChatMessage, LlmPort};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RemoteLlmConfig::from_env("OPENAI_API_KEY", "https://api.openai.com/v1", "gpt-4")?;
//!     let port = OpenAiLlmPort::new(config);
//!
//!     let completion = port.invoke(&[ChatMessage::user("Explain quantum computing briefly")]).await?;
//!     println!("{}", completion.text);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod openai;
pub mod provider_utils;

pub use config::RemoteLlmConfig;
pub use error::{LlmError, Result};
pub use openai::OpenAiLlmPort;
pub use provider_utils::{ModelInfo, ProviderUtils};
