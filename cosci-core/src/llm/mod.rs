//! Language model gateway.
//!
//! Every stage talks to the model through [`LLMClient`], a stateless
//! prompt-to-text capability. Failures come back as
//! [`ProviderError`](crate::error::ProviderError) values so fallback
//! substitution is an explicit branch at the call site.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cosci_core::llm::{AnthropicClient, ClientConfig, LLMClient};
//!
//! let client = AnthropicClient::new(ClientConfig::from_env());
//! let text = client.generate_text("Summarize CRISPR off-target effects", 500, 0.3).await?;
//! ```

mod client;
mod types;

pub(crate) use client::build_http_client;
pub use client::{AnthropicClient, ClientConfig, LLMClient};
pub use types::{
    ChatMessage, ChatRole, CompletionRequest, CompletionResponse, Provider, StopReason, TokenUsage,
};
