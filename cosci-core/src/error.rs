//! Error types for cosci-core.
//!
//! Three layers:
//! - [`ProviderError`]: a language model or literature provider failed. Stages
//!   match on it and substitute a fallback value; it never leaves the stage.
//! - [`ParseError`]: a model response did not follow the expected format.
//!   Logged and replaced with typed defaults.
//! - [`Error`]: everything that may escape a stage. Reaching the orchestrator
//!   terminates the session as a [`SessionFault`].

use thiserror::Error;

use crate::session::Hypothesis;

/// Result type alias using cosci-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of an external capability (LLM or literature search).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Transport-level failure
    #[error("{provider}: HTTP request failed: {message}")]
    Http { provider: String, message: String },

    /// Provider answered with a non-success status
    #[error("{provider}: API error ({status}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    /// Response body could not be decoded
    #[error("{provider}: failed to decode response: {message}")]
    Decode { provider: String, message: String },

    /// No API key or endpoint configured
    #[error("{provider}: not configured")]
    Unconfigured { provider: String },

    /// Provider answered but produced nothing usable
    #[error("{provider}: empty response")]
    Empty { provider: String },

    /// Request exceeded its deadline
    #[error("{provider}: timed out after {duration_ms}ms")]
    Timeout { provider: String, duration_ms: u64 },
}

impl ProviderError {
    /// Create an HTTP transport error.
    pub fn http(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Http {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an API status error.
    pub fn api(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an unconfigured-provider error.
    pub fn unconfigured(provider: impl Into<String>) -> Self {
        Self::Unconfigured {
            provider: provider.into(),
        }
    }

    /// Create an empty-response error.
    pub fn empty(provider: impl Into<String>) -> Self {
        Self::Empty {
            provider: provider.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(provider: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout {
            provider: provider.into(),
            duration_ms,
        }
    }

    /// Name of the provider that failed.
    pub fn provider(&self) -> &str {
        match self {
            Self::Http { provider, .. }
            | Self::Api { provider, .. }
            | Self::Decode { provider, .. }
            | Self::Unconfigured { provider }
            | Self::Empty { provider }
            | Self::Timeout { provider, .. } => provider,
        }
    }

    /// Map a reqwest error, distinguishing timeouts.
    pub(crate) fn from_reqwest(provider: &str, err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::timeout(provider, timeout_secs * 1000)
        } else {
            Self::http(provider, err.to_string())
        }
    }
}

/// A model response that does not match its expected structure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// A required labeled section was absent
    #[error("missing section: {0}")]
    MissingSection(&'static str),

    /// A score could not be read as a number
    #[error("invalid score: {0:?}")]
    InvalidScore(String),

    /// A search plan was not valid JSON or had no queries
    #[error("invalid search plan: {0}")]
    InvalidPlan(String),
}

/// Errors that can escape a stage.
#[derive(Error, Debug)]
pub enum Error {
    /// Provider failure surfaced outside a fallback path
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Unrecoverable parse failure
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Unexpected internal fault inside a stage
    #[error("Stage fault in {stage}: {message}")]
    StageFault { stage: String, message: String },

    /// Unknown session id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Rejected request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a stage fault.
    pub fn stage_fault(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageFault {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}

/// A stage fault that terminated a session.
///
/// Carries every hypothesis produced before the fault so the partial
/// result is never lost.
#[derive(Error, Debug)]
#[error("session {session_id} failed: {error}")]
pub struct SessionFault {
    pub session_id: String,
    #[source]
    pub error: Error,
    pub hypotheses: Vec<Hypothesis>,
}
