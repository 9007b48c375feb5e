//! # cosci-core
//!
//! A multi-agent research hypothesis pipeline. A research goal drives
//! repeated iterations of three stages:
//!
//! - **Generation**: literature-grounded hypothesis drafting
//! - **Reflection**: critique, scoring, and quality dimensions
//! - **Ranking**: round-robin pairwise tournament over the whole set
//!
//! Literature comes from a domain-aware [`RetrievalStrategyEngine`] that
//! fans out over Perplexity, PubMed, and Google Scholar. Progress streams to
//! subscribers through the [`EventBroadcaster`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use cosci_core::{CoScientistContext, SessionOrchestrator};
//!
//! let context = CoScientistContext::from_env();
//! let orchestrator = SessionOrchestrator::new(&context);
//!
//! let outcome = orchestrator
//!     .run("s1", "Can gut microbiota modulate tau spread?", 3, 2)
//!     .await?;
//! if let Some(best) = outcome.session.top_hypothesis() {
//!     println!("{}", best.content);
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod error;
pub mod literature;
pub mod llm;
pub mod orchestrator;
pub mod retrieval;
pub mod session;
pub mod stage;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use broadcast::{
    AgentStatus, BroadcastMessage, ConnectionHandle, ConnectionId, ConnectionStats,
    EventBroadcaster, SessionEventType,
};
pub use config::{CoScientistConfig, OrchestratorConfig, RankingConfig, RetrievalConfig};
pub use error::{Error, ParseError, ProviderError, Result, SessionFault};
pub use literature::{LiteratureProvider, Paper, ProviderConfig, SourceKind};
pub use llm::{AnthropicClient, ClientConfig, LLMClient};
pub use orchestrator::{
    CoScientistContext, OrchestratorStats, SessionOrchestrator, SessionOutcome, StageSet,
};
pub use retrieval::{ProviderSet, ResearchDomain, RetrievalOutcome, RetrievalStrategyEngine};
pub use session::{Hypothesis, QualityMetrics, ResearchSession, SessionStatus};
pub use stage::{
    ExecutionHistory, ExecutionStats, GenerationStage, Instrumented, RankingStage,
    ReflectionStage, Stage, Timed,
};
