//! Configuration for the research pipeline.
//!
//! Every struct has sensible defaults, `with_*` builders, and a `from_env`
//! constructor that falls back to the default for unset or unparseable
//! variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::llm::ClientConfig;
use crate::literature::ProviderConfig;
use crate::retrieval::DEFAULT_DEDUP_KEY_CHARS;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Session loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Iterations used by `start_session_default`
    pub max_iterations: u32,
    /// Hypotheses per iteration used by `start_session_default`
    pub hypotheses_per_iteration: u32,
    /// Upper bound accepted by `start_session`
    pub max_iterations_cap: u32,
    /// Upper bound accepted by `start_session`
    pub max_hypotheses_per_iteration_cap: u32,
    /// Pause between iterations, bounding burst load on providers
    pub inter_iteration_pause_ms: u64,
    /// Per-call stage time limits; expiry faults the session, 0 disables
    pub generation_timeout_secs: u64,
    pub reflection_timeout_secs: u64,
    pub ranking_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            hypotheses_per_iteration: 1,
            max_iterations_cap: 10,
            max_hypotheses_per_iteration_cap: 5,
            inter_iteration_pause_ms: 2000,
            generation_timeout_secs: 300,
            reflection_timeout_secs: 180,
            ranking_timeout_secs: 120,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_iterations: env_or("MAX_ITERATIONS", d.max_iterations),
            hypotheses_per_iteration: env_or("HYPOTHESES_PER_ITERATION", d.hypotheses_per_iteration),
            max_iterations_cap: env_or("MAX_ITERATIONS_CAP", d.max_iterations_cap),
            max_hypotheses_per_iteration_cap: env_or(
                "MAX_HYPOTHESES_PER_ITERATION_CAP",
                d.max_hypotheses_per_iteration_cap,
            ),
            inter_iteration_pause_ms: env_or("INTER_ITERATION_PAUSE_MS", d.inter_iteration_pause_ms),
            generation_timeout_secs: env_or("GENERATION_TIMEOUT", d.generation_timeout_secs),
            reflection_timeout_secs: env_or("REFLECTION_TIMEOUT", d.reflection_timeout_secs),
            ranking_timeout_secs: env_or("RANKING_TIMEOUT", d.ranking_timeout_secs),
        }
    }

    pub fn with_max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_hypotheses_per_iteration(mut self, n: u32) -> Self {
        self.hypotheses_per_iteration = n;
        self
    }

    pub fn with_inter_iteration_pause_ms(mut self, ms: u64) -> Self {
        self.inter_iteration_pause_ms = ms;
        self
    }

    pub fn with_stage_timeouts(mut self, generation: u64, reflection: u64, ranking: u64) -> Self {
        self.generation_timeout_secs = generation;
        self.reflection_timeout_secs = reflection;
        self.ranking_timeout_secs = ranking;
        self
    }

    /// Time limit for one call of the named stage, `None` when disabled or
    /// the stage is unknown.
    pub fn stage_timeout(&self, stage: &str) -> Option<Duration> {
        let secs = match stage {
            crate::stage::GENERATION => self.generation_timeout_secs,
            crate::stage::REFLECTION => self.reflection_timeout_secs,
            crate::stage::RANKING => self.ranking_timeout_secs,
            _ => 0,
        };
        (secs > 0).then(|| Duration::from_secs(secs))
    }
}

/// Retrieval fan-out and merge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub academic_max_queries: usize,
    pub academic_results_per_query: usize,
    pub database_max_queries: usize,
    pub database_results_per_query: usize,
    pub scholar_max_queries: usize,
    pub scholar_results_per_query: usize,
    /// Papers requested per generation call
    pub generation_paper_limit: usize,
    /// Papers summarized in the synthesis prompt and attached to the hypothesis
    pub prompt_paper_count: usize,
    /// Title characters compared when deduplicating
    pub dedup_key_chars: usize,
    /// Concurrent provider calls per plan
    pub max_parallel_searches: usize,
    /// Per-provider limit for the simple two-source search
    pub fallback_search_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            academic_max_queries: 3,
            academic_results_per_query: 5,
            database_max_queries: 3,
            database_results_per_query: 5,
            scholar_max_queries: 2,
            scholar_results_per_query: 3,
            generation_paper_limit: 15,
            prompt_paper_count: 8,
            dedup_key_chars: DEFAULT_DEDUP_KEY_CHARS,
            max_parallel_searches: 8,
            fallback_search_limit: 10,
        }
    }
}

impl RetrievalConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            generation_paper_limit: env_or("RETRIEVAL_PAPER_LIMIT", d.generation_paper_limit),
            dedup_key_chars: env_or("RETRIEVAL_DEDUP_KEY_CHARS", d.dedup_key_chars),
            max_parallel_searches: env_or("RETRIEVAL_MAX_PARALLEL", d.max_parallel_searches),
            ..d
        }
    }

    /// `(max queries, results per query)` for a provider.
    pub fn caps_for(&self, source: crate::literature::SourceKind) -> (usize, usize) {
        use crate::literature::SourceKind;
        match source {
            SourceKind::Perplexity => (self.academic_max_queries, self.academic_results_per_query),
            SourceKind::PubMed => (self.database_max_queries, self.database_results_per_query),
            SourceKind::Scholar => (self.scholar_max_queries, self.scholar_results_per_query),
        }
    }

    pub fn with_dedup_key_chars(mut self, n: usize) -> Self {
        self.dedup_key_chars = n;
        self
    }

    pub fn with_max_parallel_searches(mut self, n: usize) -> Self {
        self.max_parallel_searches = n.max(1);
        self
    }
}

/// Tournament point policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    pub win_points: f64,
    /// Awarded to each side of a tie
    pub tie_points: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            win_points: 1.0,
            tie_points: 0.5,
        }
    }
}

impl RankingConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            win_points: env_or("RANKING_WIN_POINTS", d.win_points),
            tie_points: env_or("RANKING_TIE_POINTS", d.tie_points),
        }
    }
}

/// Everything needed to assemble a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoScientistConfig {
    pub orchestrator: OrchestratorConfig,
    pub retrieval: RetrievalConfig,
    pub ranking: RankingConfig,
    pub llm: ClientConfig,
    pub perplexity: ProviderConfig,
    pub pubmed: ProviderConfig,
    pub serper: ProviderConfig,
}

impl Default for CoScientistConfig {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            retrieval: RetrievalConfig::default(),
            ranking: RankingConfig::default(),
            llm: ClientConfig::new(""),
            perplexity: ProviderConfig::new(""),
            pubmed: ProviderConfig::new(""),
            serper: ProviderConfig::new(""),
        }
    }
}

impl CoScientistConfig {
    pub fn from_env() -> Self {
        Self {
            orchestrator: OrchestratorConfig::from_env(),
            retrieval: RetrievalConfig::from_env(),
            ranking: RankingConfig::from_env(),
            llm: ClientConfig::from_env(),
            perplexity: ProviderConfig::from_env("PERPLEXITY"),
            pubmed: ProviderConfig::from_env("PUBMED"),
            serper: ProviderConfig::from_env("SERPER"),
        }
    }
}
