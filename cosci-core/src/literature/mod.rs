//! Literature search providers.
//!
//! Three provider classes feed retrieval:
//!
//! | Source | Class | Client |
//! |--------|-------|--------|
//! | `perplexity` | primary academic search | [`PerplexityClient`] |
//! | `pubmed` | literature database | [`PubMedClient`] |
//! | `scholar` | secondary scholar search | [`ScholarClient`] |
//!
//! Every provider owns a deterministic mock generator
//! ([`LiteratureProvider::mock_results`]) that retrieval substitutes when the
//! provider errors or returns nothing.

mod perplexity;
mod pubmed;
mod scholar;

pub use perplexity::PerplexityClient;
pub use pubmed::PubMedClient;
pub use scholar::ScholarClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::retrieval::Priority;

/// Provider a paper came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Primary academic search
    Perplexity,
    /// Literature database
    #[serde(rename = "pubmed")]
    PubMed,
    /// Secondary scholar search
    Scholar,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Perplexity => "perplexity",
            Self::PubMed => "pubmed",
            Self::Scholar => "scholar",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retrieved paper.
///
/// Immutable once retrieved apart from the retrieval-context tags, which
/// the engine sets before merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub title: String,
    #[serde(rename = "abstract", alias = "summary", default)]
    pub abstract_text: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub journal: String,
    #[serde(default)]
    pub year: String,
    pub source: SourceKind,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub relevance_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<u32>,
    /// `{source}_{query type}`, e.g. `pubmed_exact`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
}

impl Paper {
    pub fn new(title: impl Into<String>, source: SourceKind) -> Self {
        Self {
            title: title.into(),
            abstract_text: String::new(),
            authors: Vec::new(),
            journal: String::new(),
            year: String::new(),
            source,
            url: String::new(),
            relevance_score: 0.0,
            pmid: None,
            doi: None,
            citations: None,
            search_type: None,
            search_priority: None,
            search_query: None,
        }
    }

    pub fn with_abstract(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = text.into();
        self
    }

    pub fn with_authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_journal(mut self, journal: impl Into<String>) -> Self {
        self.journal = journal.into();
        self
    }

    pub fn with_year(mut self, year: impl Into<String>) -> Self {
        self.year = year.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_relevance(mut self, score: f64) -> Self {
        self.relevance_score = score;
        self
    }

    pub fn with_pmid(mut self, pmid: impl Into<String>) -> Self {
        self.pmid = Some(pmid.into());
        self
    }

    pub fn with_citations(mut self, citations: u32) -> Self {
        self.citations = Some(citations);
        self
    }

    /// Tag with the query that retrieved this paper.
    pub fn with_search_context(
        mut self,
        query_type: &str,
        priority: Priority,
        query: impl Into<String>,
    ) -> Self {
        self.search_type = Some(format!("{}_{}", self.source, query_type));
        self.search_priority = Some(priority);
        self.search_query = Some(query.into());
        self
    }

    /// Abstract, or a placeholder when none was retrieved.
    pub fn abstract_or_placeholder(&self) -> &str {
        if self.abstract_text.trim().is_empty() {
            "No abstract available"
        } else {
            &self.abstract_text
        }
    }
}

/// One literature source.
#[async_trait]
pub trait LiteratureProvider: Send + Sync {
    /// Search for up to `limit` papers.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Paper>, ProviderError>;

    /// Which source this provider represents.
    fn source(&self) -> SourceKind;

    /// Deterministic stand-in results, truncated to `limit`.
    fn mock_results(&self, query: &str, limit: usize) -> Vec<Paper>;
}

/// Connection settings shared by the literature clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key; empty means unconfigured
    pub api_key: String,
    /// Base URL override
    pub base_url: Option<String>,
    /// Contact email sent with database requests
    pub email: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new("")
    }
}

impl ProviderConfig {
    const DEFAULT_TIMEOUT_SECS: u64 = 30;

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            email: None,
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Read `{prefix}_API_KEY`, `{prefix}_BASE_URL` and `{prefix}_EMAIL`.
    pub fn from_env(prefix: &str) -> Self {
        let mut config = Self::new(std::env::var(format!("{}_API_KEY", prefix)).unwrap_or_default());
        config.base_url = std::env::var(format!("{}_BASE_URL", prefix)).ok();
        config.email = std::env::var(format!("{}_EMAIL", prefix)).ok();
        config.timeout_secs = std::env::var("LITERATURE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.timeout_secs);
        config
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Last `n` words of `query`, or `default` for single-word queries.
pub(crate) fn tail_words<'a>(query: &'a str, n: usize, default: &'a str) -> String {
    let words: Vec<&str> = query.split_whitespace().collect();
    if words.len() > 1 {
        words[words.len().saturating_sub(n)..].join(" ")
    } else {
        default.to_string()
    }
}

/// First word of `query`, or `default` when empty.
pub(crate) fn head_word<'a>(query: &'a str, default: &'a str) -> &'a str {
    query.split_whitespace().next().unwrap_or(default)
}
