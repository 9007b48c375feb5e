//! In-process stand-ins for the LLM and literature providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::llm::{CompletionRequest, CompletionResponse, LLMClient, Provider};
use crate::literature::{
    LiteratureProvider, Paper, PerplexityClient, ProviderConfig, PubMedClient, ScholarClient,
    SourceKind,
};

struct Rule {
    needle: String,
    replies: Vec<Result<String, ProviderError>>,
    hits: usize,
}

/// LLM that answers by prompt substring.
///
/// Rules are checked in insertion order. A rule with several replies
/// returns them in sequence and then repeats the last one. Prompts that
/// match no rule get the default reply, or fail when none is set.
pub struct ScriptedLLM {
    rules: Mutex<Vec<Rule>>,
    default_reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLLM {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            default_reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails.
    pub fn failing() -> Self {
        Self::new()
    }

    pub fn with_default(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = Some(reply.into());
        self
    }

    pub fn respond_to(self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.respond_seq(needle, vec![reply.into()])
    }

    pub fn respond_seq(self, needle: impl Into<String>, replies: Vec<String>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            needle: needle.into(),
            replies: replies.into_iter().map(Ok).collect(),
            hits: 0,
        });
        self
    }

    pub fn fail_on(self, needle: impl Into<String>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            needle: needle.into(),
            replies: vec![Err(ProviderError::api("scripted", 503, "overloaded"))],
            hits: 0,
        });
        self
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of prompts containing `needle`.
    pub fn calls_matching(&self, needle: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .count()
    }
}

#[async_trait]
impl LLMClient for ScriptedLLM {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let prompt = request.prompt_text();
        self.prompts.lock().unwrap().push(prompt.clone());

        let reply = {
            let mut rules = self.rules.lock().unwrap();
            rules.iter_mut().find(|r| prompt.contains(&r.needle)).map(|rule| {
                let idx = rule.hits.min(rule.replies.len() - 1);
                rule.hits += 1;
                rule.replies[idx].clone()
            })
        };

        let text = match reply {
            Some(result) => result?,
            None => match &self.default_reply {
                Some(text) => text.clone(),
                None => return Err(ProviderError::http("scripted", "no scripted reply")),
            },
        };
        Ok(CompletionResponse::text("scripted", text))
    }

    fn provider(&self) -> Provider {
        Provider::Scripted
    }
}

/// Literature provider with a fixed answer.
///
/// Mock results delegate to the production generator for the source.
pub struct StaticProvider {
    source: SourceKind,
    result: Result<Vec<Paper>, ProviderError>,
    mocks: bool,
    calls: AtomicUsize,
}

impl StaticProvider {
    pub fn empty(source: SourceKind) -> Self {
        Self::with_papers(source, Vec::new())
    }

    pub fn with_papers(source: SourceKind, papers: Vec<Paper>) -> Self {
        Self {
            source,
            result: Ok(papers),
            mocks: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(source: SourceKind, error: ProviderError) -> Self {
        Self {
            source,
            result: Err(error),
            mocks: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// Mock results are empty too.
    pub fn without_mocks(mut self) -> Self {
        self.mocks = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiteratureProvider for StaticProvider {
    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<Paper>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result
            .clone()
            .map(|papers| papers.into_iter().take(limit).collect())
    }

    fn source(&self) -> SourceKind {
        self.source
    }

    fn mock_results(&self, query: &str, limit: usize) -> Vec<Paper> {
        if !self.mocks {
            return Vec::new();
        }
        let config = ProviderConfig::default();
        match self.source {
            SourceKind::Perplexity => PerplexityClient::new(config).mock_results(query, limit),
            SourceKind::PubMed => PubMedClient::new(config).mock_results(query, limit),
            SourceKind::Scholar => ScholarClient::new(config).mock_results(query, limit),
        }
    }
}
