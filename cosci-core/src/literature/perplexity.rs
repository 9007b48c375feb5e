//! Primary academic search through the Perplexity chat API.
//!
//! Perplexity answers in prose, so results are scraped from a numbered
//! list: each numbered (or bold) line opens a paper, following lines fill
//! in authors, journal, year, abstract and URL.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;
use crate::llm::build_http_client;

use super::{tail_words, LiteratureProvider, Paper, ProviderConfig, SourceKind};

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s)\]>]+").expect("Invalid regex"));

static NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})\.\s*(.*)$").expect("Invalid regex"));

/// Hosts that indicate a scholarly link rather than a generic web page.
const PAPER_HOSTS: &[&str] = &[
    "doi.org",
    "pubmed.ncbi.nlm.nih.gov",
    "arxiv.org",
    "scholar.google.com",
    "nature.com",
    "science.org",
    "cell.com",
    "springer.com",
    "wiley.com",
    "elsevier.com",
    "cambridge.org",
    "pnas.org",
    "frontiersin.org",
    "mdpi.com",
    "plos.org",
    "acs.org",
];

/// Parsed replies with fewer papers than this are treated as failures.
const MIN_PARSED_RESULTS: usize = 3;

/// Perplexity-backed academic search.
pub struct PerplexityClient {
    config: ProviderConfig,
    http: Client,
}

impl PerplexityClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.perplexity.ai";
    const MODEL: &'static str = "llama-3.1-sonar-small-128k-online";

    pub fn new(config: ProviderConfig) -> Self {
        let http = build_http_client(config.timeout_secs);
        Self { config, http }
    }

    /// Build from `PERPLEXITY_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(ProviderConfig::from_env("PERPLEXITY"))
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[async_trait]
impl LiteratureProvider for PerplexityClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Paper>, ProviderError> {
        let provider = self.source().as_str();
        if !self.config.is_configured() {
            return Err(ProviderError::unconfigured(provider));
        }

        let request = ChatRequest {
            model: Self::MODEL,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: "You are a research librarian. List recent peer-reviewed papers with \
                              title, authors, journal, year, a short summary and the URL or DOI."
                        .to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!(
                        "Find 10-15 recent peer-reviewed research papers related to: {}. \
                         Number each paper and include its full URL.",
                        query
                    ),
                },
            ],
            max_tokens: 3000,
            temperature: 0.1,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url()))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(provider, e, self.config.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::api(provider, status.as_u16(), body));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::decode(provider, e.to_string()))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        let mut papers = parse_paper_list(&content);
        debug!(query, parsed = papers.len(), "Parsed Perplexity reply");
        if papers.len() < MIN_PARSED_RESULTS {
            return Err(ProviderError::empty(provider));
        }
        papers.truncate(limit);
        Ok(papers)
    }

    fn source(&self) -> SourceKind {
        SourceKind::Perplexity
    }

    fn mock_results(&self, query: &str, limit: usize) -> Vec<Paper> {
        mock_papers(query, limit)
    }
}

fn is_paper_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    PAPER_HOSTS.iter().any(|host| lower.contains(host))
}

/// Value after the first `:` on a line.
fn field_value(line: &str) -> Option<&str> {
    line.split_once(':').map(|(_, v)| v.trim())
}

/// Extract papers from a numbered-list reply.
pub(crate) fn parse_paper_list(content: &str) -> Vec<Paper> {
    let mut papers: Vec<Paper> = Vec::new();
    let mut current: Option<Paper> = None;

    for raw in content.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let numbered = NUMBERED_LINE.captures(line);
        let bold_title = line.starts_with("**") && (line.contains('.') || line.contains("Title:"));

        if numbered.is_some() || bold_title {
            if let Some(paper) = current.take() {
                papers.push(paper);
            }
            let title_text = numbered
                .and_then(|caps| caps.get(2).map(|m| m.as_str()))
                .unwrap_or(line);
            let title = title_text.replace("**", "").replace("Title:", "");
            let title = URL_PATTERN.replace_all(&title, "").trim().to_string();
            let mut paper = Paper::new(title, SourceKind::Perplexity)
                .with_year("2024")
                .with_relevance(0.9);
            if let Some(url) = URL_PATTERN.find(line).map(|m| m.as_str()).filter(|u| is_paper_url(u)) {
                paper.url = url.to_string();
            }
            current = Some(paper);
            continue;
        }

        let Some(paper) = current.as_mut() else {
            continue;
        };

        if paper.url.is_empty() {
            if let Some(url) = URL_PATTERN
                .find_iter(line)
                .map(|m| m.as_str())
                .find(|u| is_paper_url(u))
            {
                paper.url = url.to_string();
            }
        }

        let lower = line.to_lowercase();
        if lower.contains("author") && line.contains(':') {
            if let Some(value) = field_value(line) {
                paper.authors = value.split(',').take(3).map(|a| a.trim().to_string()).collect();
            }
        } else if lower.contains("journal") && line.contains(':') {
            if let Some(value) = field_value(line) {
                paper.journal = value.to_string();
            }
        } else if lower.contains("year") && line.contains(':') {
            if let Some(value) = field_value(line).filter(|v| v.chars().all(|c| c.is_ascii_digit())) {
                paper.year = value.to_string();
            }
        } else if (lower.contains("abstract") || lower.contains("summary")) && line.contains(':') {
            if let Some(value) = field_value(line) {
                paper.abstract_text = value.to_string();
            }
        } else if line.len() > 50 && paper.abstract_text.is_empty() {
            paper.abstract_text = line.to_string();
        }
    }

    if let Some(paper) = current {
        papers.push(paper);
    }
    papers.retain(|p| !p.title.is_empty());
    papers.truncate(15);
    papers
}

fn mock_papers(query: &str, limit: usize) -> Vec<Paper> {
    let tail = tail_words(query, 2, "scientific");
    let mut papers = vec![
        Paper::new(
            format!("Advanced computational methods for {} research", query),
            SourceKind::Perplexity,
        )
        .with_authors(["Smith, J.", "Johnson, A.", "Brown, K."])
        .with_journal("Nature Scientific Research")
        .with_year("2024")
        .with_abstract(format!(
            "This study explores innovative computational methods and theoretical frameworks \
             relevant to {}. Using systematic analytical approaches, we identified several \
             promising research directions with novel conceptual foundations.",
            query
        ))
        .with_relevance(0.95),
        Paper::new(
            format!(
                "Computational analysis of research methodologies for {} applications",
                tail
            ),
            SourceKind::Perplexity,
        )
        .with_authors(["Wilson, M.", "Davis, R.", "Miller, S."])
        .with_journal("Journal of Computational Methods")
        .with_year("2024")
        .with_abstract(format!(
            "We present a computational analysis approach to identify effective methodologies \
             for research applications in {}.",
            query
        ))
        .with_relevance(0.92),
        Paper::new(
            format!("Machine learning-based research optimization for {}", query),
            SourceKind::Perplexity,
        )
        .with_authors(["Chen, L.", "Rodriguez, P.", "Kim, Y."])
        .with_journal("Scientific Computing")
        .with_year("2023")
        .with_abstract(format!(
            "This work applies deep learning models to systematic research optimization in {}.",
            query
        ))
        .with_relevance(0.90),
        Paper::new(
            format!("Research evidence for methodological approaches in {}", query),
            SourceKind::Perplexity,
        )
        .with_authors(["Thompson, R.", "Lee, H.", "Martinez, C."])
        .with_journal("Clinical Medicine Reviews")
        .with_year("2023")
        .with_abstract(format!(
            "A systematic review of 45 studies investigating methodological approaches for {}.",
            query
        ))
        .with_relevance(0.88),
        Paper::new(
            format!("Network analysis approach to research optimization in {}", query),
            SourceKind::Perplexity,
        )
        .with_authors(["Zhang, X.", "Anderson, B.", "White, D."])
        .with_journal("Systems Research Methods")
        .with_year("2023")
        .with_abstract(format!(
            "We applied network analysis principles to identify research optimization \
             opportunities for {}.",
            query
        ))
        .with_relevance(0.86),
    ];
    papers.truncate(limit);
    papers
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = "Here are some papers:\n\
        1. **CRISPR delivery with lipid nanoparticles**\n\
        Authors: Doe J, Roe R, Poe P, Extra E\n\
        Journal: Nature Biotechnology\n\
        Year: 2023\n\
        Summary: Lipid nanoparticles improve in vivo editing efficiency.\n\
        URL: https://doi.org/10.1038/nbt.0001\n\
        2. Base editing in primary T cells\n\
        This paper describes a base editing workflow for primary human T cells with high yield.\n\
        https://www.nature.com/articles/s41587\n\
        3. Prime editing review https://example.com/blog\n";

    #[test]
    fn test_parse_numbered_reply() {
        let papers = parse_paper_list(REPLY);
        assert_eq!(papers.len(), 3);

        assert_eq!(papers[0].title, "CRISPR delivery with lipid nanoparticles");
        assert_eq!(papers[0].authors, vec!["Doe J", "Roe R", "Poe P"]);
        assert_eq!(papers[0].journal, "Nature Biotechnology");
        assert_eq!(papers[0].year, "2023");
        assert_eq!(papers[0].url, "https://doi.org/10.1038/nbt.0001");

        assert!(papers[1].abstract_text.starts_with("This paper describes"));
        assert_eq!(papers[1].url, "https://www.nature.com/articles/s41587");

        assert_eq!(papers[2].title, "Prime editing review");
        assert!(papers[2].url.is_empty());
    }

    #[test]
    fn test_mock_results_truncate_to_limit() {
        let client = PerplexityClient::new(ProviderConfig::default());
        let papers = client.mock_results("protein folding", 3);
        assert_eq!(papers.len(), 3);
        assert!(papers.iter().all(|p| p.source == SourceKind::Perplexity));
        assert_eq!(
            papers[1].title,
            "Computational analysis of research methodologies for protein folding applications"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_search_errors() {
        let client = PerplexityClient::new(ProviderConfig::default());
        let err = client.search("anything", 5).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unconfigured { .. }));
    }
}
