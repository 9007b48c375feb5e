//! Secondary scholar search through the Serper Google Scholar API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::llm::build_http_client;

use super::{head_word, LiteratureProvider, Paper, ProviderConfig, SourceKind};

/// Serper caps `num` at this value.
const MAX_RESULTS_PER_REQUEST: usize = 20;

/// Google Scholar search via Serper.
pub struct ScholarClient {
    config: ProviderConfig,
    http: Client,
}

impl ScholarClient {
    const DEFAULT_BASE_URL: &'static str = "https://google.serper.dev";

    pub fn new(config: ProviderConfig) -> Self {
        let http = build_http_client(config.timeout_secs);
        Self { config, http }
    }

    /// Build from `SERPER_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(ProviderConfig::from_env("SERPER"))
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
    }
}

#[derive(Debug, Serialize)]
struct ScholarRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Debug, Default, Deserialize)]
struct ScholarResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    title: Option<String>,
    snippet: Option<String>,
    link: Option<String>,
    #[serde(rename = "publicationInfo", alias = "publication_info")]
    publication_info: Option<String>,
    year: Option<serde_json::Value>,
    #[serde(rename = "citedBy")]
    cited_by: Option<u32>,
}

impl OrganicResult {
    fn into_paper(self) -> Paper {
        let mut paper = Paper::new(
            self.title.unwrap_or_else(|| "Unknown Title".to_string()),
            SourceKind::Scholar,
        )
        .with_abstract(self.snippet.unwrap_or_default())
        .with_url(self.link.unwrap_or_default())
        .with_relevance(0.85);

        if let Some(info) = self.publication_info {
            // "A Author, B Author - Journal, 2021 - publisher.com"
            let mut parts = info.split(" - ");
            if let Some(authors) = parts.next() {
                paper.authors = authors
                    .split(',')
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .take(3)
                    .collect();
            }
            if let Some(venue) = parts.next() {
                paper.journal = venue.split(',').next().unwrap_or("").trim().to_string();
            }
        }
        paper.year = match self.year {
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(serde_json::Value::String(s)) => s,
            _ => String::new(),
        };
        paper.citations = self.cited_by;
        paper
    }
}

#[async_trait]
impl LiteratureProvider for ScholarClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Paper>, ProviderError> {
        let provider = self.source().as_str();
        if !self.config.is_configured() {
            return Err(ProviderError::unconfigured(provider));
        }

        let response = self
            .http
            .post(format!("{}/scholar", self.base_url()))
            .header("X-API-KEY", &self.config.api_key)
            .json(&ScholarRequest {
                q: query,
                num: limit.min(MAX_RESULTS_PER_REQUEST),
            })
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(provider, e, self.config.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::api(provider, status.as_u16(), body));
        }

        let body: ScholarResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::decode(provider, e.to_string()))?;

        Ok(body
            .organic
            .into_iter()
            .take(limit)
            .map(OrganicResult::into_paper)
            .collect())
    }

    fn source(&self) -> SourceKind {
        SourceKind::Scholar
    }

    fn mock_results(&self, query: &str, limit: usize) -> Vec<Paper> {
        let paper = Paper::new(
            format!(
                "Comprehensive review of {} methodologies and applications",
                head_word(query, "research")
            ),
            SourceKind::Scholar,
        )
        .with_authors(["Academic, R.", "Scholar, G.", "Research, P."])
        .with_journal("Journal of Advanced Research")
        .with_year("2024")
        .with_abstract(format!(
            "This review examines current methodologies and applications in {} research and \
             proposes future directions based on systematic analysis of the literature.",
            query
        ))
        .with_relevance(0.85)
        .with_citations(42);
        std::iter::once(paper).take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_organic_result_mapping() {
        let json = r#"{"organic":[{"title":"Graph neural networks for chemistry",
            "snippet":"We survey GNNs.","link":"https://arxiv.org/abs/1",
            "publicationInfo":"J Smith, K Lee - Chemical Reviews, 2021 - ACS",
            "year":2021,"citedBy":120}]}"#;
        let parsed: ScholarResponse = serde_json::from_str(json).unwrap();
        let paper = parsed.organic.into_iter().next().unwrap().into_paper();
        assert_eq!(paper.title, "Graph neural networks for chemistry");
        assert_eq!(paper.authors, vec!["J Smith", "K Lee"]);
        assert_eq!(paper.journal, "Chemical Reviews");
        assert_eq!(paper.year, "2021");
        assert_eq!(paper.citations, Some(120));
    }

    #[test]
    fn test_mock_single_paper_respects_zero_limit() {
        let client = ScholarClient::new(ProviderConfig::default());
        assert_eq!(client.mock_results("catalysis", 3).len(), 1);
        assert!(client.mock_results("catalysis", 0).is_empty());
        assert_eq!(
            client.mock_results("catalysis", 1)[0].title,
            "Comprehensive review of catalysis methodologies and applications"
        );
    }
}
