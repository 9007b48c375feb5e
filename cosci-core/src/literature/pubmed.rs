//! Literature database search through NCBI E-utilities.
//!
//! Two requests per search: `esearch` (JSON) resolves the query to PMIDs,
//! then `efetch` (XML) returns the full records including abstracts.

use async_trait::async_trait;
use reqwest::{Client, Response};
use roxmltree::{Document, Node, ParsingOptions};
use serde::Deserialize;
use tracing::debug;

use crate::error::ProviderError;
use crate::llm::build_http_client;

use super::{head_word, tail_words, LiteratureProvider, Paper, ProviderConfig, SourceKind};

/// Authors kept per article.
const MAX_AUTHORS: usize = 3;

/// PubMed search via E-utilities.
pub struct PubMedClient {
    config: ProviderConfig,
    http: Client,
}

impl PubMedClient {
    const DEFAULT_BASE_URL: &'static str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
    const TOOL: &'static str = "cosci-core";

    pub fn new(config: ProviderConfig) -> Self {
        let http = build_http_client(config.timeout_secs);
        Self { config, http }
    }

    /// Build from `PUBMED_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(ProviderConfig::from_env("PUBMED"))
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
    }

    fn common_params(&self, retmode: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("retmode", retmode.to_string()),
            ("tool", Self::TOOL.to_string()),
        ];
        if let Some(email) = &self.config.email {
            params.push(("email", email.clone()));
        }
        if self.config.is_configured() {
            params.push(("api_key", self.config.api_key.clone()));
        }
        params
    }

    async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Response, ProviderError> {
        let provider = SourceKind::PubMed.as_str();
        let response = self
            .http
            .get(format!("{}/{}", self.base_url(), endpoint))
            .query(params)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(provider, e, self.config.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::api(provider, status.as_u16(), body));
        }
        Ok(response)
    }

    async fn search_ids(&self, term: &str, retmax: usize) -> Result<Vec<String>, ProviderError> {
        let mut params = self.common_params("json");
        params.push(("term", term.to_string()));
        params.push(("retmax", retmax.to_string()));
        params.push(("sort", "relevance".to_string()));

        let parsed: ESearchEnvelope = self
            .get("esearch.fcgi", &params)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::decode(SourceKind::PubMed.as_str(), e.to_string()))?;
        Ok(parsed.esearchresult.idlist)
    }

    async fn fetch_articles(&self, ids: &[String]) -> Result<Vec<Paper>, ProviderError> {
        let provider = SourceKind::PubMed.as_str();
        let mut params = self.common_params("xml");
        params.push(("id", ids.join(",")));

        let body = self
            .get("efetch.fcgi", &params)
            .await?
            .text()
            .await
            .map_err(|e| ProviderError::decode(provider, e.to_string()))?;
        parse_articles(&body).map_err(|e| ProviderError::decode(provider, e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ESearchEnvelope {
    esearchresult: ESearchResult,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

#[async_trait]
impl LiteratureProvider for PubMedClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Paper>, ProviderError> {
        let provider = self.source().as_str();
        let term = enhance_query(query);

        let mut ids = self.search_ids(&term, limit + 5).await?;
        if ids.is_empty() {
            let broader = broaden_query(query);
            debug!(%term, %broader, "PubMed returned no ids, broadening");
            ids = self.search_ids(&broader, limit + 5).await?;
        }
        if ids.is_empty() {
            return Err(ProviderError::empty(provider));
        }
        ids.truncate(limit);

        let papers = self.fetch_articles(&ids).await?;
        if papers.is_empty() {
            return Err(ProviderError::empty(provider));
        }
        Ok(papers)
    }

    fn source(&self) -> SourceKind {
        SourceKind::PubMed
    }

    fn mock_results(&self, query: &str, limit: usize) -> Vec<Paper> {
        mock_papers(query, limit)
    }
}

/// Add field and date restrictions to a plain-text query.
///
/// Queries that already use boolean syntax pass through unchanged.
pub(crate) fn enhance_query(query: &str) -> String {
    if query.contains(" AND ") || query.contains(" OR ") || query.contains('(') {
        return query.to_string();
    }

    let lower = query.to_lowercase();
    let matches_any = |terms: &[&str]| terms.iter().any(|t| lower.contains(t));
    let related = if matches_any(&["drug", "repurpos", "therapeut", "clinical"]) {
        ["medical research", "clinical studies", "therapeutic approaches"]
    } else if matches_any(&["algorithm", "computation", "software", "machine learning"]) {
        ["computational methods", "algorithms", "machine learning"]
    } else if matches_any(&["physics", "quantum", "theoretical", "experimental"]) {
        ["physics", "theoretical", "experimental"]
    } else {
        ["scientific research", "research methods", "scientific approaches"]
    };

    format!(
        "({}) AND ({}) AND (\"2014\"[Date - Publication] : \"3000\"[Date - Publication])",
        query,
        related.join(" OR ")
    )
}

fn broaden_query(query: &str) -> String {
    let words: Vec<&str> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2 && *w != "AND" && *w != "OR")
        .take(3)
        .collect();
    format!("({}) AND (research OR study OR investigation)", words.join(" OR "))
}

/// Concatenated text of a node, including inline markup children.
fn full_text(node: Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

fn child<'a, 'i>(node: Node<'a, 'i>, tag: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn descendant_text(node: Node, tag: &str) -> Option<String> {
    node.descendants()
        .find(|n| n.has_tag_name(tag))
        .map(full_text)
        .filter(|t| !t.is_empty())
}

fn author_name(author: Node) -> Option<String> {
    let last = child(author, "LastName").map(full_text);
    let fore = child(author, "ForeName").map(full_text);
    match (fore, last) {
        (Some(fore), Some(last)) => Some(format!("{} {}", fore, last)),
        (None, Some(last)) => Some(last),
        _ => child(author, "CollectiveName").map(full_text),
    }
}

/// Map an `efetch` `PubmedArticleSet` document to papers, in document order.
///
/// Multi-part abstracts are joined with a space. DOI links are preferred
/// over PubMed links when present.
pub(crate) fn parse_articles(xml: &str) -> Result<Vec<Paper>, roxmltree::Error> {
    // efetch output carries a DOCTYPE declaration
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(xml, options)?;
    let papers = doc
        .descendants()
        .filter(|n| n.has_tag_name("PubmedArticle"))
        .map(|article| {
            let pmid = descendant_text(article, "PMID").unwrap_or_default();
            let title = descendant_text(article, "ArticleTitle")
                .unwrap_or_else(|| "Unknown Title".to_string());
            let abstract_text = article
                .descendants()
                .filter(|n| n.has_tag_name("AbstractText"))
                .map(full_text)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            let authors: Vec<String> = article
                .descendants()
                .filter(|n| n.has_tag_name("Author"))
                .filter_map(author_name)
                .take(MAX_AUTHORS)
                .collect();
            let journal = article
                .descendants()
                .find(|n| n.has_tag_name("Journal"))
                .and_then(|j| {
                    descendant_text(j, "Title").or_else(|| descendant_text(j, "ISOAbbreviation"))
                })
                .unwrap_or_else(|| "Unknown Journal".to_string());
            let year = article
                .descendants()
                .find(|n| n.has_tag_name("PubDate"))
                .and_then(|d| {
                    descendant_text(d, "Year").or_else(|| {
                        descendant_text(d, "MedlineDate").map(|m| m.chars().take(4).collect())
                    })
                })
                .unwrap_or_else(|| "Unknown".to_string());
            let doi = article
                .descendants()
                .find(|n| n.has_tag_name("ArticleId") && n.attribute("IdType") == Some("doi"))
                .map(full_text)
                .filter(|d| !d.is_empty());

            let url = match (&doi, pmid.is_empty()) {
                (Some(doi), _) => format!("https://doi.org/{}", doi),
                (None, false) => format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid),
                (None, true) => String::new(),
            };
            let mut paper = Paper::new(title, SourceKind::PubMed)
                .with_abstract(abstract_text)
                .with_authors(authors)
                .with_journal(journal)
                .with_year(year)
                .with_url(url)
                .with_relevance(0.8);
            if !pmid.is_empty() {
                paper = paper.with_pmid(pmid);
            }
            paper.doi = doi;
            paper
        })
        .collect();
    Ok(papers)
}

fn mock_paper(
    pmid: &str,
    title: String,
    authors: [&str; 3],
    journal: &str,
    year: &str,
    relevance: f64,
    text: String,
) -> Paper {
    Paper::new(title, SourceKind::PubMed)
        .with_pmid(pmid)
        .with_authors(authors)
        .with_journal(journal)
        .with_year(year)
        .with_abstract(text)
        .with_url(format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid))
        .with_relevance(relevance)
}

fn mock_papers(query: &str, limit: usize) -> Vec<Paper> {
    let head = head_word(query, "scientific");
    let tail = tail_words(query, 2, "scientific");
    let mut papers = vec![
        mock_paper(
            "12345678",
            format!("Research methodologies in {} research: A comprehensive review", head),
            ["Lee, C.", "Wang, X.", "Taylor, P."],
            "Scientific Methods Research",
            "2024",
            0.85,
            format!("This review summarizes current computational and experimental approaches in {}.", query),
        ),
        mock_paper(
            "87654321",
            format!("Systematic analysis of research methodologies in {} applications", tail),
            ["Garcia, L.", "Kim, Y.", "Anderson, B."],
            "Systematic Research Methods",
            "2024",
            0.82,
            format!("A systematic analysis of established approaches for investigating {}.", query),
        ),
        mock_paper(
            "11223344",
            format!("Empirical study of research methodologies for {} investigation", head),
            ["Johnson, M.", "Brown, S.", "Wilson, K."],
            "Scientific Research Journal",
            "2023",
            0.90,
            format!("This empirical study evaluated methodological frameworks for {}.", query),
        ),
        mock_paper(
            "55667788",
            format!("Computational research optimization using artificial intelligence for {}", query),
            ["Patel, R.", "Liu, J.", "Thompson, A."],
            "Nature Scientific Computing",
            "2023",
            0.88,
            format!("An AI platform integrating multi-source data to guide research on {}.", query),
        ),
        mock_paper(
            "99887766",
            format!("Mechanism-based research approach for {}", query),
            ["Adams, D.", "Chen, W.", "Miller, R."],
            "Scientific Research Methods",
            "2023",
            0.84,
            format!("A mechanism-based research strategy for {} built on shared theoretical frameworks.", query),
        ),
    ];
    papers.truncate(limit);
    papers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enhance_plain_query() {
        let q = enhance_query("drug repurposing for ALS");
        assert!(q.starts_with("(drug repurposing for ALS) AND (medical research OR"));
        assert!(q.ends_with("[Date - Publication])"));
    }

    #[test]
    fn test_formatted_query_passes_through() {
        let q = "(tau) AND (aggregation OR seeding)";
        assert_eq!(enhance_query(q), q);
    }

    #[test]
    fn test_broaden_query() {
        assert_eq!(
            broaden_query("tau protein aggregation kinetics"),
            "(tau OR protein OR aggregation) AND (research OR study OR investigation)"
        );
    }

    const EFETCH_FIXTURE: &str = r#"<?xml version="1.0" ?>
<!DOCTYPE PubmedArticleSet PUBLIC "-//NLM//DTD PubMedArticle, 1st January 2024//EN" "https://dtd.nlm.nih.gov/ncbi/pubmed/out/pubmed_240101.dtd">
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE" Owner="NLM">
      <PMID Version="1">111</PMID>
      <Article PubModel="Print">
        <Journal>
          <JournalIssue CitedMedium="Internet">
            <PubDate><Year>2022</Year><Month>Mar</Month></PubDate>
          </JournalIssue>
          <Title>Journal of Neuroscience</Title>
          <ISOAbbreviation>J Neurosci</ISOAbbreviation>
        </Journal>
        <ArticleTitle>Tau seeding in <i>cortical</i> neurons</ArticleTitle>
        <Abstract>
          <AbstractText Label="BACKGROUND">Tau spreads between neurons.</AbstractText>
          <AbstractText Label="RESULTS">Seeding is blocked by <sup>antibody</sup> treatment.</AbstractText>
        </Abstract>
        <AuthorList CompleteYN="Y">
          <Author><LastName>Doe</LastName><ForeName>Jane</ForeName></Author>
          <Author><LastName>Roe</LastName></Author>
          <Author><CollectiveName>Tau Consortium</CollectiveName></Author>
          <Author><LastName>Zoe</LastName><ForeName>Zed</ForeName></Author>
        </AuthorList>
      </Article>
    </MedlineCitation>
    <PubmedData>
      <ArticleIdList>
        <ArticleId IdType="pubmed">111</ArticleId>
        <ArticleId IdType="doi">10.1000/jn.1</ArticleId>
      </ArticleIdList>
    </PubmedData>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">222</PMID>
      <Article>
        <Journal>
          <JournalIssue><PubDate><MedlineDate>2021 Jan-Feb</MedlineDate></PubDate></JournalIssue>
          <ISOAbbreviation>Brain</ISOAbbreviation>
        </Journal>
        <ArticleTitle></ArticleTitle>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parse_efetch_articles() {
        let papers = parse_articles(EFETCH_FIXTURE).unwrap();
        assert_eq!(papers.len(), 2);

        let first = &papers[0];
        assert_eq!(first.pmid.as_deref(), Some("111"));
        assert_eq!(first.title, "Tau seeding in cortical neurons");
        assert_eq!(
            first.abstract_text,
            "Tau spreads between neurons. Seeding is blocked by antibody treatment."
        );
        assert_eq!(first.authors, vec!["Jane Doe", "Roe", "Tau Consortium"]);
        assert_eq!(first.journal, "Journal of Neuroscience");
        assert_eq!(first.year, "2022");
        assert_eq!(first.doi.as_deref(), Some("10.1000/jn.1"));
        assert_eq!(first.url, "https://doi.org/10.1000/jn.1");
        assert_ne!(first.abstract_or_placeholder(), "No abstract available");

        let second = &papers[1];
        assert_eq!(second.title, "Unknown Title");
        assert_eq!(second.journal, "Brain");
        assert_eq!(second.year, "2021");
        assert!(second.abstract_text.is_empty());
        assert_eq!(second.url, "https://pubmed.ncbi.nlm.nih.gov/222/");
    }

    #[test]
    fn test_parse_rejects_malformed_xml() {
        assert!(parse_articles("<PubmedArticleSet><PubmedArticle>").is_err());
        assert!(parse_articles("<PubmedArticleSet/>").unwrap().is_empty());
    }

    #[test]
    fn test_mock_results_have_pmids() {
        let client = PubMedClient::new(ProviderConfig::default());
        let papers = client.mock_results("tau aggregation", 10);
        assert_eq!(papers.len(), 5);
        assert_eq!(papers[0].pmid.as_deref(), Some("12345678"));
        assert!(papers.iter().all(|p| p.url.starts_with("https://pubmed.ncbi.nlm.nih.gov/")));
    }
}
