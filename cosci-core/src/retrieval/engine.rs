//! Plan construction and fan-out execution.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::config::RetrievalConfig;
use crate::llm::LLMClient;
use crate::literature::{LiteratureProvider, Paper, SourceKind};

use super::directive::{select_directive, Directive};
use super::domain::{DomainContext, ResearchDomain};
use super::plan::{fallback_plan, iteration_focus, parse_plan, SearchPlan, SearchQuery};
use super::rank::{deduplicate, prioritize};

/// Existing-paper titles shown to the planner.
const EXISTING_TITLES_SHOWN: usize = 5;

/// The three literature sources, one per provider class.
#[derive(Clone)]
pub struct ProviderSet {
    pub academic: Arc<dyn LiteratureProvider>,
    pub database: Arc<dyn LiteratureProvider>,
    pub scholar: Arc<dyn LiteratureProvider>,
}

impl ProviderSet {
    pub fn new(
        academic: Arc<dyn LiteratureProvider>,
        database: Arc<dyn LiteratureProvider>,
        scholar: Arc<dyn LiteratureProvider>,
    ) -> Self {
        Self {
            academic,
            database,
            scholar,
        }
    }

    pub fn get(&self, source: SourceKind) -> &Arc<dyn LiteratureProvider> {
        match source {
            SourceKind::Perplexity => &self.academic,
            SourceKind::PubMed => &self.database,
            SourceKind::Scholar => &self.scholar,
        }
    }
}

/// Result of one provider call inside a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Position in plan order
    pub index: usize,
    pub source: SourceKind,
    pub query: String,
    pub papers: Vec<Paper>,
    /// Mock results were substituted
    pub used_mock: bool,
    pub error: Option<String>,
}

/// Everything retrieval produced for one hypothesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    pub papers: Vec<Paper>,
    pub domain: ResearchDomain,
    pub directive: Directive,
    pub plan: SearchPlan,
    /// Provider calls answered by mock results
    pub mocked_queries: usize,
}

/// Builds diversified search plans and merges their results.
pub struct RetrievalStrategyEngine {
    llm: Arc<dyn LLMClient>,
    providers: ProviderSet,
    config: RetrievalConfig,
}

impl RetrievalStrategyEngine {
    pub fn new(llm: Arc<dyn LLMClient>, providers: ProviderSet, config: RetrievalConfig) -> Self {
        Self {
            llm,
            providers,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    /// Retrieve up to `limit` deduplicated, prioritized papers.
    pub async fn build_and_execute(
        &self,
        goal: &str,
        iteration: u32,
        existing_papers: &[Paper],
        hypothesis_index: usize,
        total_hypotheses: usize,
        limit: usize,
    ) -> Vec<Paper> {
        self.retrieve(
            goal,
            iteration,
            existing_papers,
            hypothesis_index,
            total_hypotheses,
            limit,
        )
        .await
        .papers
    }

    /// [`build_and_execute`](Self::build_and_execute) with the domain,
    /// directive and plan that produced the papers.
    #[instrument(skip(self, goal, existing_papers))]
    pub async fn retrieve(
        &self,
        goal: &str,
        iteration: u32,
        existing_papers: &[Paper],
        hypothesis_index: usize,
        total_hypotheses: usize,
        limit: usize,
    ) -> RetrievalOutcome {
        let domain = self.detect_domain(goal).await;
        let context = domain.context();
        let directive = select_directive(iteration, hypothesis_index, total_hypotheses);

        let plan = self
            .build_plan(goal, iteration, existing_papers, &directive, &context)
            .await;
        info!(
            domain = %domain,
            strategy = ?directive.strategy,
            academic = plan.perplexity_queries.len(),
            database = plan.pubmed_queries.len(),
            scholar = plan.scholar_queries.len(),
            fallback_plan = plan.is_fallback,
            "Built search plan"
        );

        let outcomes = self.execute_plan(&plan).await;
        let mocked_queries = outcomes.iter().filter(|o| o.used_mock).count();
        let merged: Vec<Paper> = outcomes.into_iter().flat_map(|o| o.papers).collect();

        let mut papers = prioritize(deduplicate(merged, self.config.dedup_key_chars));
        papers.truncate(limit);

        RetrievalOutcome {
            papers,
            domain,
            directive,
            plan,
            mocked_queries,
        }
    }

    /// Classify the goal into a research domain. Failure yields `General`.
    pub async fn detect_domain(&self, goal: &str) -> ResearchDomain {
        let names: Vec<&str> = ResearchDomain::ALL.iter().map(|d| d.as_str()).collect();
        let prompt = format!(
            "Determine the scientific domain of this research question.\n\n\
             Question: \"{}\"\n\n\
             Domain options: {}\n\n\
             Respond with just one word.",
            goal,
            names.join(", ")
        );
        match self.llm.generate_text(&prompt, 10, 0.1).await {
            Ok(reply) => ResearchDomain::from_response(&reply),
            Err(e) => {
                warn!(error = %e, "Domain detection failed, using general template");
                ResearchDomain::General
            }
        }
    }

    /// Two-call plan construction with deterministic fallback.
    pub async fn build_plan(
        &self,
        goal: &str,
        iteration: u32,
        existing_papers: &[Paper],
        directive: &Directive,
        context: &DomainContext,
    ) -> SearchPlan {
        let analysis_prompt = format!(
            "You are a literature search expert in {field}. Analyze this research goal and \
             extract the concepts needed to search for supporting literature.\n\n\
             GOAL: {goal}\n\
             ITERATION: {iteration}\n\
             VARIATION: {directive}\n\n\
             Cover core entities ({entities}), secondary concepts, context keywords and \
             relationships between entities.",
            field = context.field,
            goal = goal,
            iteration = iteration,
            directive = directive.text,
            entities = context.core_entities,
        );

        let analysis = match self.llm.generate_text(&analysis_prompt, 1000, 0.3).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Search analysis failed, using fallback plan");
                return fallback_plan(goal, iteration, context);
            }
        };

        let avoid = if existing_papers.is_empty() {
            String::new()
        } else {
            let titles: Vec<String> = existing_papers
                .iter()
                .take(EXISTING_TITLES_SHOWN)
                .map(|p| format!("- {}", p.title))
                .collect();
            format!("\n\nAVOID DUPLICATING THESE EXISTING PAPERS:\n{}", titles.join("\n"))
        };

        let strategy_prompt = format!(
            "Based on the analysis below, create search strategies for {field} research.\n\n\
             ANALYSIS:\n{analysis}\n\n\
             ITERATION: {iteration} (focus: {focus})\n\
             EXISTING PAPERS FOUND: {existing}\n\
             SEARCH VARIATION STRATEGY: {directive}{avoid}\n\n\
             Return a JSON object with keys \"perplexity_queries\" (up to 3, types \
             primary|secondary|discovery), \"pubmed_queries\" (up to 3, types \
             exact|expanded|mechanistic), \"scholar_queries\" (up to 2, types \
             academic|interdisciplinary|recent) and \"concept_map\". Each query is \
             {{\"query\": ..., \"priority\": \"high|medium|low\", \"type\": ..., \"rationale\": ...}}.",
            field = context.field,
            analysis = analysis,
            iteration = iteration,
            focus = iteration_focus(iteration),
            existing = existing_papers.len(),
            directive = directive.text,
            avoid = avoid,
        );

        match self.llm.generate_text(&strategy_prompt, 1500, 0.2).await {
            Ok(reply) => match parse_plan(&reply) {
                Ok(plan) => plan,
                Err(e) => {
                    warn!(error = %e, "Search plan unparseable, using fallback plan");
                    fallback_plan(goal, iteration, context)
                }
            },
            Err(e) => {
                warn!(error = %e, "Search plan request failed, using fallback plan");
                fallback_plan(goal, iteration, context)
            }
        }
    }

    /// Run every capped query concurrently; outcomes come back in plan order.
    pub async fn execute_plan(&self, plan: &SearchPlan) -> Vec<SearchOutcome> {
        let jobs: Vec<(SourceKind, SearchQuery, usize)> =
            [SourceKind::Perplexity, SourceKind::PubMed, SourceKind::Scholar]
                .into_iter()
                .flat_map(|source| {
                    let (max_queries, per_query) = self.config.caps_for(source);
                    plan.queries_for(source)
                        .iter()
                        .take(max_queries)
                        .cloned()
                        .map(move |q| (source, q, per_query))
                })
                .collect();

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_searches.max(1)));
        let tasks = jobs
            .into_iter()
            .enumerate()
            .map(|(index, (source, query, limit))| {
                let provider = Arc::clone(self.providers.get(source));
                let semaphore = Arc::clone(&semaphore);
                async move {
                    let _permit = semaphore.acquire().await.ok();
                    let mut outcome = search_with_mock(provider.as_ref(), &query.query, limit).await;
                    outcome.index = index;
                    outcome.papers = outcome
                        .papers
                        .into_iter()
                        .map(|p| p.with_search_context(&query.query_type, query.priority, &query.query))
                        .collect();
                    outcome
                }
            });

        let mut outcomes = join_all(tasks).await;
        outcomes.sort_by_key(|o| o.index);
        outcomes
    }

    /// Query the academic and database providers concurrently and combine.
    ///
    /// Used when strategic retrieval produced nothing.
    pub async fn simple_search(&self, goal: &str, limit: usize) -> Vec<Paper> {
        let (academic, database) = futures::join!(
            search_with_mock(self.providers.academic.as_ref(), goal, limit),
            search_with_mock(self.providers.database.as_ref(), goal, limit),
        );
        let mut papers = academic.papers;
        papers.extend(database.papers);
        papers
    }
}

/// Call a provider, substituting its mock set on error or empty results.
async fn search_with_mock(provider: &dyn LiteratureProvider, query: &str, limit: usize) -> SearchOutcome {
    let source = provider.source();
    let (papers, used_mock, error) = match provider.search(query, limit).await {
        Ok(papers) if !papers.is_empty() => {
            debug!(%source, query, count = papers.len(), "Provider returned results");
            (papers.into_iter().take(limit).collect(), false, None)
        }
        Ok(_) => {
            warn!(%source, query, "Provider returned nothing, using mock results");
            (provider.mock_results(query, limit), true, None)
        }
        Err(e) => {
            warn!(%source, query, error = %e, "Provider failed, using mock results");
            (provider.mock_results(query, limit), true, Some(e.to_string()))
        }
    };
    SearchOutcome {
        index: 0,
        source,
        query: query.to_string(),
        papers,
        used_mock,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::retrieval::{DiversificationStrategy, Priority};
    use crate::testing::{ScriptedLLM, StaticProvider};

    fn engine_with(llm: ScriptedLLM, providers: ProviderSet) -> RetrievalStrategyEngine {
        RetrievalStrategyEngine::new(Arc::new(llm), providers, RetrievalConfig::default())
    }

    fn empty_providers() -> (Arc<StaticProvider>, Arc<StaticProvider>, Arc<StaticProvider>) {
        (
            Arc::new(StaticProvider::empty(SourceKind::Perplexity)),
            Arc::new(StaticProvider::empty(SourceKind::PubMed)),
            Arc::new(StaticProvider::empty(SourceKind::Scholar)),
        )
    }

    const PLAN_JSON: &str = r#"{
        "perplexity_queries": [
            {"query": "a1", "priority": "high", "type": "primary"},
            {"query": "a2", "priority": "medium", "type": "secondary"},
            {"query": "a3", "priority": "low", "type": "discovery"},
            {"query": "a4", "priority": "low", "type": "discovery"}
        ],
        "pubmed_queries": [{"query": "d1", "priority": "high", "type": "exact"}],
        "scholar_queries": [
            {"query": "s1", "priority": "medium", "type": "academic"},
            {"query": "s2", "priority": "medium", "type": "recent"},
            {"query": "s3", "priority": "medium", "type": "recent"}
        ]
    }"#;

    #[tokio::test]
    async fn test_empty_providers_fall_back_to_mocks_within_limit() {
        let (a, d, s) = empty_providers();
        let engine = engine_with(
            ScriptedLLM::failing(),
            ProviderSet::new(a.clone(), d.clone(), s.clone()),
        );

        let papers = engine
            .build_and_execute("tau protein aggregation", 1, &[], 0, 1, 7)
            .await;

        assert_eq!(papers.len(), 7);
        assert!(papers.iter().all(|p| p.search_type.is_some()));
        assert!(papers
            .iter()
            .all(|p| p.search_type.as_deref().unwrap().starts_with(p.source.as_str())));
        // Fallback plan: 2 academic, 2 database, 1 scholar
        assert_eq!(a.calls(), 2);
        assert_eq!(d.calls(), 2);
        assert_eq!(s.calls(), 1);
    }

    #[tokio::test]
    async fn test_query_caps_applied_per_provider() {
        let (a, d, s) = empty_providers();
        let llm = ScriptedLLM::new()
            .respond_to("one word", "biology")
            .respond_to("Analyze this research goal", "analysis")
            .respond_to("Return a JSON object", PLAN_JSON);
        let engine = engine_with(llm, ProviderSet::new(a.clone(), d.clone(), s.clone()));

        let outcome = engine.retrieve("goal", 1, &[], 0, 1, 100).await;

        assert_eq!(outcome.domain, ResearchDomain::Biology);
        assert!(!outcome.plan.is_fallback);
        assert_eq!(a.calls(), 3);
        assert_eq!(d.calls(), 1);
        assert_eq!(s.calls(), 2);
        assert_eq!(outcome.mocked_queries, 6);
    }

    #[tokio::test]
    async fn test_failure_is_provider_local() {
        let academic = Arc::new(StaticProvider::failing(
            SourceKind::Perplexity,
            ProviderError::http("perplexity", "connection refused"),
        ));
        let real = Paper::new("Real database paper", SourceKind::PubMed);
        let database = Arc::new(StaticProvider::with_papers(SourceKind::PubMed, vec![real]));
        let scholar = Arc::new(StaticProvider::empty(SourceKind::Scholar));
        let engine = engine_with(
            ScriptedLLM::failing(),
            ProviderSet::new(academic, database, scholar),
        );

        let plan = fallback_plan("goal text", 1, &DomainContext::general());
        let outcomes = engine.execute_plan(&plan).await;

        assert_eq!(outcomes.len(), 5);
        assert!(outcomes[0].used_mock);
        assert!(outcomes[0].error.as_deref().unwrap().contains("connection refused"));
        assert!(!outcomes[2].used_mock);
        assert_eq!(outcomes[2].papers[0].title, "Real database paper");
        assert_eq!(outcomes[2].papers[0].search_type.as_deref(), Some("pubmed_exact"));
        assert_eq!(outcomes[2].papers[0].search_priority, Some(Priority::High));
        assert!(outcomes.windows(2).all(|w| w[0].index < w[1].index));
    }

    #[tokio::test]
    async fn test_results_are_prioritized() {
        let (a, d, s) = empty_providers();
        let engine = engine_with(ScriptedLLM::failing(), ProviderSet::new(a, d, s));

        let papers = engine.build_and_execute("graph neural networks", 1, &[], 0, 1, 15).await;

        let scores: Vec<f64> = papers.iter().map(crate::retrieval::priority_score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(papers[0].search_type.as_deref(), Some("perplexity_primary"));
    }

    #[tokio::test]
    async fn test_directive_follows_global_index() {
        let (a, d, s) = empty_providers();
        let engine = engine_with(ScriptedLLM::failing(), ProviderSet::new(a, d, s));

        let outcome = engine.retrieve("goal", 2, &[], 1, 3, 5).await;
        assert_eq!(outcome.directive.global_index, 4);
        assert_eq!(outcome.directive.strategy, DiversificationStrategy::CriticalPerspective);
    }

    #[tokio::test]
    async fn test_simple_search_combines_two_sources() {
        let (a, d, s) = empty_providers();
        let engine = engine_with(ScriptedLLM::failing(), ProviderSet::new(a.clone(), d.clone(), s.clone()));

        let papers = engine.simple_search("enzyme kinetics", 10).await;
        assert_eq!(papers.len(), 10);
        assert_eq!(a.calls(), 1);
        assert_eq!(d.calls(), 1);
        assert_eq!(s.calls(), 0);
    }
}
