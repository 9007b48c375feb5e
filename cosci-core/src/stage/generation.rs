//! Hypothesis generation grounded in retrieved literature.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::{Error, Result};
use crate::llm::LLMClient;
use crate::literature::{Paper, SourceKind};
use crate::retrieval::{deduplicate, DomainContext, ResearchDomain, RetrievalStrategyEngine};
use crate::session::Hypothesis;

use super::{Measured, Stage, GENERATION};

/// Last line of every fallback hypothesis.
pub const FALLBACK_MARKER: &str =
    "Note: This is a fallback hypothesis generated due to API limitations.";

/// Replies shorter than this are treated as failures.
const MIN_HYPOTHESIS_CHARS: usize = 100;
const ABSTRACT_PREVIEW_CHARS: usize = 200;
/// Earlier hypotheses shown to the model to discourage repeats.
const PREVIOUS_SHOWN: usize = 3;

const MAX_TOKENS: u32 = 2000;
const TEMPERATURE: f64 = 0.7;

/// Request to generate one hypothesis.
#[derive(Debug, Clone)]
pub struct GenerationInput {
    pub goal: String,
    pub iteration: u32,
    /// Zero-based position within the iteration
    pub hypothesis_index: usize,
    pub total_hypotheses: usize,
    /// Hypotheses already produced in this session
    pub existing: Vec<Hypothesis>,
}

impl GenerationInput {
    pub fn new(goal: impl Into<String>, iteration: u32) -> Self {
        Self {
            goal: goal.into(),
            iteration,
            hypothesis_index: 0,
            total_hypotheses: 1,
            existing: Vec::new(),
        }
    }

    pub fn with_position(mut self, hypothesis_index: usize, total_hypotheses: usize) -> Self {
        self.hypothesis_index = hypothesis_index;
        self.total_hypotheses = total_hypotheses;
        self
    }

    pub fn with_existing(mut self, existing: Vec<Hypothesis>) -> Self {
        self.existing = existing;
        self
    }
}

impl Measured for GenerationInput {
    fn size_hint(&self) -> usize {
        self.goal.len() + self.existing.iter().map(|h| h.content.len()).sum::<usize>()
    }
}

/// A generated hypothesis and the literature shown to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub hypothesis_content: String,
    pub literature_used: Vec<Paper>,
    /// Content came from the fallback template
    pub is_fallback: bool,
    pub domain: ResearchDomain,
}

impl Measured for GenerationOutput {
    fn size_hint(&self) -> usize {
        self.hypothesis_content.len()
    }
}

/// Templated hypothesis used when the model is unavailable.
pub fn fallback_hypothesis(goal: &str) -> String {
    format!(
        "Hypothesis: Novel approach to {goal}\n\n\
         Approach: Systematic investigation using established scientific methodologies\n\
         Target: Core challenges related to {goal}\n\
         Mechanism: Evidence-based theoretical framework from current literature\n\
         Rationale: This represents a novel application based on emerging research trends \
         and addresses gaps in current understanding\n\
         Experimental Design: Structured investigation with appropriate controls and \
         validation methods\n\n\
         {FALLBACK_MARKER}"
    )
}

fn placeholder_paper(goal: &str) -> Paper {
    Paper::new(format!("Mock Paper: Research Approaches to {goal}"), SourceKind::Perplexity)
        .with_abstract(format!(
            "This paper discusses various methodological approaches and theoretical \
             frameworks relevant to {goal}..."
        ))
        .with_relevance(0.8)
}

fn literature_line(paper: &Paper) -> String {
    let text = paper.abstract_or_placeholder();
    let preview = if text.chars().count() > ABSTRACT_PREVIEW_CHARS {
        format!("{}...", text.chars().take(ABSTRACT_PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    };
    let context = match &paper.search_type {
        Some(search_type) => format!("[{}/{}]", paper.source.as_str().to_uppercase(), search_type),
        None => format!("[{}]", paper.source.as_str().to_uppercase()),
    };
    format!("- {} {}: {}", context, paper.title, preview)
}

fn build_prompt(goal: &str, papers: &[Paper], existing: &[Hypothesis], context: &DomainContext) -> String {
    let literature: Vec<String> = papers.iter().map(literature_line).collect();
    let previous: Vec<String> = existing
        .iter()
        .skip(existing.len().saturating_sub(PREVIOUS_SHOWN))
        .map(|h| format!("- {}", h.content))
        .collect();
    let [approach, target, mechanism, rationale, design] = context.hypothesis_elements;

    format!(
        "You are a {role}. Based on the research goal and literature, generate a novel {description}.\n\n\
         Research Goal: {goal}\n\n\
         Recent Literature (with search context):\n{literature}\n\n\
         Previous Hypotheses (to avoid duplication):\n{previous}\n\n\
         Generate a specific, testable hypothesis including:\n\
         1. {approach} (specific approach or method)\n\
         2. {target} (specific target or problem)\n\
         3. {mechanism} (underlying mechanism or theory)\n\
         4. {rationale} (why this is novel and promising - 3-4 sentences)\n\
         5. {design} (specific experimental or validation approach)\n\n\
         The hypothesis must be novel relative to previous hypotheses, grounded in the \
         literature, specific and actionable, and feasible to test. Prioritize insights from \
         high-priority searches.\n\n\
         Hypothesis:",
        role = context.expert_role,
        description = context.structure_description,
        literature = literature.join("\n"),
        previous = previous.join("\n"),
    )
}

/// Produces one literature-grounded hypothesis per call.
pub struct GenerationStage {
    llm: Arc<dyn LLMClient>,
    retrieval: Arc<RetrievalStrategyEngine>,
}

impl GenerationStage {
    pub fn new(llm: Arc<dyn LLMClient>, retrieval: Arc<RetrievalStrategyEngine>) -> Self {
        Self { llm, retrieval }
    }

    /// Retrieve literature and generate a hypothesis.
    ///
    /// Provider failures degrade to mock literature and the fallback
    /// template. Only malformed input is an error.
    #[instrument(skip(self, goal, existing))]
    pub async fn generate(
        &self,
        goal: &str,
        iteration: u32,
        hypothesis_index: usize,
        total_hypotheses: usize,
        existing: &[Hypothesis],
    ) -> Result<GenerationOutput> {
        if goal.trim().is_empty() {
            return Err(Error::stage_fault(GENERATION, "research goal is empty"));
        }
        if hypothesis_index >= total_hypotheses {
            return Err(Error::stage_fault(
                GENERATION,
                format!("hypothesis index {hypothesis_index} out of range for {total_hypotheses}"),
            ));
        }

        let config = self.retrieval.config();
        let existing_papers = deduplicate(
            existing
                .iter()
                .flat_map(|h| h.literature_sources.iter().cloned())
                .collect(),
            config.dedup_key_chars,
        );

        let outcome = self
            .retrieval
            .retrieve(
                goal,
                iteration,
                &existing_papers,
                hypothesis_index,
                total_hypotheses,
                config.generation_paper_limit,
            )
            .await;
        let domain = outcome.domain;

        let mut papers = outcome.papers;
        if papers.is_empty() {
            warn!("Strategic retrieval returned nothing, running simple search");
            papers = self
                .retrieval
                .simple_search(goal, config.fallback_search_limit)
                .await;
        }
        if papers.is_empty() {
            warn!("No literature available, using placeholder paper");
            papers.push(placeholder_paper(goal));
        }
        // Only the papers shown to the model are attached to the hypothesis
        papers.truncate(config.generation_paper_limit.min(config.prompt_paper_count));

        let prompt = build_prompt(goal, &papers, existing, &domain.context());
        let (hypothesis_content, is_fallback) =
            match self.llm.generate_text(&prompt, MAX_TOKENS, TEMPERATURE).await {
                Ok(text) if text.trim().chars().count() >= MIN_HYPOTHESIS_CHARS => {
                    (text.trim().to_string(), false)
                }
                Ok(text) => {
                    warn!(chars = text.trim().chars().count(), "Hypothesis too short, using fallback");
                    (fallback_hypothesis(goal), true)
                }
                Err(e) => {
                    warn!(error = %e, "Hypothesis generation failed, using fallback");
                    (fallback_hypothesis(goal), true)
                }
            };

        info!(
            %domain,
            papers = papers.len(),
            fallback = is_fallback,
            "Generated hypothesis"
        );

        Ok(GenerationOutput {
            hypothesis_content,
            literature_used: papers,
            is_fallback,
            domain,
        })
    }
}

#[async_trait]
impl Stage for GenerationStage {
    type Input = GenerationInput;
    type Output = GenerationOutput;

    async fn execute(&self, input: GenerationInput) -> Result<GenerationOutput> {
        self.generate(
            &input.goal,
            input.iteration,
            input.hypothesis_index,
            input.total_hypotheses,
            &input.existing,
        )
        .await
    }

    fn name(&self) -> &str {
        GENERATION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::retrieval::ProviderSet;
    use crate::testing::{ScriptedLLM, StaticProvider};

    const GOOD_HYPOTHESIS: &str = "Hypothesis: Inhibiting GSK-3 beta in hippocampal neurons \
        reduces tau hyperphosphorylation and rescues spatial memory in aged mice, testable \
        with a Morris water maze after four weeks of treatment.";

    fn stage(llm: Arc<ScriptedLLM>, providers: ProviderSet) -> GenerationStage {
        let engine = RetrievalStrategyEngine::new(llm.clone(), providers, RetrievalConfig::default());
        GenerationStage::new(llm, Arc::new(engine))
    }

    fn mock_providers() -> ProviderSet {
        ProviderSet::new(
            Arc::new(StaticProvider::empty(SourceKind::Perplexity)),
            Arc::new(StaticProvider::empty(SourceKind::PubMed)),
            Arc::new(StaticProvider::empty(SourceKind::Scholar)),
        )
    }

    #[tokio::test]
    async fn test_uses_model_reply() {
        let llm = Arc::new(ScriptedLLM::new().respond_to("testable hypothesis", format!("  {GOOD_HYPOTHESIS}\n")));
        let out = stage(llm.clone(), mock_providers())
            .generate("tau aggregation", 1, 0, 1, &[])
            .await
            .unwrap();

        assert_eq!(out.hypothesis_content, GOOD_HYPOTHESIS);
        assert!(!out.is_fallback);
        assert_eq!(out.literature_used.len(), 8);
        assert_eq!(out.domain, ResearchDomain::General);

        let prompts = llm.prompts();
        let prompt = prompts.iter().find(|p| p.contains("testable hypothesis")).unwrap();
        assert!(prompt.contains("Research Goal: tau aggregation"));
        assert!(prompt.contains("[PERPLEXITY/perplexity_primary]"));
    }

    #[tokio::test]
    async fn test_model_failure_uses_fallback_template() {
        let llm = Arc::new(ScriptedLLM::failing());
        let out = stage(llm, mock_providers())
            .generate("protein folding", 2, 0, 1, &[])
            .await
            .unwrap();

        assert!(out.is_fallback);
        assert!(out.hypothesis_content.contains("protein folding"));
        assert!(out.hypothesis_content.ends_with(FALLBACK_MARKER));
        assert!(!out.literature_used.is_empty());
    }

    #[tokio::test]
    async fn test_short_reply_uses_fallback_template() {
        let llm = Arc::new(ScriptedLLM::new().respond_to("testable hypothesis", "Too short."));
        let out = stage(llm, mock_providers())
            .generate("protein folding", 1, 0, 1, &[])
            .await
            .unwrap();
        assert!(out.is_fallback);
    }

    #[tokio::test]
    async fn test_placeholder_paper_when_nothing_found() {
        let providers = ProviderSet::new(
            Arc::new(StaticProvider::empty(SourceKind::Perplexity).without_mocks()),
            Arc::new(StaticProvider::empty(SourceKind::PubMed).without_mocks()),
            Arc::new(StaticProvider::empty(SourceKind::Scholar).without_mocks()),
        );
        let out = stage(Arc::new(ScriptedLLM::failing()), providers)
            .generate("coral bleaching", 1, 0, 1, &[])
            .await
            .unwrap();

        assert_eq!(out.literature_used.len(), 1);
        assert_eq!(
            out.literature_used[0].title,
            "Mock Paper: Research Approaches to coral bleaching"
        );
        assert_eq!(out.literature_used[0].relevance_score, 0.8);
    }

    #[tokio::test]
    async fn test_prompt_shows_last_three_hypotheses() {
        let llm = Arc::new(ScriptedLLM::new().respond_to("testable hypothesis", GOOD_HYPOTHESIS));
        let existing: Vec<Hypothesis> = (0..5)
            .map(|i| Hypothesis::new(format!("h{i}"), format!("earlier idea {i}"), 1))
            .collect();

        stage(llm.clone(), mock_providers())
            .generate("goal", 2, 0, 1, &existing)
            .await
            .unwrap();

        let prompts = llm.prompts();
        let prompt = prompts.iter().find(|p| p.contains("testable hypothesis")).unwrap();
        assert!(!prompt.contains("earlier idea 1"));
        assert!(prompt.contains("earlier idea 2"));
        assert!(prompt.contains("earlier idea 4"));
    }

    #[tokio::test]
    async fn test_invalid_input_is_stage_fault() {
        let s = stage(Arc::new(ScriptedLLM::failing()), mock_providers());
        let err = s.generate("   ", 1, 0, 1, &[]).await.unwrap_err();
        assert!(matches!(err, Error::StageFault { .. }));

        let err = s
            .execute(GenerationInput::new("goal", 1).with_position(3, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StageFault { .. }));
    }

    #[test]
    fn test_literature_line_truncates_abstract() {
        let paper = Paper::new("Title", SourceKind::PubMed).with_abstract("x".repeat(250));
        let line = literature_line(&paper);
        assert!(line.starts_with("- [PUBMED] Title: "));
        assert!(line.ends_with(&format!("{}...", "x".repeat(200))));
    }
}
