//! Critique and multi-dimension scoring of hypotheses.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::llm::LLMClient;
use crate::session::{Hypothesis, QualityMetrics};

use super::parse::{parse_critique, unit_score_or_default, DEFAULT_SCORE};
use super::{Measured, Stage, REFLECTION};

/// Review text used when the critique call fails.
pub const FALLBACK_REVIEW: &str =
    "Unable to generate detailed review due to API limitations. Manual review recommended.";
const FALLBACK_STRENGTHS: &str = "Hypothesis addresses the research goal";
const FALLBACK_WEAKNESSES: &str = "Requires detailed scientific validation";

const COMPARATIVE_TOO_FEW: &str =
    "At least two hypotheses are required for a comparative review.";
const COMPARATIVE_FALLBACK: &str = "Comparative analysis could not be generated.";
/// Hypotheses included in a comparative review.
const COMPARATIVE_TOP_N: usize = 5;
const SUMMARY_PREVIEW_CHARS: usize = 200;

const CRITERIA: &str = "1. Scientific Validity: Is the hypothesis based on sound scientific principles?\n\
    2. Novelty: Does this represent a novel research approach?\n\
    3. Feasibility: Is this hypothesis practically testable and implementable?\n\
    4. Impact Potential: Would this have meaningful impact if successful?\n\
    5. Specificity: Is the hypothesis specific enough to be actionable?";

/// Dimension name and the question posed for it.
const DIMENSIONS: [(&str, &str); 4] = [
    ("novelty", "How novel and innovative is this research approach?"),
    ("feasibility", "How feasible is this hypothesis for experimental testing?"),
    ("relevance", "How relevant is this to the stated research goal?"),
    ("specificity", "How specific and actionable is this hypothesis?"),
];

#[derive(Debug, Clone)]
pub struct ReflectionInput {
    pub hypothesis_content: String,
    pub goal: String,
}

impl ReflectionInput {
    pub fn new(hypothesis_content: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            hypothesis_content: hypothesis_content.into(),
            goal: goal.into(),
        }
    }
}

impl Measured for ReflectionInput {
    fn size_hint(&self) -> usize {
        self.hypothesis_content.len()
    }
}

/// Critique of a single hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub score: f64,
    pub review: String,
    pub strengths: String,
    pub weaknesses: String,
    pub quality: QualityMetrics,
    /// The critique call failed and the fixed review was used
    pub is_fallback: bool,
}

impl Reflection {
    /// Copy the critique onto a hypothesis.
    pub fn apply_to(&self, hypothesis: &mut Hypothesis) {
        hypothesis.score = self.score;
        hypothesis.review = self.review.clone();
        hypothesis.strengths = self.strengths.clone();
        hypothesis.weaknesses = self.weaknesses.clone();
        hypothesis.quality = Some(self.quality);
    }
}

impl Measured for Reflection {
    fn size_hint(&self) -> usize {
        self.review.len() + self.strengths.len() + self.weaknesses.len()
    }
}

/// Side-by-side analysis of the strongest hypotheses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparativeReview {
    pub text: String,
    /// Ids of the hypotheses compared, best score first
    pub compared: Vec<String>,
}

/// Reviews hypotheses against the research goal.
pub struct ReflectionStage {
    llm: Arc<dyn LLMClient>,
}

impl ReflectionStage {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }

    /// Critique and score one hypothesis. Never fails.
    #[instrument(skip_all)]
    pub async fn reflect(&self, hypothesis_content: &str, goal: &str) -> Reflection {
        let prompt = format!(
            "You are a senior scientific researcher reviewing a research hypothesis. \
             Provide a thorough, constructive review.\n\n\
             Research Goal: {goal}\n\n\
             Hypothesis to Review:\n{hypothesis_content}\n\n\
             Evaluation Criteria:\n{CRITERIA}\n\n\
             Please provide a detailed review (3-4 sentences), a score from 0.0 to 1.0, \
             key strengths and key weaknesses.\n\n\
             Format your response as:\n\
             SCORE: [0.0-1.0]\n\
             REVIEW: [detailed review]\n\
             STRENGTHS: [bullet points of strengths]\n\
             WEAKNESSES: [bullet points of weaknesses]"
        );

        let (score, review, strengths, weaknesses, is_fallback) =
            match self.llm.generate_text(&prompt, 1000, 0.3).await {
                Ok(reply) => {
                    let critique = parse_critique(&reply);
                    for issue in &critique.issues {
                        debug!(%issue, "Critique parse issue");
                    }
                    (
                        critique.score,
                        critique.review,
                        critique.strengths,
                        critique.weaknesses,
                        false,
                    )
                }
                Err(e) => {
                    warn!(error = %e, "Critique failed, using fallback review");
                    (
                        DEFAULT_SCORE,
                        FALLBACK_REVIEW.to_string(),
                        FALLBACK_STRENGTHS.to_string(),
                        FALLBACK_WEAKNESSES.to_string(),
                        true,
                    )
                }
            };

        let quality = self.assess_dimensions(hypothesis_content, goal).await;
        info!(score, overall = quality.overall(), fallback = is_fallback, "Reviewed hypothesis");

        Reflection {
            score,
            review,
            strengths,
            weaknesses,
            quality,
            is_fallback,
        }
    }

    /// One call per dimension, each defaulting independently.
    pub async fn assess_dimensions(&self, hypothesis_content: &str, goal: &str) -> QualityMetrics {
        let mut scores = [DEFAULT_SCORE; 4];
        for (slot, (dimension, question)) in scores.iter_mut().zip(DIMENSIONS) {
            let prompt = format!(
                "Rate this research hypothesis on {dimension} using the question: {question}\n\n\
                 Hypothesis: {hypothesis_content}\n\
                 Research Goal: {goal}\n\n\
                 Provide a score from 0.0 to 1.0 where:\n\
                 - 0.0-0.3: Poor\n\
                 - 0.4-0.6: Moderate\n\
                 - 0.7-0.8: Good\n\
                 - 0.9-1.0: Excellent\n\n\
                 Return only the numerical score (e.g., 0.7)."
            );
            match self.llm.generate_text(&prompt, 50, 0.1).await {
                Ok(reply) => {
                    *slot = unit_score_or_default(reply.split_whitespace().next().unwrap_or(""));
                }
                Err(e) => warn!(dimension, error = %e, "Dimension scoring failed"),
            }
        }
        let [novelty, feasibility, relevance, specificity] = scores;
        QualityMetrics {
            novelty,
            feasibility,
            relevance,
            specificity,
        }
    }

    /// Compare the top hypotheses by score in a single call.
    #[instrument(skip_all, fields(count = hypotheses.len()))]
    pub async fn comparative_review(&self, hypotheses: &[Hypothesis], goal: &str) -> ComparativeReview {
        if hypotheses.len() < 2 {
            return ComparativeReview {
                text: COMPARATIVE_TOO_FEW.to_string(),
                compared: hypotheses.iter().map(|h| h.id.clone()).collect(),
            };
        }

        let mut top: Vec<&Hypothesis> = hypotheses.iter().collect();
        top.sort_by(|a, b| b.score.total_cmp(&a.score));
        top.truncate(COMPARATIVE_TOP_N);

        let summaries: Vec<String> = top
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let preview: String = h.content.chars().take(SUMMARY_PREVIEW_CHARS).collect();
                format!("Hypothesis {} (Score: {:.2}): {}...", i + 1, h.score, preview)
            })
            .collect();

        let prompt = format!(
            "Provide a comparative analysis of these research hypotheses.\n\n\
             Research Goal: {goal}\n\n\
             Hypotheses and Scores:\n{}\n\n\
             Cover the overall comparison of approaches, relative strengths and weaknesses, \
             which hypothesis shows the most promise and why, and the potential for \
             combining insights. Keep the analysis concise.",
            summaries.join("\n")
        );

        let text = match self.llm.generate_text(&prompt, 1000, 0.4).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "Comparative review failed");
                COMPARATIVE_FALLBACK.to_string()
            }
        };

        ComparativeReview {
            text,
            compared: top.iter().map(|h| h.id.clone()).collect(),
        }
    }
}

#[async_trait]
impl Stage for ReflectionStage {
    type Input = ReflectionInput;
    type Output = Reflection;

    async fn execute(&self, input: ReflectionInput) -> Result<Reflection> {
        Ok(self.reflect(&input.hypothesis_content, &input.goal).await)
    }

    fn name(&self) -> &str {
        REFLECTION
    }
}
