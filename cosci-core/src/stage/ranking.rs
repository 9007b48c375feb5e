//! Round-robin pairwise tournament.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::RankingConfig;
use crate::error::Result;
use crate::llm::LLMClient;
use crate::session::Hypothesis;

use super::parse::{parse_comparison, Winner};
use super::{Measured, Stage, RANKING};

/// Rationale when there is nothing to compare.
pub const SINGLE_HYPOTHESIS_RATIONALE: &str = "Only one hypothesis available, no ranking performed";
const FAILED_COMPARISON_REASONING: &str =
    "Unable to perform detailed comparison due to API limitations.";

const CRITERIA: &str = "1. Scientific rigor and validity\n\
    2. Novelty and innovation potential\n\
    3. Feasibility for experimental testing\n\
    4. Clinical relevance and potential impact\n\
    5. Specificity and actionability";

/// Verdict on one unordered pair, by index into the ranked input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub a: usize,
    pub b: usize,
    pub winner: Winner,
    pub reasoning: String,
}

#[derive(Debug, Clone)]
pub struct RankingInput {
    pub hypotheses: Vec<Hypothesis>,
    pub goal: String,
}

impl RankingInput {
    pub fn new(hypotheses: Vec<Hypothesis>, goal: impl Into<String>) -> Self {
        Self {
            hypotheses,
            goal: goal.into(),
        }
    }
}

impl Measured for RankingInput {
    fn size_hint(&self) -> usize {
        self.hypotheses.len()
    }
}

/// Tournament result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingOutcome {
    /// Best first, with `rank` and `ranking_score` set; input order when
    /// no tournament ran
    pub ranked: Vec<Hypothesis>,
    pub comparisons: Vec<Comparison>,
    pub rationale: String,
}

impl Measured for RankingOutcome {
    fn size_hint(&self) -> usize {
        self.ranked.len()
    }
}

/// Accumulate tournament points for `n` entrants.
pub fn tally_points(n: usize, comparisons: &[Comparison], config: &RankingConfig) -> Vec<f64> {
    let mut points = vec![0.0; n];
    for c in comparisons {
        match c.winner {
            Winner::A => points[c.a] += config.win_points,
            Winner::B => points[c.b] += config.win_points,
            Winner::Tie => {
                points[c.a] += config.tie_points;
                points[c.b] += config.tie_points;
            }
        }
    }
    points
}

/// Indices sorted by points descending; equal points keep input order.
pub fn order_by_points(points: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&x, &y| points[y].total_cmp(&points[x]));
    order
}

/// Ranks hypotheses by pairwise comparison.
pub struct RankingStage {
    llm: Arc<dyn LLMClient>,
    config: RankingConfig,
}

impl RankingStage {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self::with_config(llm, RankingConfig::default())
    }

    pub fn with_config(llm: Arc<dyn LLMClient>, config: RankingConfig) -> Self {
        Self { llm, config }
    }

    /// Run the full tournament. Individual failures count as ties.
    #[instrument(skip_all, fields(count = hypotheses.len()))]
    pub async fn rank(&self, hypotheses: Vec<Hypothesis>, goal: &str) -> RankingOutcome {
        if hypotheses.len() < 2 {
            return RankingOutcome {
                ranked: hypotheses,
                comparisons: Vec::new(),
                rationale: SINGLE_HYPOTHESIS_RATIONALE.to_string(),
            };
        }

        let n = hypotheses.len();
        let mut comparisons = Vec::with_capacity(n * (n - 1) / 2);
        for a in 0..n {
            for b in (a + 1)..n {
                let (winner, reasoning) = self
                    .compare(&hypotheses[a].content, &hypotheses[b].content, goal)
                    .await;
                debug!(a, b, %winner, "Compared hypotheses");
                comparisons.push(Comparison {
                    a,
                    b,
                    winner,
                    reasoning,
                });
            }
        }

        let points = tally_points(n, &comparisons, &self.config);
        let order = order_by_points(&points);

        let mut slots: Vec<Option<Hypothesis>> = hypotheses.into_iter().map(Some).collect();
        let ranked: Vec<Hypothesis> = order
            .iter()
            .enumerate()
            .filter_map(|(position, &idx)| {
                slots[idx].take().map(|mut h| {
                    h.rank = Some(position + 1);
                    h.ranking_score = Some(points[idx]);
                    h
                })
            })
            .collect();

        let rationale = self.rationale(&ranked, goal).await;
        info!(
            top = ranked.first().map(|h| h.id.as_str()).unwrap_or_default(),
            comparisons = comparisons.len(),
            "Ranking complete"
        );

        RankingOutcome {
            ranked,
            comparisons,
            rationale,
        }
    }

    /// Ask for a verdict on one pair.
    pub async fn compare(&self, content_a: &str, content_b: &str, goal: &str) -> (Winner, String) {
        let prompt = format!(
            "Compare these two research hypotheses and determine which is better for the \
             given research goal.\n\n\
             Research Goal: {goal}\n\n\
             Hypothesis A:\n{content_a}\n\n\
             Hypothesis B:\n{content_b}\n\n\
             Evaluation Criteria:\n{CRITERIA}\n\n\
             Consider the overall scientific merit, feasibility, and potential impact of each \
             hypothesis.\n\n\
             Respond with:\n\
             WINNER: [A, B, or TIE]\n\
             REASONING: [2-3 sentences explaining your decision based on the criteria]\n\n\
             If the hypotheses are very similar in quality, respond with TIE."
        );
        match self.llm.generate_text(&prompt, 500, 0.3).await {
            Ok(reply) => parse_comparison(&reply),
            Err(e) => {
                warn!(error = %e, "Comparison failed, scoring as tie");
                (Winner::Tie, FAILED_COMPARISON_REASONING.to_string())
            }
        }
    }

    async fn rationale(&self, ranked: &[Hypothesis], goal: &str) -> String {
        let Some(top) = ranked.first() else {
            return SINGLE_HYPOTHESIS_RATIONALE.to_string();
        };
        let points = top.ranking_score.unwrap_or_default();
        let prompt = format!(
            "Provide a brief rationale for why this hypothesis ranked highest among the \
             alternatives for the research goal.\n\n\
             Research Goal: {goal}\n\n\
             Top-Ranked Hypothesis:\n{content}\n\n\
             Ranking Score: {points}/{rounds} wins\n\n\
             Provide 2-3 sentences explaining what makes this hypothesis stand out in terms of \
             scientific merit, innovation potential, feasibility and relevance.\n\n\
             Rationale:",
            content = top.content,
            rounds = ranked.len() - 1,
        );
        match self.llm.generate_text(&prompt, 300, 0.3).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "Ranking rationale failed, using fallback");
                format!("Hypothesis ranked highest based on pairwise comparisons ({points} wins).")
            }
        }
    }
}

#[async_trait]
impl Stage for RankingStage {
    type Input = RankingInput;
    type Output = RankingOutcome;

    async fn execute(&self, input: RankingInput) -> Result<RankingOutcome> {
        Ok(self.rank(input.hypotheses, &input.goal).await)
    }

    fn name(&self) -> &str {
        RANKING
    }
}
