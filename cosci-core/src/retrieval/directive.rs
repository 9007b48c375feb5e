//! Cross-hypothesis diversification.
//!
//! Each hypothesis in a session gets a global index
//! `(iteration - 1) * total + index`; the strategy is that index modulo the
//! strategy count. Selection is a pure function of its inputs.

use serde::{Deserialize, Serialize};

/// Named search-emphasis strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiversificationStrategy {
    FoundationalLiterature,
    RecentAdvances,
    Interdisciplinary,
    Methodological,
    CriticalPerspective,
    ReviewPapers,
    CaseStudies,
    TheoreticalFrameworks,
    ComparativeStudies,
    EmergingTopics,
}

impl DiversificationStrategy {
    /// Rotation order.
    pub const ALL: [DiversificationStrategy; 10] = [
        Self::FoundationalLiterature,
        Self::RecentAdvances,
        Self::Interdisciplinary,
        Self::Methodological,
        Self::CriticalPerspective,
        Self::ReviewPapers,
        Self::CaseStudies,
        Self::TheoreticalFrameworks,
        Self::ComparativeStudies,
        Self::EmergingTopics,
    ];

    /// Search emphasis embedded in the plan prompt.
    pub fn focus(&self) -> &'static str {
        match self {
            Self::FoundationalLiterature => "Focus on FOUNDATIONAL LITERATURE - emphasize seminal papers, established theories, and core principles",
            Self::RecentAdvances => "Focus on RECENT ADVANCES - emphasize cutting-edge research, novel methodologies, and emerging trends",
            Self::Interdisciplinary => "Focus on INTERDISCIPLINARY CONNECTIONS - emphasize cross-domain research, hybrid approaches, and novel applications",
            Self::Methodological => "Focus on METHODOLOGICAL INNOVATIONS - emphasize new techniques, experimental approaches, and analytical methods",
            Self::CriticalPerspective => "Focus on CRITICAL PERSPECTIVES - emphasize challenges, limitations, alternative viewpoints, and contrarian evidence",
            Self::ReviewPapers => "Focus on REVIEW PAPERS - emphasize comprehensive reviews, meta-analyses, and systematic studies",
            Self::CaseStudies => "Focus on CASE STUDIES - emphasize practical applications, real-world implementations, and specific examples",
            Self::TheoreticalFrameworks => "Focus on THEORETICAL FRAMEWORKS - emphasize conceptual models, theoretical foundations, and analytical frameworks",
            Self::ComparativeStudies => "Focus on COMPARATIVE STUDIES - emphasize comparative analyses, benchmarking studies, and evaluation research",
            Self::EmergingTopics => "Focus on EMERGING TOPICS - emphasize frontier research, speculative approaches, and future directions",
        }
    }
}

/// The strategy chosen for one hypothesis and its prompt text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub strategy: DiversificationStrategy,
    /// Zero-based position across all iterations
    pub global_index: usize,
    pub text: String,
}

/// Global position of a hypothesis across iterations.
///
/// `iteration` is 1-based; iteration 0 is treated as 1.
pub fn global_index(iteration: u32, hypothesis_index: usize, total_hypotheses: usize) -> usize {
    (iteration.max(1) as usize - 1) * total_hypotheses + hypothesis_index
}

/// Strategy for a global index.
pub fn strategy_for(global_index: usize) -> DiversificationStrategy {
    DiversificationStrategy::ALL[global_index % DiversificationStrategy::ALL.len()]
}

/// Select the directive for a hypothesis.
pub fn select_directive(iteration: u32, hypothesis_index: usize, total_hypotheses: usize) -> Directive {
    let global = global_index(iteration, hypothesis_index, total_hypotheses);
    let strategy = strategy_for(global);
    Directive {
        strategy,
        global_index: global,
        text: format!(
            "{}. This is global hypothesis {} across all iterations - ensure literature \
             selection is COMPLETELY DISTINCT from all previous hypotheses.",
            strategy.focus(),
            global + 1
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_index() {
        assert_eq!(global_index(1, 0, 3), 0);
        assert_eq!(global_index(2, 1, 3), 4);
        assert_eq!(global_index(0, 2, 3), 2);
    }

    #[test]
    fn test_rotation_wraps() {
        assert_eq!(strategy_for(0), DiversificationStrategy::FoundationalLiterature);
        assert_eq!(strategy_for(9), DiversificationStrategy::EmergingTopics);
        assert_eq!(strategy_for(10), DiversificationStrategy::FoundationalLiterature);
    }

    #[test]
    fn test_directive_text_numbers_from_one() {
        let directive = select_directive(2, 0, 2);
        assert_eq!(directive.strategy, DiversificationStrategy::Interdisciplinary);
        assert!(directive.text.contains("global hypothesis 3 across"));
        assert!(directive.text.starts_with("Focus on INTERDISCIPLINARY"));
    }

    #[test]
    fn test_single_hypothesis_sessions_cycle_all_strategies() {
        let seen: std::collections::HashSet<_> =
            (1..=10).map(|it| select_directive(it, 0, 1).strategy).collect();
        assert_eq!(seen.len(), DiversificationStrategy::ALL.len());
    }
}
