//! Search plans: per-provider query lists with priorities.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParseError;
use crate::literature::SourceKind;

use super::domain::DomainContext;

/// Query priority tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Lenient parse; anything unrecognised is medium.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }

    /// Base score used when prioritizing merged results.
    pub fn weight(&self) -> f64 {
        match self {
            Self::High => 3.0,
            Self::Medium => 2.0,
            Self::Low => 1.0,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// One query for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub priority: Priority,
    #[serde(rename = "type")]
    pub query_type: String,
    #[serde(default)]
    pub rationale: String,
}

impl SearchQuery {
    pub fn new(
        query: impl Into<String>,
        priority: Priority,
        query_type: impl Into<String>,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            priority,
            query_type: query_type.into(),
            rationale: rationale.into(),
        }
    }
}

/// Search plan for one generation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPlan {
    #[serde(default)]
    pub perplexity_queries: Vec<SearchQuery>,
    #[serde(default)]
    pub pubmed_queries: Vec<SearchQuery>,
    #[serde(default)]
    pub scholar_queries: Vec<SearchQuery>,
    #[serde(default)]
    pub concept_map: Value,
    /// Built deterministically rather than by the model
    #[serde(default)]
    pub is_fallback: bool,
}

impl SearchPlan {
    /// Queries planned for `source`.
    pub fn queries_for(&self, source: SourceKind) -> &[SearchQuery] {
        match source {
            SourceKind::Perplexity => &self.perplexity_queries,
            SourceKind::PubMed => &self.pubmed_queries,
            SourceKind::Scholar => &self.scholar_queries,
        }
    }

    pub fn total_queries(&self) -> usize {
        self.perplexity_queries.len() + self.pubmed_queries.len() + self.scholar_queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_queries() == 0
    }
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    perplexity_queries: Vec<RawQuery>,
    #[serde(default)]
    pubmed_queries: Vec<RawQuery>,
    #[serde(default)]
    scholar_queries: Vec<RawQuery>,
    #[serde(default)]
    concept_map: Value,
}

#[derive(Debug, Deserialize)]
struct RawQuery {
    #[serde(default)]
    query: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(rename = "type", default)]
    query_type: Option<String>,
    #[serde(default)]
    rationale: Option<String>,
}

fn convert(raw: Vec<RawQuery>) -> Vec<SearchQuery> {
    raw.into_iter()
        .filter(|q| !q.query.trim().is_empty())
        .map(|q| SearchQuery {
            query: q.query.trim().to_string(),
            priority: q.priority.as_deref().map(Priority::parse).unwrap_or_default(),
            query_type: q.query_type.unwrap_or_default().trim().to_lowercase(),
            rationale: q.rationale.unwrap_or_default(),
        })
        .collect()
}

/// Parse the JSON object embedded in a model reply.
///
/// Takes everything from the first `{` to the last `}`. A plan with no
/// usable queries is rejected.
pub fn parse_plan(response: &str) -> Result<SearchPlan, ParseError> {
    let start = response.find('{');
    let end = response.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if e > s => &response[s..=e],
        _ => return Err(ParseError::InvalidPlan("no JSON object in response".into())),
    };

    let raw: RawPlan =
        serde_json::from_str(json).map_err(|e| ParseError::InvalidPlan(e.to_string()))?;
    let plan = SearchPlan {
        perplexity_queries: convert(raw.perplexity_queries),
        pubmed_queries: convert(raw.pubmed_queries),
        scholar_queries: convert(raw.scholar_queries),
        concept_map: raw.concept_map,
        is_fallback: false,
    };
    if plan.is_empty() {
        return Err(ParseError::InvalidPlan("plan contains no queries".into()));
    }
    Ok(plan)
}

/// Focus phrase for the deterministic plan.
pub fn iteration_focus(iteration: u32) -> &'static str {
    match iteration {
        0 | 1 => "primary research",
        2 => "mechanisms methods",
        _ => "applications theory",
    }
}

/// Deterministic plan built from the leading words of the goal.
pub fn fallback_plan(goal: &str, iteration: u32, context: &DomainContext) -> SearchPlan {
    let goal = goal.trim();
    let base_terms: Vec<&str> = goal.split_whitespace().take(5).collect();
    let first_three = &base_terms[..base_terms.len().min(3)];
    let focus = iteration_focus(iteration);
    let [enh0, enh1, _] = context.enhancement_terms;

    SearchPlan {
        perplexity_queries: vec![
            SearchQuery::new(
                format!("{} {} applications", goal, focus),
                Priority::High,
                "primary",
                "Direct goal search",
            ),
            SearchQuery::new(
                format!("{} {} {}", enh0, first_three.join(" "), focus),
                Priority::Medium,
                "secondary",
                format!("Broader {} context", context.field),
            ),
        ],
        pubmed_queries: vec![
            SearchQuery::new(
                format!("({}) AND ({} OR {})", goal, enh0, enh1),
                Priority::High,
                "exact",
                "Direct database search",
            ),
            SearchQuery::new(
                format!(
                    "({}) AND ({} OR research OR study)",
                    first_three.join(" OR "),
                    focus
                ),
                Priority::Medium,
                "expanded",
                "Expanded keyword search",
            ),
        ],
        scholar_queries: vec![SearchQuery::new(
            format!("{} {}", goal, enh0),
            Priority::Medium,
            "academic",
            "Comprehensive academic search",
        )],
        concept_map: serde_json::json!({
            "primary_focus": base_terms.first().copied().unwrap_or("unknown"),
            "target_domain": goal,
            "methodology": focus,
        }),
        is_fallback: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_plan_from_chatty_reply() {
        let reply = r#"Here is the plan:
        {"perplexity_queries": [{"query": "tau seeding", "priority": "High", "type": "Primary", "rationale": "r"}],
         "pubmed_queries": [{"query": "(tau) AND (prion)", "priority": "urgent", "type": "exact", "mesh_terms": ["Tau"]},
                            {"query": "  ", "priority": "low", "type": "expanded"}],
         "concept_map": {"primary_focus": "tau"}}
        Let me know if you need more."#;
        let plan = parse_plan(reply).unwrap();
        assert_eq!(plan.perplexity_queries.len(), 1);
        assert_eq!(plan.perplexity_queries[0].priority, Priority::High);
        assert_eq!(plan.perplexity_queries[0].query_type, "primary");
        assert_eq!(plan.pubmed_queries.len(), 1);
        assert_eq!(plan.pubmed_queries[0].priority, Priority::Medium);
        assert!(plan.scholar_queries.is_empty());
        assert!(!plan.is_fallback);
    }

    #[test]
    fn test_parse_plan_rejects_garbage() {
        assert!(matches!(parse_plan("no json here"), Err(ParseError::InvalidPlan(_))));
        assert!(matches!(parse_plan("{not json}"), Err(ParseError::InvalidPlan(_))));
        assert!(matches!(
            parse_plan(r#"{"perplexity_queries": []}"#),
            Err(ParseError::InvalidPlan(_))
        ));
    }

    #[test]
    fn test_fallback_plan_queries() {
        let context = DomainContext::general();
        let plan = fallback_plan("tau protein aggregation in neurons drives decline", 2, &context);

        assert!(plan.is_fallback);
        assert_eq!(
            plan.perplexity_queries[0].query,
            "tau protein aggregation in neurons drives decline mechanisms methods applications"
        );
        assert_eq!(
            plan.perplexity_queries[1].query,
            "scientific research tau protein aggregation mechanisms methods"
        );
        assert_eq!(
            plan.pubmed_queries[0].query,
            "(tau protein aggregation in neurons drives decline) AND (scientific research OR research methodology)"
        );
        assert_eq!(
            plan.pubmed_queries[1].query,
            "(tau OR protein OR aggregation) AND (mechanisms methods OR research OR study)"
        );
        assert_eq!(plan.scholar_queries.len(), 1);
        assert_eq!(plan.total_queries(), 5);
    }

    #[test]
    fn test_iteration_focus() {
        assert_eq!(iteration_focus(1), "primary research");
        assert_eq!(iteration_focus(2), "mechanisms methods");
        assert_eq!(iteration_focus(7), "applications theory");
    }
}
