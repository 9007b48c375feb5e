//! Research session and hypothesis model.
//!
//! A [`ResearchSession`] owns its hypotheses exclusively; only the
//! orchestrator mutates it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::literature::Paper;

/// Lifecycle status of a research session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Error,
    Cancelled,
}

impl SessionStatus {
    /// Whether the session can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// Whether the session counts as active.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-dimension quality scores, each in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub novelty: f64,
    pub feasibility: f64,
    pub relevance: f64,
    pub specificity: f64,
}

impl QualityMetrics {
    /// Mean of the four dimensions.
    pub fn overall(&self) -> f64 {
        (self.novelty + self.feasibility + self.relevance + self.specificity) / 4.0
    }
}

impl Default for QualityMetrics {
    fn default() -> Self {
        Self {
            novelty: 0.5,
            feasibility: 0.5,
            relevance: 0.5,
            specificity: 0.5,
        }
    }
}

/// A generated, scored, and ranked candidate answer to the research goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: String,
    pub content: String,
    pub iteration: u32,
    /// Overall reflection score
    pub score: f64,
    pub review: String,
    #[serde(default)]
    pub strengths: String,
    #[serde(default)]
    pub weaknesses: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityMetrics>,
    #[serde(default)]
    pub literature_sources: Vec<Paper>,
    /// 1-based tournament rank; `None` until ranked
    pub rank: Option<usize>,
    /// Tournament points from the last ranking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranking_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Hypothesis {
    pub fn new(id: impl Into<String>, content: impl Into<String>, iteration: u32) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            iteration,
            score: 0.0,
            review: String::new(),
            strengths: String::new(),
            weaknesses: String::new(),
            quality: None,
            literature_sources: Vec::new(),
            rank: None,
            ranking_score: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_literature(mut self, papers: Vec<Paper>) -> Self {
        self.literature_sources = papers;
        self
    }

    /// Identifier for the `ordinal`-th hypothesis of a session.
    pub fn make_id(session_id: &str, iteration: u32, ordinal: usize) -> String {
        format!("hyp_{}_{}_{}", session_id, iteration, ordinal)
    }
}

/// A research session and its accumulated hypotheses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchSession {
    pub id: String,
    pub goal: String,
    pub status: SessionStatus,
    pub iteration: u32,
    pub max_iterations: u32,
    pub hypotheses_per_iteration: u32,
    pub hypotheses: Vec<Hypothesis>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl ResearchSession {
    pub fn new(
        id: impl Into<String>,
        goal: impl Into<String>,
        max_iterations: u32,
        hypotheses_per_iteration: u32,
    ) -> Self {
        Self {
            id: id.into(),
            goal: goal.into(),
            status: SessionStatus::Pending,
            iteration: 0,
            max_iterations,
            hypotheses_per_iteration,
            hypotheses: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }

    /// Settle into a terminal status.
    pub fn finish(&mut self, status: SessionStatus, error_message: Option<String>) {
        self.status = status;
        self.error_message = error_message;
        self.completed_at = Some(Utc::now());
    }

    /// Highest-ranked hypothesis, if ranking has run.
    pub fn top_hypothesis(&self) -> Option<&Hypothesis> {
        self.hypotheses.iter().find(|h| h.rank == Some(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_hypothesis_defaults() {
        let h = Hypothesis::new("h", "text", 2);
        assert_eq!(h.score, 0.0);
        assert!(h.review.is_empty());
        assert_eq!(h.rank, None);
        assert_eq!(h.iteration, 2);
    }

    #[test]
    fn test_hypothesis_id_format() {
        assert_eq!(Hypothesis::make_id("abc", 2, 3), "hyp_abc_2_3");
    }

    #[test]
    fn test_status_terminality() {
        assert!(!SessionStatus::Pending.is_terminal());
        assert!(SessionStatus::Running.is_active());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert_eq!(SessionStatus::Completed.to_string(), "completed");
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&SessionStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }

    #[test]
    fn test_finish_sets_completion_time() {
        let mut s = ResearchSession::new("s", "goal", 3, 1);
        s.finish(SessionStatus::Error, Some("boom".into()));
        assert_eq!(s.status, SessionStatus::Error);
        assert!(s.completed_at.is_some());
        assert_eq!(s.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_quality_overall_is_mean() {
        let q = QualityMetrics {
            novelty: 1.0,
            feasibility: 0.0,
            relevance: 0.5,
            specificity: 0.5,
        };
        assert!((q.overall() - 0.5).abs() < f64::EPSILON);
    }
}
