//! Pipeline stages and their shared instrumentation.
//!
//! Each of the three agents (generation, reflection, ranking) is an
//! independent type implementing [`Stage`]. The orchestrator never calls a
//! bare stage: it wraps each in [`Instrumented`], which logs start and
//! finish and records an [`ExecutionRecord`] into a shared
//! [`ExecutionHistory`].
//!
//! # Example
//!
//! ```ignore
//! use cosci_core::stage::{ExecutionHistory, Instrumented, ReflectionInput, ReflectionStage, Stage};
//!
//! let history = ExecutionHistory::new();
//! let reflection = Instrumented::new(ReflectionStage::new(llm), history.clone());
//! let review = reflection.execute(ReflectionInput::new(content, goal)).await?;
//! let stats = history.stats_for("reflection").await;
//! ```

mod generation;
mod parse;
mod ranking;
mod reflection;

#[cfg(test)]
mod proptest;

pub use generation::{
    fallback_hypothesis, GenerationInput, GenerationOutput, GenerationStage, FALLBACK_MARKER,
};
pub use parse::{
    parse_comparison, parse_critique, parse_unit_score, unit_score_or_default, Critique, Winner,
    DEFAULT_SCORE,
};
pub use ranking::{
    order_by_points, tally_points, Comparison, RankingInput, RankingOutcome, RankingStage,
    SINGLE_HYPOTHESIS_RATIONALE,
};
pub use reflection::{
    ComparativeReview, Reflection, ReflectionInput, ReflectionStage, FALLBACK_REVIEW,
};

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::error::{Error, Result};

/// Stage names used for logging, events, and statistics.
pub const GENERATION: &str = "generation";
pub const REFLECTION: &str = "reflection";
pub const RANKING: &str = "ranking";

/// Maximum execution records retained by an [`ExecutionHistory`].
const MAX_RECORDS: usize = 1000;

/// Rough size of a stage input or output, for execution records.
pub trait Measured {
    fn size_hint(&self) -> usize;
}

/// One agent of the research pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    type Input: Measured + Send + 'static;
    type Output: Measured + Send + 'static;

    /// Run the stage.
    ///
    /// Provider failures are absorbed into fallback values; an `Err` here
    /// is a stage fault and terminates the session.
    async fn execute(&self, input: Self::Input) -> Result<Self::Output>;

    /// Stable name used in events and statistics.
    fn name(&self) -> &str;
}

/// A stage behind shared ownership, as held by the orchestrator.
pub type SharedStage<I, O> = Arc<dyn Stage<Input = I, Output = O>>;

#[async_trait]
impl<S: Stage + ?Sized> Stage for Arc<S> {
    type Input = S::Input;
    type Output = S::Output;

    async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
        (**self).execute(input).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// =============================================================================
// Execution history
// =============================================================================

/// A single stage execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub stage: String,
    pub timestamp: DateTime<Utc>,
    pub input_size: usize,
    pub output_size: usize,
    pub duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// Aggregate statistics for one stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub last_execution: Option<DateTime<Utc>>,
}

impl ExecutionStats {
    /// Record a successful execution.
    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.total_executions += 1;
        self.successful_executions += 1;
        self.last_execution = Some(at);
    }

    /// Record a failed execution.
    pub fn record_failure(&mut self, at: DateTime<Utc>) {
        self.total_executions += 1;
        self.failed_executions += 1;
        self.last_execution = Some(at);
    }

    /// Get success rate.
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            1.0
        } else {
            self.successful_executions as f64 / self.total_executions as f64
        }
    }
}

#[derive(Debug, Default)]
struct HistoryInner {
    records: VecDeque<ExecutionRecord>,
    stats: BTreeMap<String, ExecutionStats>,
}

/// Shared log of stage executions.
///
/// Cloning shares the underlying log. Records are capped; statistics
/// count every execution ever recorded.
#[derive(Debug, Clone, Default)]
pub struct ExecutionHistory {
    inner: Arc<RwLock<HistoryInner>>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, record: ExecutionRecord) {
        let mut inner = self.inner.write().await;
        let stats = inner.stats.entry(record.stage.clone()).or_default();
        if record.success {
            stats.record_success(record.timestamp);
        } else {
            stats.record_failure(record.timestamp);
        }
        if inner.records.len() == MAX_RECORDS {
            inner.records.pop_front();
        }
        inner.records.push_back(record);
    }

    /// Statistics for one stage; zeroed if it never ran.
    pub async fn stats_for(&self, stage: &str) -> ExecutionStats {
        self.inner
            .read()
            .await
            .stats
            .get(stage)
            .cloned()
            .unwrap_or_default()
    }

    /// Statistics for every stage that has run, keyed by name.
    pub async fn snapshot(&self) -> BTreeMap<String, ExecutionStats> {
        self.inner.read().await.stats.clone()
    }

    /// Retained records, oldest first.
    pub async fn records(&self) -> Vec<ExecutionRecord> {
        self.inner.read().await.records.iter().cloned().collect()
    }
}

// =============================================================================
// Instrumented decorator
// =============================================================================

/// Wraps a stage with logging and execution recording.
///
/// Errors are returned unchanged after being recorded.
pub struct Instrumented<S> {
    inner: S,
    history: ExecutionHistory,
}

impl<S: Stage> Instrumented<S> {
    pub fn new(inner: S, history: ExecutionHistory) -> Self {
        Self { inner, history }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }
}

#[async_trait]
impl<S: Stage> Stage for Instrumented<S> {
    type Input = S::Input;
    type Output = S::Output;

    async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
        let stage = self.inner.name().to_string();
        let input_size = input.size_hint();
        let timestamp = Utc::now();
        let start = Instant::now();

        info!(stage = %stage, input_size, "Stage started");
        let result = self.inner.execute(input).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let record = match &result {
            Ok(output) => {
                let output_size = output.size_hint();
                info!(stage = %stage, output_size, duration_ms, "Stage completed");
                ExecutionRecord {
                    stage,
                    timestamp,
                    input_size,
                    output_size,
                    duration_ms,
                    success: true,
                    error: None,
                }
            }
            Err(e) => {
                error!(stage = %stage, input_size, duration_ms, error = %e, "Stage failed");
                ExecutionRecord {
                    stage,
                    timestamp,
                    input_size,
                    output_size: 0,
                    duration_ms,
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        };
        self.history.record(record).await;
        result
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

// =============================================================================
// Timed decorator
// =============================================================================

/// Bounds a stage's running time. Expiry is a stage fault.
pub struct Timed<S> {
    inner: S,
    limit: Option<Duration>,
}

impl<S: Stage> Timed<S> {
    /// `None` leaves the stage unbounded.
    pub fn new(inner: S, limit: Option<Duration>) -> Self {
        Self { inner, limit }
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }
}

#[async_trait]
impl<S: Stage> Stage for Timed<S> {
    type Input = S::Input;
    type Output = S::Output;

    async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
        let Some(limit) = self.limit else {
            return self.inner.execute(input).await;
        };
        match tokio::time::timeout(limit, self.inner.execute(input)).await {
            Ok(result) => result,
            Err(_) => Err(Error::stage_fault(
                self.inner.name(),
                format!("timed out after {}s", limit.as_secs_f64()),
            )),
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
