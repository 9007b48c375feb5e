//! Iterative research session orchestration.
//!
//! Each iteration runs generation, reflection and ranking in order:
//!
//! 1. generate `hypotheses_per_iteration` new hypotheses, each seeing the
//!    accumulated set plus the iteration's earlier hypotheses,
//! 2. critique each new hypothesis,
//! 3. append them to the session,
//! 4. re-rank the whole set by pairwise tournament once it has more than
//!    one member.
//!
//! Progress is broadcast through the [`EventBroadcaster`]. Cancellation is
//! cooperative and checked at iteration start and before each stage.
//! Provider failures never reach this layer; a stage error ends the
//! session with status `error` and a [`SessionFault`] carrying every
//! hypothesis produced so far.
//!
//! # Example
//!
//! ```ignore
//! use cosci_core::{CoScientistContext, SessionOrchestrator};
//!
//! let context = CoScientistContext::from_env();
//! let orchestrator = SessionOrchestrator::new(&context);
//! let session_id = orchestrator.start_session("How does tau spread?", 3, 1).await?;
//! ```

mod registry;

pub use registry::{SessionEntry, SessionRegistry};

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinError;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::broadcast::{AgentStatus, EventBroadcaster, SessionEventType};
use crate::config::{CoScientistConfig, OrchestratorConfig};
use crate::error::{Error, Result, SessionFault};
use crate::llm::{AnthropicClient, LLMClient};
use crate::literature::{PerplexityClient, PubMedClient, ScholarClient};
use crate::retrieval::{ProviderSet, RetrievalStrategyEngine};
use crate::session::{Hypothesis, ResearchSession, SessionStatus};
use crate::stage::{
    ExecutionHistory, ExecutionStats, GenerationInput, GenerationOutput, GenerationStage,
    Instrumented, RankingInput, RankingOutcome, RankingStage, Reflection, ReflectionInput,
    ReflectionStage, SharedStage, Stage, Timed, GENERATION, RANKING, REFLECTION,
};

/// Shared capabilities, built once and handed to the orchestrator.
pub struct CoScientistContext {
    pub llm: Arc<dyn LLMClient>,
    pub retrieval: Arc<RetrievalStrategyEngine>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub config: CoScientistConfig,
}

impl CoScientistContext {
    pub fn new(llm: Arc<dyn LLMClient>, providers: ProviderSet, config: CoScientistConfig) -> Self {
        let retrieval = Arc::new(RetrievalStrategyEngine::new(
            Arc::clone(&llm),
            providers,
            config.retrieval.clone(),
        ));
        Self {
            llm,
            retrieval,
            broadcaster: Arc::new(EventBroadcaster::new()),
            config,
        }
    }

    /// Build the production clients from configuration.
    pub fn from_config(config: CoScientistConfig) -> Self {
        let llm: Arc<dyn LLMClient> = Arc::new(AnthropicClient::new(config.llm.clone()));
        let providers = ProviderSet::new(
            Arc::new(PerplexityClient::new(config.perplexity.clone())),
            Arc::new(PubMedClient::new(config.pubmed.clone())),
            Arc::new(ScholarClient::new(config.serper.clone())),
        );
        Self::new(llm, providers, config)
    }

    pub fn from_env() -> Self {
        Self::from_config(CoScientistConfig::from_env())
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<EventBroadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }
}

/// The three pipeline stages, each instrumented against one history.
pub struct StageSet {
    generation: Instrumented<Timed<SharedStage<GenerationInput, GenerationOutput>>>,
    reflection: Instrumented<Timed<SharedStage<ReflectionInput, Reflection>>>,
    ranking: Instrumented<Timed<SharedStage<RankingInput, RankingOutcome>>>,
    history: ExecutionHistory,
}

impl StageSet {
    /// Stages without time limits.
    pub fn new(
        generation: SharedStage<GenerationInput, GenerationOutput>,
        reflection: SharedStage<ReflectionInput, Reflection>,
        ranking: SharedStage<RankingInput, RankingOutcome>,
    ) -> Self {
        Self::with_timeouts(
            generation,
            reflection,
            ranking,
            &OrchestratorConfig::default().with_stage_timeouts(0, 0, 0),
        )
    }

    /// Stages bounded by the per-call limits in `config`.
    pub fn with_timeouts(
        generation: SharedStage<GenerationInput, GenerationOutput>,
        reflection: SharedStage<ReflectionInput, Reflection>,
        ranking: SharedStage<RankingInput, RankingOutcome>,
        config: &OrchestratorConfig,
    ) -> Self {
        let history = ExecutionHistory::new();
        let bounded = |stage: &str| config.stage_timeout(stage);
        Self {
            generation: Instrumented::new(
                Timed::new(generation, bounded(GENERATION)),
                history.clone(),
            ),
            reflection: Instrumented::new(
                Timed::new(reflection, bounded(REFLECTION)),
                history.clone(),
            ),
            ranking: Instrumented::new(Timed::new(ranking, bounded(RANKING)), history.clone()),
            history,
        }
    }

    pub fn from_context(context: &CoScientistContext) -> Self {
        Self::with_timeouts(
            Arc::new(GenerationStage::new(
                Arc::clone(&context.llm),
                Arc::clone(&context.retrieval),
            )),
            Arc::new(ReflectionStage::new(Arc::clone(&context.llm))),
            Arc::new(RankingStage::with_config(
                Arc::clone(&context.llm),
                context.config.ranking,
            )),
            &context.config.orchestrator,
        )
    }

    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }
}

/// A session that ran to completion or was cancelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub session: ResearchSession,
    /// Pairwise comparisons issued across all iterations
    pub comparisons_run: usize,
}

/// Aggregate view over sessions and stage executions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorStats {
    /// Sessions pending or running
    pub active_session_count: usize,
    pub total_sessions: usize,
    pub per_agent_execution_counts: BTreeMap<String, u64>,
    pub per_agent_stats: BTreeMap<String, ExecutionStats>,
}

enum Flow {
    Finished,
    Cancelled,
}

struct RunState {
    session: ResearchSession,
    /// This iteration's hypotheses, not yet accumulated
    pending: Vec<Hypothesis>,
    comparisons_run: usize,
}

impl RunState {
    fn settle_pending(&mut self) {
        self.session.hypotheses.append(&mut self.pending);
    }
}

fn is_cancelled(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}

fn describe_join_error(err: JoinError) -> String {
    if !err.is_panic() {
        return format!("session task cancelled: {}", err);
    }
    let payload = err.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("session task panicked: {}", detail)
}

/// Copy tournament ranks onto the session's hypotheses by id, then order
/// the set by rank.
fn apply_ranking(hypotheses: &mut [Hypothesis], ranked: &[Hypothesis]) {
    let by_id: HashMap<&str, (Option<usize>, Option<f64>)> = ranked
        .iter()
        .map(|h| (h.id.as_str(), (h.rank, h.ranking_score)))
        .collect();
    for hypothesis in hypotheses.iter_mut() {
        if let Some(&(rank, score)) = by_id.get(hypothesis.id.as_str()) {
            hypothesis.rank = rank;
            hypothesis.ranking_score = score;
        }
    }
    hypotheses.sort_by_key(|h| h.rank.unwrap_or(usize::MAX));
}

/// Drives research sessions and tracks them for status queries.
#[derive(Clone)]
pub struct SessionOrchestrator {
    broadcaster: Arc<EventBroadcaster>,
    config: OrchestratorConfig,
    stages: Arc<StageSet>,
    registry: Arc<SessionRegistry>,
}

impl SessionOrchestrator {
    pub fn new(context: &CoScientistContext) -> Self {
        Self::with_stages(
            Arc::clone(&context.broadcaster),
            context.config.orchestrator.clone(),
            StageSet::from_context(context),
        )
    }

    pub fn with_stages(
        broadcaster: Arc<EventBroadcaster>,
        config: OrchestratorConfig,
        stages: StageSet,
    ) -> Self {
        Self {
            broadcaster,
            config,
            stages: Arc::new(stages),
            registry: Arc::new(SessionRegistry::new()),
        }
    }

    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // =========================================================================
    // Session loop
    // =========================================================================

    /// Run a session to a terminal status.
    ///
    /// Cancellation returns `Ok` with status `cancelled`; a stage error
    /// returns the fault with the partial hypothesis set.
    #[instrument(skip(self, goal))]
    pub async fn run(
        &self,
        session_id: &str,
        goal: &str,
        max_iterations: u32,
        hypotheses_per_iteration: u32,
    ) -> std::result::Result<SessionOutcome, SessionFault> {
        let mut session =
            ResearchSession::new(session_id, goal, max_iterations, hypotheses_per_iteration);
        if let Some(previous) = self.registry.snapshot(session_id).await {
            session.created_at = previous.created_at;
        }
        session.status = SessionStatus::Running;
        let cancel = self.registry.register(session.clone()).await;
        info!("Research session running");

        let mut state = RunState {
            session,
            pending: Vec::new(),
            comparisons_run: 0,
        };

        match self.drive(&mut state, &cancel).await {
            Ok(Flow::Finished) => {
                state.session.finish(SessionStatus::Completed, None);
                self.registry.update(&state.session).await;
                let total = state.session.hypotheses.len();
                self.emit_session(
                    session_id,
                    SessionEventType::SessionCompleted,
                    json!({ "total_hypotheses": total }),
                )
                .await;
                info!(total_hypotheses = total, "Research session completed");
                Ok(SessionOutcome {
                    session: state.session,
                    comparisons_run: state.comparisons_run,
                })
            }
            Ok(Flow::Cancelled) => {
                state.settle_pending();
                state.session.finish(SessionStatus::Cancelled, None);
                self.registry.update(&state.session).await;
                let total = state.session.hypotheses.len();
                self.emit_session(
                    session_id,
                    SessionEventType::SessionCancelled,
                    json!({ "iteration": state.session.iteration, "total_hypotheses": total }),
                )
                .await;
                info!(total_hypotheses = total, "Research session cancelled");
                Ok(SessionOutcome {
                    session: state.session,
                    comparisons_run: state.comparisons_run,
                })
            }
            Err(err) => {
                state.settle_pending();
                let message = err.to_string();
                state
                    .session
                    .finish(SessionStatus::Error, Some(message.clone()));
                self.registry.update(&state.session).await;
                self.emit_session(
                    session_id,
                    SessionEventType::SessionError,
                    json!({ "error": message }),
                )
                .await;
                error!(error = %err, "Research session failed");
                Err(SessionFault {
                    session_id: session_id.to_string(),
                    error: err,
                    hypotheses: state.session.hypotheses,
                })
            }
        }
    }

    async fn drive(&self, state: &mut RunState, cancel: &AtomicBool) -> Result<Flow> {
        let session_id = state.session.id.clone();
        let goal = state.session.goal.clone();
        let max_iterations = state.session.max_iterations;
        let per_iteration = state.session.hypotheses_per_iteration as usize;

        for iteration in 1..=max_iterations {
            if is_cancelled(cancel) {
                return Ok(Flow::Cancelled);
            }
            state.session.iteration = iteration;
            self.registry.update(&state.session).await;
            self.emit_session(
                &session_id,
                SessionEventType::IterationStart,
                json!({ "iteration": iteration }),
            )
            .await;

            // Generation
            self.emit_agent(&session_id, GENERATION, AgentStatus::Running, json!({ "iteration": iteration }))
                .await;
            for index in 0..per_iteration {
                let existing: Vec<Hypothesis> = state
                    .session
                    .hypotheses
                    .iter()
                    .chain(state.pending.iter())
                    .cloned()
                    .collect();
                let output = self
                    .stages
                    .generation
                    .execute(
                        GenerationInput::new(goal.clone(), iteration)
                            .with_position(index, per_iteration)
                            .with_existing(existing),
                    )
                    .await?;
                let ordinal = state.session.hypotheses.len() + index;
                state.pending.push(
                    Hypothesis::new(
                        Hypothesis::make_id(&session_id, iteration, ordinal),
                        output.hypothesis_content,
                        iteration,
                    )
                    .with_literature(output.literature_used),
                );
            }
            self.emit_agent(
                &session_id,
                GENERATION,
                AgentStatus::Completed,
                json!({ "iteration": iteration, "hypotheses": state.pending.len() }),
            )
            .await;

            // Reflection
            if is_cancelled(cancel) {
                return Ok(Flow::Cancelled);
            }
            self.emit_agent(&session_id, REFLECTION, AgentStatus::Running, json!({ "iteration": iteration }))
                .await;
            for hypothesis in state.pending.iter_mut() {
                let reflection = self
                    .stages
                    .reflection
                    .execute(ReflectionInput::new(hypothesis.content.clone(), goal.clone()))
                    .await?;
                reflection.apply_to(hypothesis);
            }
            self.emit_agent(
                &session_id,
                REFLECTION,
                AgentStatus::Completed,
                json!({ "iteration": iteration, "reviewed_hypotheses": state.pending.len() }),
            )
            .await;

            state.settle_pending();
            self.registry.update(&state.session).await;

            // Ranking
            if state.session.hypotheses.len() > 1 {
                if is_cancelled(cancel) {
                    return Ok(Flow::Cancelled);
                }
                self.emit_agent(&session_id, RANKING, AgentStatus::Running, json!({ "iteration": iteration }))
                    .await;
                let outcome = self
                    .stages
                    .ranking
                    .execute(RankingInput::new(state.session.hypotheses.clone(), goal.clone()))
                    .await?;
                apply_ranking(&mut state.session.hypotheses, &outcome.ranked);
                state.comparisons_run += outcome.comparisons.len();
                self.emit_agent(
                    &session_id,
                    RANKING,
                    AgentStatus::Completed,
                    json!({
                        "iteration": iteration,
                        "ranked_hypotheses": outcome.ranked.len(),
                        "rationale": outcome.rationale,
                    }),
                )
                .await;
                self.registry.update(&state.session).await;
            }

            self.emit_session(
                &session_id,
                SessionEventType::IterationComplete,
                json!({
                    "iteration": iteration,
                    "total_hypotheses": state.session.hypotheses.len(),
                }),
            )
            .await;
            info!(iteration, total_hypotheses = state.session.hypotheses.len(), "Iteration complete");

            if iteration < max_iterations && self.config.inter_iteration_pause_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.inter_iteration_pause_ms)).await;
            }
        }
        Ok(Flow::Finished)
    }

    async fn emit_session(&self, session_id: &str, event: SessionEventType, data: Value) {
        let delivered = self
            .broadcaster
            .publish_session_update(session_id, event, data)
            .await;
        debug!(%event, delivered, "Broadcast session event");
    }

    async fn emit_agent(&self, session_id: &str, agent: &str, status: AgentStatus, data: Value) {
        let delivered = self
            .broadcaster
            .publish_agent_update(session_id, agent, status, data)
            .await;
        debug!(agent, %status, delivered, "Broadcast agent event");
    }

    // =========================================================================
    // Lifecycle operations
    // =========================================================================

    fn validate(&self, goal: &str, max_iterations: u32, hypotheses_per_iteration: u32) -> Result<()> {
        if goal.trim().is_empty() {
            return Err(Error::invalid_request("research goal must not be empty"));
        }
        let cap = self.config.max_iterations_cap;
        if max_iterations == 0 || max_iterations > cap {
            return Err(Error::invalid_request(format!(
                "max_iterations must be between 1 and {cap}, got {max_iterations}"
            )));
        }
        let cap = self.config.max_hypotheses_per_iteration_cap;
        if hypotheses_per_iteration == 0 || hypotheses_per_iteration > cap {
            return Err(Error::invalid_request(format!(
                "hypotheses_per_iteration must be between 1 and {cap}, got {hypotheses_per_iteration}"
            )));
        }
        Ok(())
    }

    /// Register a session and run it in the background.
    ///
    /// Returns the new session id immediately.
    pub async fn start_session(
        &self,
        goal: &str,
        max_iterations: u32,
        hypotheses_per_iteration: u32,
    ) -> Result<String> {
        self.validate(goal, max_iterations, hypotheses_per_iteration)?;

        let session_id = Uuid::new_v4().to_string();
        self.registry
            .register(ResearchSession::new(
                &session_id,
                goal,
                max_iterations,
                hypotheses_per_iteration,
            ))
            .await;
        self.emit_session(
            &session_id,
            SessionEventType::ResearchStarted,
            json!({
                "goal": goal,
                "max_iterations": max_iterations,
                "hypotheses_per_iteration": hypotheses_per_iteration,
            }),
        )
        .await;
        info!(session_id = %session_id, "Research session started");

        let this = self.clone();
        let id = session_id.clone();
        let goal = goal.to_string();
        tokio::spawn(async move {
            // The run gets its own task so a panic inside a stage surfaces
            // here as a JoinError instead of leaving the session running.
            let runner = this.clone();
            let run_id = id.clone();
            let handle = tokio::spawn(async move {
                runner
                    .run(&run_id, &goal, max_iterations, hypotheses_per_iteration)
                    .await
            });
            match handle.await {
                Ok(Ok(outcome)) => {
                    this.emit_session(
                        &id,
                        SessionEventType::ResearchCompleted,
                        json!({
                            "total_hypotheses": outcome.session.hypotheses.len(),
                            "status": outcome.session.status,
                        }),
                    )
                    .await;
                }
                Ok(Err(fault)) => {
                    error!(session_id = %id, error = %fault.error, "Background research failed");
                    this.emit_session(
                        &id,
                        SessionEventType::ResearchError,
                        json!({
                            "error": fault.error.to_string(),
                            "status": SessionStatus::Error,
                        }),
                    )
                    .await;
                }
                Err(join_error) => {
                    let message = describe_join_error(join_error);
                    error!(session_id = %id, error = %message, "Background research aborted");
                    this.abort_session(&id, message).await;
                }
            }
        });

        Ok(session_id)
    }

    /// Start a session with the configured iteration and per-iteration counts.
    pub async fn start_session_default(&self, goal: &str) -> Result<String> {
        self.start_session(
            goal,
            self.config.max_iterations,
            self.config.hypotheses_per_iteration,
        )
        .await
    }

    /// Settle a session whose run task died without reporting.
    ///
    /// Keeps the hypotheses of the last snapshot.
    async fn abort_session(&self, session_id: &str, message: String) {
        if let Some(mut snapshot) = self.registry.snapshot(session_id).await {
            snapshot.finish(SessionStatus::Error, Some(message.clone()));
            self.registry.update(&snapshot).await;
        }
        self.emit_session(
            session_id,
            SessionEventType::SessionError,
            json!({ "error": message }),
        )
        .await;
        self.emit_session(
            session_id,
            SessionEventType::ResearchError,
            json!({ "error": message, "status": SessionStatus::Error }),
        )
        .await;
    }

    /// Last-known state of a session.
    pub async fn get_session_status(&self, session_id: &str) -> Option<ResearchSession> {
        self.registry.snapshot(session_id).await
    }

    /// Request cancellation. False for unknown or finished sessions.
    pub async fn cancel_session(&self, session_id: &str) -> bool {
        if !self.registry.request_cancel(session_id).await {
            return false;
        }
        info!(session_id, "Cancellation requested");
        self.emit_session(session_id, SessionEventType::CancelRequested, json!({}))
            .await;
        true
    }

    pub async fn get_orchestrator_stats(&self) -> OrchestratorStats {
        let (active_session_count, total_sessions) = self.registry.counts().await;
        let mut per_agent_stats = self.stages.history().snapshot().await;
        for stage in [GENERATION, REFLECTION, RANKING] {
            per_agent_stats.entry(stage.to_string()).or_default();
        }
        let per_agent_execution_counts = per_agent_stats
            .iter()
            .map(|(name, stats)| (name.clone(), stats.total_executions))
            .collect();
        OrchestratorStats {
            active_session_count,
            total_sessions,
            per_agent_execution_counts,
            per_agent_stats,
        }
    }

    /// Snapshots of every registered session, oldest first.
    pub async fn list_sessions(&self) -> Vec<ResearchSession> {
        self.registry.list().await
    }

    /// Forget a finished session, returning its final snapshot.
    pub async fn remove_session(&self, session_id: &str) -> Result<ResearchSession> {
        let snapshot = self
            .registry
            .snapshot(session_id)
            .await
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        if !snapshot.status.is_terminal() {
            return Err(Error::invalid_request(format!(
                "session {session_id} is still {}",
                snapshot.status
            )));
        }
        self.registry.remove(session_id).await;
        Ok(snapshot)
    }
}
