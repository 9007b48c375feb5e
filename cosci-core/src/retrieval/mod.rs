//! Multi-provider literature retrieval.
//!
//! For each hypothesis the engine:
//!
//! 1. classifies the goal into a [`ResearchDomain`] to frame prompts,
//! 2. picks a [`Directive`] from a rotating list of strategies so
//!    successive hypotheses look at the literature from different angles,
//! 3. asks the model for a [`SearchPlan`], falling back to a deterministic
//!    plan when the reply is unusable,
//! 4. fans the plan out across providers concurrently, substituting each
//!    provider's mock results where it fails,
//! 5. deduplicates by title prefix and orders by query priority.

mod directive;
mod domain;
mod engine;
mod plan;
mod rank;

#[cfg(test)]
mod proptest;

pub use directive::{
    global_index, select_directive, strategy_for, Directive, DiversificationStrategy,
};
pub use domain::{DomainContext, ResearchDomain};
pub use engine::{ProviderSet, RetrievalOutcome, RetrievalStrategyEngine, SearchOutcome};
pub use plan::{fallback_plan, iteration_focus, parse_plan, Priority, SearchPlan, SearchQuery};
pub use rank::{dedup_key, deduplicate, prioritize, priority_score, DEFAULT_DEDUP_KEY_CHARS};
