//! Property-based tests for retrieval using proptest.
//!
//! - Deduplication is idempotent and never grows its input
//! - Directive selection is a pure function of its inputs
//! - Global indices congruent modulo the strategy count share a strategy
//! - Prioritization is a permutation ordered by score

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::literature::{Paper, SourceKind};
    use crate::retrieval::{
        deduplicate, prioritize, priority_score, select_directive, strategy_for,
        DiversificationStrategy, Priority,
    };

    fn source() -> impl Strategy<Value = SourceKind> {
        prop_oneof![
            Just(SourceKind::Perplexity),
            Just(SourceKind::PubMed),
            Just(SourceKind::Scholar),
        ]
    }

    fn priority() -> impl Strategy<Value = Priority> {
        prop_oneof![Just(Priority::High), Just(Priority::Medium), Just(Priority::Low)]
    }

    // Short alphabets so collisions actually happen
    fn title() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            "[aAbB ]{0,8}",
            "[a-c]{45,60}",
        ]
    }

    fn paper() -> impl Strategy<Value = Paper> {
        (
            title(),
            source(),
            priority(),
            prop_oneof![Just("primary"), Just("exact"), Just("expanded"), Just("academic")],
        )
            .prop_map(|(title, source, priority, query_type)| {
                Paper::new(title, source).with_search_context(query_type, priority, "q")
            })
    }

    proptest! {
        #[test]
        fn dedup_is_idempotent(papers in prop::collection::vec(paper(), 0..40), key in 1usize..60) {
            let once = deduplicate(papers.clone(), key);
            let twice = deduplicate(once.clone(), key);
            prop_assert_eq!(&once, &twice);
            prop_assert!(once.len() <= papers.len());
        }

        #[test]
        fn dedup_keeps_every_untitled_paper(papers in prop::collection::vec(paper(), 0..40)) {
            let untitled_in = papers.iter().filter(|p| p.title.trim().is_empty()).count();
            let out = deduplicate(papers, 50);
            let untitled_out = out.iter().filter(|p| p.title.trim().is_empty()).count();
            prop_assert_eq!(untitled_in, untitled_out);
        }

        #[test]
        fn prioritize_orders_by_score(papers in prop::collection::vec(paper(), 0..40)) {
            let n = papers.len();
            let sorted = prioritize(papers);
            prop_assert_eq!(sorted.len(), n);
            for pair in sorted.windows(2) {
                prop_assert!(priority_score(&pair[0]) >= priority_score(&pair[1]));
            }
        }

        #[test]
        fn directive_is_deterministic(iteration in 1u32..50, total in 1usize..8, offset in 0usize..8) {
            let index = offset % total;
            prop_assert_eq!(
                select_directive(iteration, index, total),
                select_directive(iteration, index, total)
            );
        }

        #[test]
        fn congruent_indices_share_strategy(base in 0usize..1000, k in 0usize..50) {
            let len = DiversificationStrategy::ALL.len();
            prop_assert_eq!(strategy_for(base), strategy_for(base + k * len));
        }
    }
}
