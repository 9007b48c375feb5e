//! Property-based tests for stage scoring using proptest.
//!
//! - Tournament points always sum to one per comparison
//! - Tournament order is a permutation, descending, stable on ties
//! - Parsed scores always land in `[0.0, 1.0]`

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::config::RankingConfig;
    use crate::stage::{
        order_by_points, parse_critique, parse_unit_score, tally_points, Comparison, Winner,
    };

    fn winner() -> impl Strategy<Value = Winner> {
        prop_oneof![Just(Winner::A), Just(Winner::B), Just(Winner::Tie)]
    }

    /// A full round-robin over `n` entrants with arbitrary verdicts.
    fn tournament() -> impl Strategy<Value = (usize, Vec<Comparison>)> {
        (0usize..9).prop_flat_map(|n| {
            let pairs: Vec<(usize, usize)> = (0..n)
                .flat_map(|a| ((a + 1)..n).map(move |b| (a, b)))
                .collect();
            let len = pairs.len();
            prop::collection::vec(winner(), len).prop_map(move |winners| {
                let comparisons = pairs
                    .iter()
                    .zip(winners)
                    .map(|(&(a, b), winner)| Comparison {
                        a,
                        b,
                        winner,
                        reasoning: String::new(),
                    })
                    .collect();
                (n, comparisons)
            })
        })
    }

    proptest! {
        #[test]
        fn points_sum_to_comparison_count((n, comparisons) in tournament()) {
            let points = tally_points(n, &comparisons, &RankingConfig::default());
            let total: f64 = points.iter().sum();
            let expected = (n * n.saturating_sub(1) / 2) as f64;
            prop_assert!((total - expected).abs() < 1e-9);
        }

        #[test]
        fn order_is_stable_descending_permutation((n, comparisons) in tournament()) {
            let points = tally_points(n, &comparisons, &RankingConfig::default());
            let order = order_by_points(&points);

            let mut seen = order.clone();
            seen.sort_unstable();
            prop_assert_eq!(seen, (0..n).collect::<Vec<_>>());

            for pair in order.windows(2) {
                let (x, y) = (pair[0], pair[1]);
                prop_assert!(points[x] >= points[y]);
                if points[x] == points[y] {
                    prop_assert!(x < y);
                }
            }
        }

        #[test]
        fn unit_scores_are_clamped(value in -1.0e6f64..1.0e6) {
            let parsed = parse_unit_score(&format!("{value}")).unwrap();
            prop_assert!((0.0..=1.0).contains(&parsed));
        }

        #[test]
        fn critique_score_always_in_range(text in "\\PC{0,200}") {
            let critique = parse_critique(&format!("SCORE: {text}"));
            prop_assert!((0.0..=1.0).contains(&critique.score));
        }
    }
}
