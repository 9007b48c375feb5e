//! Merge post-processing: deduplication and priority ordering.

use std::collections::HashSet;

use crate::literature::{Paper, SourceKind};

/// Default number of title characters compared when deduplicating.
pub const DEFAULT_DEDUP_KEY_CHARS: usize = 50;

/// Dedup key: leading `key_chars` characters of the trimmed, lower-cased title.
pub fn dedup_key(title: &str, key_chars: usize) -> String {
    title.trim().to_lowercase().chars().take(key_chars).collect()
}

/// Drop papers whose title key was already seen. First occurrence wins.
///
/// Untitled papers get a synthetic key and are never collapsed.
pub fn deduplicate(papers: Vec<Paper>, key_chars: usize) -> Vec<Paper> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(papers.len());

    for paper in papers {
        let key = dedup_key(&paper.title, key_chars);
        let key = if key.is_empty() {
            format!("\0untitled_{}", unique.len())
        } else {
            key
        };
        if seen.insert(key) {
            unique.push(paper);
        }
    }
    unique
}

/// Composite score used to order merged results.
pub fn priority_score(paper: &Paper) -> f64 {
    let mut score = paper.search_priority.unwrap_or_default().weight();
    let search_type = paper.search_type.as_deref().unwrap_or("");
    if search_type.contains("primary") {
        score += 1.0;
    }
    if search_type.contains("exact") {
        score += 0.5;
    }
    if paper.source == SourceKind::PubMed {
        score += 0.2;
    }
    score
}

/// Stable sort by [`priority_score`], highest first.
pub fn prioritize(mut papers: Vec<Paper>) -> Vec<Paper> {
    papers.sort_by(|a, b| priority_score(b).total_cmp(&priority_score(a)));
    papers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::Priority;

    fn tagged(title: &str, source: SourceKind, query_type: &str, priority: Priority) -> Paper {
        Paper::new(title, source).with_search_context(query_type, priority, "q")
    }

    #[test]
    fn test_dedup_key_truncates_lowercased_title() {
        let long = "A".repeat(80);
        assert_eq!(dedup_key(&long, 50), "a".repeat(50));
        assert_eq!(dedup_key("  Mixed Case  ", 50), "mixed case");
    }

    #[test]
    fn test_deduplicate_first_occurrence_wins() {
        let prefix = "x".repeat(50);
        let papers = vec![
            Paper::new(format!("{}first", prefix), SourceKind::Perplexity),
            Paper::new(format!("{}SECOND", prefix.to_uppercase()), SourceKind::PubMed),
            Paper::new("Other", SourceKind::Scholar),
        ];
        let unique = deduplicate(papers, 50);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].source, SourceKind::Perplexity);
    }

    #[test]
    fn test_untitled_papers_never_collapse() {
        let papers = vec![
            Paper::new("", SourceKind::Perplexity),
            Paper::new("   ", SourceKind::PubMed),
            Paper::new("", SourceKind::Scholar),
        ];
        assert_eq!(deduplicate(papers, 50).len(), 3);
    }

    #[test]
    fn test_untitled_key_cannot_collide_with_real_title() {
        let papers = vec![
            Paper::new("untitled_0", SourceKind::Perplexity),
            Paper::new("", SourceKind::PubMed),
        ];
        assert_eq!(deduplicate(papers, 50).len(), 2);
    }

    #[test]
    fn test_priority_score_components() {
        let p = tagged("a", SourceKind::Perplexity, "primary", Priority::High);
        assert_eq!(priority_score(&p), 4.0);
        let p = tagged("b", SourceKind::PubMed, "exact", Priority::High);
        assert!((priority_score(&p) - 3.7).abs() < 1e-9);
        let p = tagged("c", SourceKind::Scholar, "academic", Priority::Low);
        assert_eq!(priority_score(&p), 1.0);
        let untagged = Paper::new("d", SourceKind::Scholar);
        assert_eq!(priority_score(&untagged), 2.0);
    }

    #[test]
    fn test_prioritize_is_stable() {
        let papers = vec![
            tagged("m1", SourceKind::Scholar, "academic", Priority::Medium),
            tagged("h", SourceKind::Perplexity, "primary", Priority::High),
            tagged("m2", SourceKind::Scholar, "academic", Priority::Medium),
        ];
        let titles: Vec<_> = prioritize(papers).into_iter().map(|p| p.title).collect();
        assert_eq!(titles, vec!["h", "m1", "m2"]);
    }
}
