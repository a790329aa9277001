//! Substring search over concepts.
//!
//! A concept matches when the query occurs in any of its textual fields:
//!
//! - `name`, `description`, each entry of `examples`;
//! - for every sub-concept: `name`, `description`, each of `examples`.
//!
//! There is no tokenization, ranking, or scoring. Results keep the input
//! order. Matching is case-insensitive unless
//! [`SearchOptions::case_sensitive`] is set. A blank query matches nothing.

use crate::models::Concept;

#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    /// Truncate the result after filtering.
    pub limit: Option<usize>,
}

/// Return the concepts whose text contains `query`.
pub fn search_concepts<'a>(
    query: &str,
    concepts: &'a [Concept],
    options: SearchOptions,
) -> Vec<&'a Concept> {
    if query.trim().is_empty() {
        return Vec::new();
    }
    let needle = if options.case_sensitive {
        query.to_string()
    } else {
        query.to_lowercase()
    };

    let matches = concepts
        .iter()
        .filter(|c| concept_matches(c, &needle, options.case_sensitive));
    match options.limit {
        Some(limit) => matches.take(limit).collect(),
        None => matches.collect(),
    }
}

/// `needle` must already be lowercased when `case_sensitive` is false.
pub fn concept_matches(concept: &Concept, needle: &str, case_sensitive: bool) -> bool {
    let contains = |text: &str| {
        if case_sensitive {
            text.contains(needle)
        } else {
            text.to_lowercase().contains(needle)
        }
    };

    contains(&concept.name)
        || contains(&concept.description)
        || concept.examples.iter().any(|e| contains(e))
        || concept.sub_concepts.iter().any(|sub| {
            contains(&sub.name)
                || contains(&sub.description)
                || sub.examples.iter().any(|e| contains(e))
        })
}
