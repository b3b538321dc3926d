//! Lexical substring fallback
//!
//! When spreading activation fails outright (seed generation throws, the
//! graph adapter errors), retrieval degrades to a plain case-insensitive
//! substring match over node text, filtered the same way and ordered by
//! creation time descending. The response metadata reports that the
//! fallback path was taken.

use crate::memory::{MemoryNode, NodeFilters};

/// Substring-match fallback over a node snapshot
///
/// Respects the same `limit` bound and filters as the main path.
pub fn substring_fallback<'a>(
    nodes: impl Iterator<Item = &'a MemoryNode>,
    query: &str,
    filters: &NodeFilters,
    limit: usize,
) -> Vec<String> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut matches: Vec<&MemoryNode> = nodes
        .filter(|node| filters.matches(node))
        .filter(|node| {
            node.searchable_text().to_lowercase().contains(&needle)
                || node
                    .tags
                    .iter()
                    .any(|tag| tag.to_lowercase().contains(&needle))
        })
        .collect();

    matches.sort_by(|a, b| {
        b.provenance
            .created_at
            .cmp(&a.provenance.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    matches.truncate(limit);
    matches.into_iter().map(|node| node.id.clone()).collect()
}

// ============================================================================
// TESTS
// ============================================================================
