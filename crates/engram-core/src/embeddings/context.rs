//! Context prefixes for embedding
//!
//! Raw content embeds poorly: "Q3 numbers look fine" means nothing without
//! knowing it came from a meeting episode in the finance cluster. Each node
//! type gets a typed natural-language preamble carrying provenance cues, and
//! the combined text is hashed so re-embedding triggers when context changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::stable_hash_hex;
use crate::memory::NodeType;

/// Minimum raw content length before expansion kicks in
pub const MIN_CONTENT_CHARS: usize = 10;
/// Minimum total (prefix + content) length after expansion
pub const MIN_PREFIXED_CHARS: usize = 50;

// ============================================================================
// CONTEXT KINDS
// ============================================================================

/// Which prefix template applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    /// Concept extracted from an episode
    ConceptExtracted,
    /// Concept entered by hand
    ConceptManual,
    /// An episode (meeting, conversation, event)
    Episode,
    /// A chunk of a larger document
    DocumentChunk,
    /// A section of a structured document
    Section,
    /// A free-standing note
    Note,
    /// Raw archived material
    RawArchive,
    /// A search query
    Query,
}

impl ContextKind {
    /// Select the template from node type and source-type hint
    pub fn select(node_type: NodeType, source_type: Option<&str>) -> Self {
        match node_type {
            NodeType::Concept => match source_type {
                Some("manual") => ContextKind::ConceptManual,
                _ => ContextKind::ConceptExtracted,
            },
            NodeType::Episode => ContextKind::Episode,
            NodeType::Archive => match source_type {
                Some("chunk") => ContextKind::DocumentChunk,
                _ => ContextKind::RawArchive,
            },
            NodeType::Query => ContextKind::Query,
            NodeType::Summary | NodeType::Cluster => match source_type {
                Some("chunk") => ContextKind::DocumentChunk,
                Some("section") => ContextKind::Section,
                _ => ContextKind::Note,
            },
        }
    }
}

// ============================================================================
// CONTEXT INPUT
// ============================================================================

/// Slot values available to the templates
#[derive(Debug, Clone, Default)]
pub struct ContextInput {
    /// Node title
    pub title: String,
    /// Primary cluster name
    pub cluster_name: Option<String>,
    /// Primary cluster description
    pub cluster_description: Option<String>,
    /// Primary cluster keywords
    pub cluster_keywords: Vec<String>,
    /// Title of the episode the content was extracted from
    pub source_episode_title: Option<String>,
    /// (index, total) position of a document chunk
    pub chunk_position: Option<(usize, usize)>,
    /// Event time of the episode
    pub event_time: Option<DateTime<Utc>>,
    /// Episode participants
    pub participants: Vec<String>,
}

/// A built context: the prefix, the full text to embed, and its hash
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltContext {
    /// The prefix actually prepended for embedding
    pub prefix: String,
    /// Prefix plus content, the exact embedding input
    pub text: String,
    /// Stable hash over the embedding input
    pub hash: String,
}

// ============================================================================
// TEMPLATE FILLING
// ============================================================================

/// Build the context-prefixed embedding input for a node or query
///
/// Content below `MIN_CONTENT_CHARS` is expanded with cluster name,
/// description, and keywords until the combined text reaches
/// `MIN_PREFIXED_CHARS`, so near-empty nodes still embed into the right
/// neighborhood.
pub fn build_context(kind: ContextKind, input: &ContextInput, content: &str) -> BuiltContext {
    let mut prefix = fill_template(kind, input);

    if content.chars().count() < MIN_CONTENT_CHARS {
        expand_prefix(&mut prefix, input, content);
    }

    let text = if content.is_empty() {
        prefix.clone()
    } else {
        format!("{prefix}\n{content}")
    };
    let hash = stable_hash_hex(&text);

    BuiltContext { prefix, text, hash }
}

fn fill_template(kind: ContextKind, input: &ContextInput) -> String {
    let cluster = input.cluster_name.as_deref().unwrap_or("general");
    match kind {
        ContextKind::ConceptExtracted => match &input.source_episode_title {
            Some(episode) => format!(
                "Concept \"{}\" in {} (extracted from \"{}\"):",
                input.title, cluster, episode
            ),
            None => format!("Concept \"{}\" in {}:", input.title, cluster),
        },
        ContextKind::ConceptManual => {
            format!("User-written concept \"{}\" in {}:", input.title, cluster)
        }
        ContextKind::Episode => {
            let mut parts = vec![format!("Episode \"{}\"", input.title)];
            if let Some(at) = input.event_time {
                parts.push(format!("on {}", at.format("%Y-%m-%d")));
            }
            if !input.participants.is_empty() {
                parts.push(format!("with {}", input.participants.join(", ")));
            }
            parts.push(format!("in {cluster}:"));
            parts.join(" ")
        }
        ContextKind::DocumentChunk => match input.chunk_position {
            Some((index, total)) => format!(
                "Document chunk {} of {} from \"{}\":",
                index + 1,
                total,
                input.title
            ),
            None => format!("Document chunk from \"{}\":", input.title),
        },
        ContextKind::Section => format!("Section \"{}\" in {}:", input.title, cluster),
        ContextKind::Note => format!("Note \"{}\" in {}:", input.title, cluster),
        ContextKind::RawArchive => format!("Archived material \"{}\":", input.title),
        ContextKind::Query => "Search query:".to_string(),
    }
}

fn expand_prefix(prefix: &mut String, input: &ContextInput, content: &str) {
    let mut expansions: Vec<String> = Vec::new();
    if let Some(description) = &input.cluster_description {
        expansions.push(description.clone());
    }
    if !input.cluster_keywords.is_empty() {
        expansions.push(format!("Topics: {}", input.cluster_keywords.join(", ")));
    }

    for expansion in expansions {
        if prefix.chars().count() + content.chars().count() >= MIN_PREFIXED_CHARS {
            break;
        }
        prefix.push(' ');
        prefix.push_str(&expansion);
    }

    // Last resort: pad with the title so the hash input is still unique
    while prefix.chars().count() + content.chars().count() < MIN_PREFIXED_CHARS {
        prefix.push(' ');
        prefix.push_str(&input.title);
        if input.title.is_empty() {
            break;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_kind_selection() {
        assert_eq!(
            ContextKind::select(NodeType::Concept, Some("manual")),
            ContextKind::ConceptManual
        );
        assert_eq!(
            ContextKind::select(NodeType::Concept, Some("extraction")),
            ContextKind::ConceptExtracted
        );
        assert_eq!(
            ContextKind::select(NodeType::Episode, None),
            ContextKind::Episode
        );
        assert_eq!(
            ContextKind::select(NodeType::Archive, Some("chunk")),
            ContextKind::DocumentChunk
        );
        assert_eq!(
            ContextKind::select(NodeType::Archive, None),
            ContextKind::RawArchive
        );
        assert_eq!(
            ContextKind::select(NodeType::Query, None),
            ContextKind::Query
        );
    }

    #[test]
    fn test_episode_template_slots() {
        let input = ContextInput {
            title: "Planning sync".to_string(),
            cluster_name: Some("work".to_string()),
            event_time: Some(Utc.with_ymd_and_hms(2026, 4, 2, 10, 0, 0).unwrap()),
            participants: vec!["Ada".to_string(), "Lin".to_string()],
            ..Default::default()
        };

        let built = build_context(ContextKind::Episode, &input, "Discussed roadmap priorities.");
        assert!(built.prefix.contains("Planning sync"));
        assert!(built.prefix.contains("2026-04-02"));
        assert!(built.prefix.contains("Ada, Lin"));
        assert!(built.prefix.contains("work"));
        assert!(built.text.ends_with("Discussed roadmap priorities."));
    }

    #[test]
    fn test_short_content_expands_to_minimum() {
        let input = ContextInput {
            title: "x".to_string(),
            cluster_name: Some("health".to_string()),
            cluster_description: Some("Exercise, sleep, and nutrition notes".to_string()),
            cluster_keywords: vec!["running".to_string(), "sleep".to_string()],
            ..Default::default()
        };

        let built = build_context(ContextKind::Note, &input, "ok");
        assert!(built.text.chars().count() >= MIN_PREFIXED_CHARS);
        assert!(built.prefix.contains("Exercise"));
    }

    #[test]
    fn test_hash_changes_with_context() {
        let mut input = ContextInput {
            title: "Kubernetes upgrade".to_string(),
            cluster_name: Some("infra".to_string()),
            ..Default::default()
        };
        let first = build_context(ContextKind::Note, &input, "Upgrade cluster to 1.31");

        input.cluster_name = Some("platform".to_string());
        let second = build_context(ContextKind::Note, &input, "Upgrade cluster to 1.31");

        assert_ne!(first.hash, second.hash);
        // Same inputs rehash identically
        let again = build_context(ContextKind::Note, &input, "Upgrade cluster to 1.31");
        assert_eq!(second.hash, again.hash);
    }

    #[test]
    fn test_chunk_position_is_one_based_in_text() {
        let input = ContextInput {
            title: "Q3 report".to_string(),
            chunk_position: Some((0, 4)),
            ..Default::default()
        };
        let built = build_context(ContextKind::DocumentChunk, &input, "Revenue grew 12%.");
        assert!(built.prefix.contains("chunk 1 of 4"));
    }
}
