//! BM25 lexical index
//!
//! Sparse index over title, summary, body, and tags with per-field weights.
//! Incrementally updatable on node create/update/delete. Scores are min-max
//! normalized to [0, 1] per query across the returned set, so lexical scores
//! fuse cleanly with dense similarity.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::mathx::min_max_normalize;
use crate::memory::{Lifecycle, NodeFilters, NodeType};

/// BM25 k1 parameter (term-frequency saturation)
pub const BM25_K1: f64 = 1.2;
/// BM25 b parameter (length normalization)
pub const BM25_B: f64 = 0.75;

/// Stop words stripped during tokenization
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "in",
    "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "were", "with",
];

// ============================================================================
// TOKENIZATION
// ============================================================================

/// Tokenize text: lowercase, Unicode word boundaries, strip punctuation,
/// drop stop words and single-character tokens
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|token| token.to_lowercase())
        .filter(|token| token.chars().count() > 1)
        .filter(|token| !STOP_WORDS.contains(&token.as_str()))
        .collect()
}

// ============================================================================
// FIELD WEIGHTS
// ============================================================================

/// Per-field weighting applied to term frequencies
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldWeights {
    /// Title weight
    pub title: f64,
    /// Summary weight
    pub summary: f64,
    /// Tags weight
    pub tags: f64,
    /// Body weight
    pub body: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            title: 2.0,
            summary: 1.5,
            tags: 1.5,
            body: 1.0,
        }
    }
}

/// The text fields of a node as seen by the index
#[derive(Debug, Clone)]
pub struct IndexedFields {
    /// Node title
    pub title: String,
    /// Node summary
    pub summary: Option<String>,
    /// Node body
    pub body: Option<String>,
    /// Node tags
    pub tags: Vec<String>,
    /// Node type, for filtered search
    pub node_type: NodeType,
    /// Lifecycle, for filtered search
    pub lifecycle: Lifecycle,
    /// Primary cluster, for filtered search
    pub cluster_id: Option<String>,
    /// Primary timestamp, for time-range filters
    pub primary_timestamp: DateTime<Utc>,
}

/// A lexical search hit with its normalized score
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    /// Matching node id
    pub node_id: String,
    /// BM25 score normalized to [0, 1] within this query's result set
    pub score: f64,
}

// ============================================================================
// INDEX
// ============================================================================

#[derive(Debug, Clone)]
struct DocEntry {
    /// Field-weighted term frequencies
    term_freqs: HashMap<String, f64>,
    /// Field-weighted document length
    weighted_len: f64,
    node_type: NodeType,
    lifecycle: Lifecycle,
    cluster_id: Option<String>,
    primary_timestamp: DateTime<Utc>,
}

/// Incrementally updatable BM25 index
///
/// Writers must serialize (the engine wraps the index in an `RwLock`);
/// readers operate on whatever consistent state the lock hands them.
#[derive(Debug, Default)]
pub struct Bm25Index {
    weights: FieldWeights,
    docs: HashMap<String, DocEntry>,
    /// term -> doc id -> weighted term frequency
    postings: HashMap<String, HashMap<String, f64>>,
    total_weighted_len: f64,
}

impl Bm25Index {
    /// Empty index with default field weights
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty index with custom field weights
    pub fn with_weights(weights: FieldWeights) -> Self {
        Self {
            weights,
            ..Self::default()
        }
    }

    /// Number of indexed documents
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Insert or replace a document
    pub fn upsert(&mut self, node_id: &str, fields: &IndexedFields) {
        self.remove(node_id);

        let mut term_freqs: HashMap<String, f64> = HashMap::new();
        let mut weighted_len = 0.0;

        let mut absorb = |text: &str, weight: f64, term_freqs: &mut HashMap<String, f64>| {
            let tokens = tokenize(text);
            weighted_len += tokens.len() as f64 * weight;
            for token in tokens {
                *term_freqs.entry(token).or_default() += weight;
            }
        };

        absorb(&fields.title, self.weights.title, &mut term_freqs);
        if let Some(summary) = &fields.summary {
            absorb(summary, self.weights.summary, &mut term_freqs);
        }
        if let Some(body) = &fields.body {
            absorb(body, self.weights.body, &mut term_freqs);
        }
        for tag in &fields.tags {
            absorb(tag, self.weights.tags, &mut term_freqs);
        }

        for (term, freq) in &term_freqs {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(node_id.to_string(), *freq);
        }
        self.total_weighted_len += weighted_len;
        self.docs.insert(
            node_id.to_string(),
            DocEntry {
                term_freqs,
                weighted_len,
                node_type: fields.node_type,
                lifecycle: fields.lifecycle,
                cluster_id: fields.cluster_id.clone(),
                primary_timestamp: fields.primary_timestamp,
            },
        );
    }

    /// Remove a document; a no-op when absent
    pub fn remove(&mut self, node_id: &str) {
        let Some(entry) = self.docs.remove(node_id) else {
            return;
        };
        self.total_weighted_len -= entry.weighted_len;
        for term in entry.term_freqs.keys() {
            if let Some(posting) = self.postings.get_mut(term) {
                posting.remove(node_id);
                if posting.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
    }

    /// Search the index, honoring the node filters
    ///
    /// Returns hits sorted by descending score, min-max normalized to [0, 1]
    /// across the returned set.
    pub fn search(&self, query: &str, filters: &NodeFilters, limit: usize) -> Vec<LexicalHit> {
        let terms = tokenize(query);
        if terms.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        let doc_count = self.docs.len() as f64;
        let avg_len = (self.total_weighted_len / doc_count).max(1.0);
        let mut scores: HashMap<&str, f64> = HashMap::new();

        for term in &terms {
            let Some(posting) = self.postings.get(term) else {
                continue;
            };
            let df = posting.len() as f64;
            // BM25+ style idf, floored at zero for very common terms
            let idf = ((doc_count - df + 0.5) / (df + 0.5) + 1.0).ln().max(0.0);

            for (doc_id, tf) in posting {
                let entry = &self.docs[doc_id];
                if !self.passes_filters(entry, filters) {
                    continue;
                }
                let numerator = tf * (BM25_K1 + 1.0);
                let denominator =
                    tf + BM25_K1 * (1.0 - BM25_B + BM25_B * entry.weighted_len / avg_len);
                *scores.entry(doc_id.as_str()).or_default() += idf * numerator / denominator;
            }
        }

        let mut ranked: Vec<(String, f64)> = scores
            .into_iter()
            .map(|(id, score)| (id.to_string(), score))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(limit);

        min_max_normalize(&mut ranked);
        ranked
            .into_iter()
            .map(|(node_id, score)| LexicalHit { node_id, score })
            .collect()
    }

    fn passes_filters(&self, entry: &DocEntry, filters: &NodeFilters) -> bool {
        if let Some(types) = &filters.types {
            if !types.contains(&entry.node_type) {
                return false;
            }
        }
        if let Some(lifecycles) = &filters.lifecycle {
            if !lifecycles.contains(&entry.lifecycle) {
                return false;
            }
        }
        if let Some(clusters) = &filters.clusters {
            match &entry.cluster_id {
                Some(c) if clusters.contains(c) => {}
                _ => return false,
            }
        }
        if let Some(range) = &filters.time_range {
            if !range.contains(entry.primary_timestamp) {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// TESTS
// ============================================================================
