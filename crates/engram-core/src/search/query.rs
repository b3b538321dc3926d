//! Query analysis
//!
//! Detects time references, strips filler, infers expected node types, and
//! classifies the query so ABS can budget it. A query that is nothing but a
//! time reference skips embedding entirely.

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use regex::Regex;

use crate::budget::QueryType;
use crate::memory::{NodeType, TimeRange};

/// Filler words stripped before seeding
pub const FILLER_WORDS: &[&str] = &[
    "show", "me", "find", "search", "for", "about", "tell", "what", "did", "do", "i", "my",
    "the", "a", "an", "please", "know", "anything", "everything", "stuff",
];

// ============================================================================
// TEMPORAL PATTERNS
// ============================================================================

struct TemporalPattern {
    regex: Regex,
    resolve: fn(&regex::Captures<'_>, DateTime<Utc>) -> Option<TimeRange>,
}

fn day_range(day_start: DateTime<Utc>) -> TimeRange {
    TimeRange {
        start: Some(day_start),
        end: Some(day_start + Duration::days(1)),
    }
}

fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at - Duration::seconds(i64::from(at.time().num_seconds_from_midnight()))
}

fn temporal_patterns() -> &'static Vec<TemporalPattern> {
    static PATTERNS: OnceLock<Vec<TemporalPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            TemporalPattern {
                regex: Regex::new(r"(?i)\byesterday\b").expect("static regex"),
                resolve: |_, now| Some(day_range(start_of_day(now) - Duration::days(1))),
            },
            TemporalPattern {
                regex: Regex::new(r"(?i)\btoday\b").expect("static regex"),
                resolve: |_, now| Some(day_range(start_of_day(now))),
            },
            TemporalPattern {
                regex: Regex::new(r"(?i)\blast\s+week\b").expect("static regex"),
                resolve: |_, now| {
                    Some(TimeRange {
                        start: Some(start_of_day(now) - Duration::days(7)),
                        end: Some(now),
                    })
                },
            },
            TemporalPattern {
                regex: Regex::new(r"(?i)\blast\s+month\b").expect("static regex"),
                resolve: |_, now| {
                    Some(TimeRange {
                        start: Some(start_of_day(now) - Duration::days(30)),
                        end: Some(now),
                    })
                },
            },
            TemporalPattern {
                regex: Regex::new(
                    r"(?i)\blast\s+(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
                )
                .expect("static regex"),
                resolve: |caps, now| {
                    let target = parse_weekday(&caps[1])?;
                    let today = now.weekday().num_days_from_monday() as i64;
                    let wanted = target.num_days_from_monday() as i64;
                    let mut back = today - wanted;
                    if back <= 0 {
                        back += 7;
                    }
                    Some(day_range(start_of_day(now) - Duration::days(back)))
                },
            },
            TemporalPattern {
                regex: Regex::new(r"(?i)\b(\d{1,3})\s+days?\s+ago\b").expect("static regex"),
                resolve: |caps, now| {
                    let days: i64 = caps[1].parse().ok()?;
                    Some(day_range(start_of_day(now) - Duration::days(days)))
                },
            },
            TemporalPattern {
                regex: Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("static regex"),
                resolve: |caps, _| {
                    use chrono::TimeZone;
                    let year: i32 = caps[1].parse().ok()?;
                    let month: u32 = caps[2].parse().ok()?;
                    let day: u32 = caps[3].parse().ok()?;
                    let start = Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).single()?;
                    Some(day_range(start))
                },
            },
        ]
    })
}

fn parse_weekday(name: &str) -> Option<chrono::Weekday> {
    name.to_lowercase().parse().ok()
}

// ============================================================================
// ANALYSIS
// ============================================================================

/// The result of analyzing a raw query string
#[derive(Debug, Clone)]
pub struct QueryAnalysis {
    /// The original query
    pub original: String,
    /// Query with time references and filler removed
    pub cleaned: String,
    /// Matched time-reference texts
    pub temporal_refs: Vec<String>,
    /// Resolved time-range filter, when any reference resolved
    pub time_range: Option<TimeRange>,
    /// Node types the wording implies
    pub expected_types: Vec<NodeType>,
    /// True when nothing semantic remains after removing time references
    pub purely_temporal: bool,
    /// Classified query type for budgeting
    pub query_type: QueryType,
    /// Classification confidence
    pub confidence: f64,
}

/// Analyze a query at the given instant
pub fn analyze_query(query: &str, now: DateTime<Utc>) -> QueryAnalysis {
    let mut remainder = query.to_string();
    let mut temporal_refs = Vec::new();
    let mut time_range: Option<TimeRange> = None;

    for pattern in temporal_patterns() {
        while let Some((range, matched)) = pattern
            .regex
            .find(&remainder)
            .map(|m| (m.range(), m.as_str().to_string()))
        {
            if time_range.is_none() {
                if let Some(caps) = pattern.regex.captures(&remainder) {
                    time_range = (pattern.resolve)(&caps, now);
                }
            }
            temporal_refs.push(matched);
            remainder.replace_range(range, "");
        }
    }

    let cleaned: String = remainder
        .split_whitespace()
        .filter(|word| {
            let bare: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            !bare.is_empty() && !FILLER_WORDS.contains(&bare.as_str())
        })
        .collect::<Vec<_>>()
        .join(" ");

    let purely_temporal = !temporal_refs.is_empty() && cleaned.is_empty();
    let expected_types = infer_types(&query.to_lowercase());
    let (query_type, confidence) = classify(query, &cleaned, &temporal_refs);

    QueryAnalysis {
        original: query.to_string(),
        cleaned,
        temporal_refs,
        time_range,
        expected_types,
        purely_temporal,
        query_type,
        confidence,
    }
}

fn infer_types(lower: &str) -> Vec<NodeType> {
    let mut types = Vec::new();
    let episodic = [
        "meeting", "call", "conversation", "talked", "discussed", "happened", "standup", "went",
    ];
    let conceptual = ["concept", "definition", "idea", "note", "fact", "how to", "howto"];

    if episodic.iter().any(|k| lower.contains(k)) {
        types.push(NodeType::Episode);
    }
    if conceptual.iter().any(|k| lower.contains(k)) {
        types.push(NodeType::Concept);
    }
    if lower.contains("summary") || lower.contains("overview") {
        types.push(NodeType::Summary);
    }
    types
}

fn classify(original: &str, cleaned: &str, temporal_refs: &[String]) -> (QueryType, f64) {
    let lower = original.to_lowercase();
    let content_words = cleaned.split_whitespace().count();

    if !temporal_refs.is_empty() && content_words <= 1 {
        return (QueryType::Temporal, 0.9);
    }

    let exploratory_markers = ["everything", "anything", "related to", "explore", "around"];
    if exploratory_markers.iter().any(|m| lower.contains(m)) {
        return (QueryType::Exploratory, 0.75);
    }

    let reasoning_markers = ["why", "how", "explain", "compare", "difference"];
    if reasoning_markers.iter().any(|m| lower.contains(m)) {
        return (QueryType::Reasoning, 0.8);
    }

    if !temporal_refs.is_empty() {
        return (QueryType::Temporal, 0.6);
    }

    if content_words <= 4 {
        (QueryType::Lookup, 0.7)
    } else {
        (QueryType::Reasoning, 0.55)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        // A Friday
        Utc.with_ymd_and_hms(2026, 7, 31, 15, 30, 0).unwrap()
    }

    #[test]
    fn test_yesterday_resolves_to_previous_day() {
        let analysis = analyze_query("what did I do yesterday", now());
        assert_eq!(analysis.temporal_refs, vec!["yesterday"]);
        let range = analysis.time_range.unwrap();
        assert_eq!(
            range.start.unwrap(),
            Utc.with_ymd_and_hms(2026, 7, 30, 0, 0, 0).unwrap()
        );
        assert_eq!(
            range.end.unwrap(),
            Utc.with_ymd_and_hms(2026, 7, 31, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_purely_temporal_query() {
        let analysis = analyze_query("yesterday", now());
        assert!(analysis.purely_temporal);
        assert_eq!(analysis.query_type, QueryType::Temporal);
        assert!(analysis.cleaned.is_empty());
    }

    #[test]
    fn test_semantic_plus_temporal_is_not_purely_temporal() {
        let analysis = analyze_query("kubernetes incident yesterday", now());
        assert!(!analysis.purely_temporal);
        assert_eq!(analysis.cleaned, "kubernetes incident");
        assert!(analysis.time_range.is_some());
    }

    #[test]
    fn test_last_weekday() {
        // Friday 2026-07-31; last Tuesday is 2026-07-28
        let analysis = analyze_query("last tuesday", now());
        let range = analysis.time_range.unwrap();
        assert_eq!(
            range.start.unwrap(),
            Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_days_ago() {
        let analysis = analyze_query("3 days ago", now());
        let range = analysis.time_range.unwrap();
        assert_eq!(
            range.start.unwrap(),
            Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_iso_date() {
        let analysis = analyze_query("notes from 2026-02-14", now());
        let range = analysis.time_range.unwrap();
        assert_eq!(
            range.start.unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 14, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_filler_stripped() {
        let analysis = analyze_query("show me everything about rust lifetimes", now());
        assert_eq!(analysis.cleaned, "rust lifetimes");
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            analyze_query("why does borrow checking reject this", now()).query_type,
            QueryType::Reasoning
        );
        assert_eq!(
            analyze_query("anything related to distributed tracing", now()).query_type,
            QueryType::Exploratory
        );
        assert_eq!(
            analyze_query("postgres tuning", now()).query_type,
            QueryType::Lookup
        );
        assert_eq!(analyze_query("last week", now()).query_type, QueryType::Temporal);
    }

    #[test]
    fn test_expected_types() {
        let analysis = analyze_query("meeting about the migration", now());
        assert!(analysis.expected_types.contains(&NodeType::Episode));

        let concept = analyze_query("definition of idempotency", now());
        assert!(concept.expected_types.contains(&NodeType::Concept));
    }
}
