//! Forgetting-curve arithmetic
//!
//! Pure functions over `(stability, difficulty, last_accessed)`. The engine
//! computes retrievability lazily on read and on re-ranking; it is never
//! stored except as a cache on the node.

use chrono::{DateTime, Utc};

use crate::clock::days_between;
use crate::memory::{Lifecycle, NeuralState};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Floor of node stability, in days
pub const MIN_STABILITY: f64 = 0.1;
/// Lower bound of difficulty
pub const MIN_DIFFICULTY: f64 = 1.0;
/// Upper bound of difficulty
pub const MAX_DIFFICULTY: f64 = 10.0;
/// Stability growth constant
pub const GROWTH_ALPHA: f64 = 0.1;
/// Difficulty step per grade point away from neutral
pub const DIFFICULTY_BETA: f64 = 0.5;
/// Grade assigned to an ordinary access
pub const DEFAULT_GRADE: f64 = 4.0;
/// Retrievability at or above this is ACTIVE
pub const ACTIVE_THRESHOLD: f64 = 0.5;
/// Retrievability at or above this (but below active) is WEAK
pub const WEAK_THRESHOLD: f64 = 0.1;

// ============================================================================
// RETRIEVABILITY
// ============================================================================

/// Retrievability after `elapsed_days` at the given stability
///
/// `R(0) = 1`; strictly decreasing in elapsed time for any `S > 0`.
pub fn retrievability(stability: f64, elapsed_days: f64) -> f64 {
    let stability = stability.max(MIN_STABILITY);
    (-elapsed_days.max(0.0) / stability).exp()
}

/// Lifecycle band implied by a retrievability value
pub fn lifecycle_band(r: f64) -> Lifecycle {
    if r >= ACTIVE_THRESHOLD {
        Lifecycle::Active
    } else if r >= WEAK_THRESHOLD {
        Lifecycle::Weak
    } else {
        Lifecycle::Dormant
    }
}

/// Lifecycle a read should report for a node, without persisting promotion
///
/// A persisted DORMANT node is never promoted by read-time recomputation;
/// only an explicit write may reactivate it. COMPRESSED and RESTORABLE are
/// likewise sticky: decay does not apply to folded content.
pub fn read_lifecycle(persisted: Lifecycle, r: f64) -> Lifecycle {
    match persisted {
        Lifecycle::Dormant | Lifecycle::Compressed | Lifecycle::Restorable => persisted,
        Lifecycle::Active | Lifecycle::Weak => lifecycle_band(r),
    }
}

// ============================================================================
// RECALL UPDATES
// ============================================================================

/// Difficulty after a graded recall
pub fn difficulty_on_recall(difficulty: f64, grade: f64) -> f64 {
    (difficulty + DIFFICULTY_BETA * (grade - 3.0)).clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

/// What a successful recall did to a node's neural state
#[derive(Debug, Clone, PartialEq)]
pub struct RecallOutcome {
    /// Retrievability immediately before the access
    pub retrievability_before: f64,
    /// Stability after growth
    pub stability_after: f64,
    /// Lifecycle the read reports
    pub lifecycle: Lifecycle,
}

/// Apply a successful recall to a node's neural state in place
///
/// Stability growth uses the retrievability BEFORE the access, not a value
/// recomputed after `last_accessed` moves. The returned outcome carries the
/// pre-access retrievability for callers that log or test against it.
///
/// The persisted lifecycle is respected: a DORMANT node stays DORMANT even
/// though its state strengthened (only an explicit write reactivates).
pub fn recall(
    neural: &mut NeuralState,
    persisted_lifecycle: Lifecycle,
    now: DateTime<Utc>,
    grade: f64,
) -> RecallOutcome {
    let elapsed = days_between(neural.last_accessed, now);
    let r_prev = retrievability(neural.stability, elapsed);

    let grown =
        neural.stability * (1.0 + GROWTH_ALPHA * (11.0 - neural.difficulty) / 10.0 * r_prev);
    neural.stability = grown.max(MIN_STABILITY);
    neural.difficulty = difficulty_on_recall(neural.difficulty, grade);
    neural.access_count = neural.access_count.saturating_add(1);
    neural.last_accessed = now;
    // Post-access retrievability: the node was just recalled
    neural.retrievability = 1.0;

    let lifecycle = match persisted_lifecycle {
        Lifecycle::Dormant | Lifecycle::Compressed | Lifecycle::Restorable => persisted_lifecycle,
        _ => Lifecycle::Active,
    };

    RecallOutcome {
        retrievability_before: r_prev,
        stability_after: neural.stability,
        lifecycle,
    }
}

// ============================================================================
// TESTS
// ============================================================================
