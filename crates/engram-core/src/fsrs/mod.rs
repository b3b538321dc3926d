//! FSRS neural state machine
//!
//! Forgetting-curve dynamics per node: stability, difficulty, and lazily
//! computed retrievability, plus the lifecycle bands derived from them.
//!
//! ## Core formulas
//! - Retrievability: `R(dt) = exp(-dt / S)` with `dt` in days
//! - Stability growth on recall: `S <- S * (1 + alpha * (11 - D)/10 * R_prev)`
//! - Difficulty update on recall: `D <- clamp(D + beta * (grade - 3), 1, 10)`

mod algorithm;
mod defaults;

pub use algorithm::{
    difficulty_on_recall, lifecycle_band, read_lifecycle, recall, retrievability, RecallOutcome,
    DEFAULT_GRADE, DIFFICULTY_BETA, GROWTH_ALPHA, MAX_DIFFICULTY, MIN_DIFFICULTY, MIN_STABILITY,
    ACTIVE_THRESHOLD, WEAK_THRESHOLD,
};

pub use defaults::{neural_defaults, NeuralDefaults};
