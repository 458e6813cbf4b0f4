//! Engine Error Types
//!
//! Only structural problems surface as errors: a plan that does not match the
//! catalog it runs against, a broken configuration, or a failed output write.
//! Data-level conditions (duplicate inserts, empty joins, inverted range
//! bounds) are resolved inside the component that sees them.

use std::io;
use thiserror::Error;

/// Evaluation engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Relation name not present in the catalog
    #[error("Unknown relation: {0}")]
    UnknownRelation(String),

    /// Relation registered twice
    #[error("Relation already declared: {0}")]
    DuplicateRelation(String),

    /// Stratum name not present in the plan
    #[error("Unknown stratum: {0}")]
    UnknownStratum(String),

    /// Stratum declared twice
    #[error("Stratum already declared: {0}")]
    DuplicateStratum(String),

    /// Tuple, order or projection width does not match the relation arity
    #[error("Arity mismatch for '{relation}': expected {expected}, got {actual}")]
    ArityMismatch {
        relation: String,
        expected: usize,
        actual: usize,
    },

    /// Relation declared with an unsupported arity
    #[error("Relation '{relation}' has unsupported arity {arity} (must be 1..={max})")]
    UnsupportedArity {
        relation: String,
        arity: usize,
        max: usize,
    },

    /// Index order is not a permutation of the relation's columns
    #[error("Invalid column order {order:?} for '{relation}'")]
    InvalidColumnOrder { relation: String, order: Vec<usize> },

    /// Bound pattern that no index of the relation can answer as one scan
    #[error("Bound pattern {pattern} is not served by any index of '{relation}'")]
    PatternNotServed { relation: String, pattern: String },

    /// Contents exchanged between relations of different arity, storage or
    /// index orders
    #[error("Relations '{left}' and '{right}' differ in shape")]
    ShapeMismatch { left: String, right: String },

    /// Rule, loop or statement that cannot run against the catalog
    #[error("Plan inconsistency in stratum '{stratum}', rule '{rule}': {reason}")]
    PlanInconsistency {
        stratum: String,
        rule: String,
        reason: String,
    },

    /// Fixpoint loop ran past the configured iteration ceiling
    #[error("Loop in stratum '{stratum}' exceeded {limit} iterations")]
    IterationLimit { stratum: String, limit: usize },

    /// Output writer failed
    #[error("Output error for '{relation}': {source}")]
    Output {
        relation: String,
        #[source]
        source: io::Error,
    },

    /// Worker pool could not be started
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl From<figment::Error> for EngineError {
    fn from(err: figment::Error) -> Self {
        EngineError::Config(Box::new(err))
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
