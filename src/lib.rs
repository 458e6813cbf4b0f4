//! # Strata Evaluation Engine
//!
//! An in-memory relational store and stratified Datalog evaluator for
//! fixed-arity tuples of small integers (interned symbols and constants).
//!
//! ## Architecture
//!
//! ```text
//! Plan (strata of statements, from a Datalog compiler)
//!     ↓ compile + validate against the Catalog
//! Engine
//!     ├── Catalog: name → Relation
//!     │     └── Relation: direct or indirect storage
//!     │           └── Index × n: ordered set under a ColumnOrder
//!     ├── rayon worker pool (partitioned scans)
//!     └── RelationWriter (output relations)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use strata::{programs, Config, StorageMode};
//!
//! let config = Config::load()?;
//! let mut engine = programs::transitive_closure(StorageMode::Direct)?
//!     .with_facts("edge", [[1, 2], [2, 3]])?
//!     .into_engine(&config)?;
//!
//! let summary = engine.run()?;
//! assert_eq!(engine.relation("path").unwrap().len(), 3);
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod eval;
pub mod index;
pub mod output;
pub mod pattern;
pub mod plan;
pub mod programs;
pub mod relation;
pub mod statistics;
pub mod tuple;

pub use catalog::{Catalog, RelationId};
pub use config::Config;
pub use error::{EngineError, EngineResult};
pub use eval::{Engine, RunCounters, RunSummary, StratumState};
pub use index::{Index, IndexRange, OperationHints, DEFAULT_CHUNK_SIZE};
pub use output::{CollectingWriter, CsvOptions, CsvWriter, NullWriter, RelationWriter, StreamWriter};
pub use pattern::BoundPattern;
pub use plan::{Access, Filter, Plan, RuleEval, Statement, Stratum, Term};
pub use relation::{IndexSpec, OperationContext, Relation, RelationSpec, StorageMode};
pub use statistics::{EngineStatistics, IndexStatistics, RelationStatistics};
pub use tuple::{ColumnOrder, Row, Word, MAX_ARITY, MAX_WORD, MIN_WORD};
