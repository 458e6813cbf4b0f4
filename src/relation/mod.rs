//! # Relations
//!
//! A [`Relation`] is one logical set of tuples kept under one or more
//! [`Index`]es that always agree on membership. Index 0 is the primary index;
//! it decides whether an insert is new.
//!
//! ## Storage modes
//!
//! ```text
//! Direct                          Indirect
//!   Index 0: (1,2) (2,3)            TupleArena: [(1,2)] [(2,3)]
//!   Index 1: (2,3) (1,2)                           ^       ^
//!   each index owns a copy           Index 0 / Index 1 hold handles
//! ```
//!
//! Direct insert goes to the primary index first and fans out only if the
//! primary reported a new tuple, so a race on one tuple has one winner and no
//! secondary index ever sees a tuple the primary rejected.
//!
//! Indirect insert runs check, arena append and fan-out under one mutex, so a
//! logical tuple gets exactly one arena slot shared by every index. The mutex
//! is not taken by reads.

mod arena;

pub use arena::TupleArena;

use crate::error::{EngineError, EngineResult};
use crate::index::{Index, IndexRange, OperationHints};
use crate::pattern::BoundPattern;
use crate::statistics::RelationStatistics;
use crate::tuple::{ColumnOrder, Row, Word, MAX_ARITY};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Where a relation keeps its canonical tuples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Every index stores its own copy
    #[default]
    Direct,
    /// One arena copy, indexes store handles
    Indirect,
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Indirect => write!(f, "indirect"),
        }
    }
}

/// Declared index: a column order and the bound patterns it must serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub order: Vec<usize>,
    pub patterns: Vec<String>,
}

impl IndexSpec {
    pub fn new(order: Vec<usize>) -> Self {
        IndexSpec {
            order,
            patterns: Vec::new(),
        }
    }

    /// Add a pattern in `1100` notation.
    pub fn serving(mut self, pattern: &str) -> Self {
        self.patterns.push(pattern.to_string());
        self
    }
}

/// Catalog entry for one relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSpec {
    pub name: String,
    pub arity: usize,
    pub indexes: Vec<IndexSpec>,
    pub storage: StorageMode,
}

impl RelationSpec {
    /// Relation with no declared index yet. Without any, the identity order
    /// is used.
    pub fn new(name: &str, arity: usize) -> Self {
        RelationSpec {
            name: name.to_string(),
            arity,
            indexes: Vec::new(),
            storage: StorageMode::Direct,
        }
    }

    pub fn index(mut self, spec: IndexSpec) -> Self {
        self.indexes.push(spec);
        self
    }

    pub fn storage(mut self, storage: StorageMode) -> Self {
        self.storage = storage;
        self
    }

    pub fn indirect(self) -> Self {
        self.storage(StorageMode::Indirect)
    }
}

/// Per-worker hints for every index of one relation.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    hints: Vec<OperationHints>,
}

impl OperationContext {
    fn new(indexes: usize) -> Self {
        OperationContext {
            hints: vec![OperationHints::new(); indexes],
        }
    }

    fn hints(&mut self, index: usize) -> &mut OperationHints {
        if self.hints.len() <= index {
            self.hints.resize_with(index + 1, OperationHints::new);
        }
        &mut self.hints[index]
    }
}

/// One logical relation under one or more agreeing indexes.
pub struct Relation {
    name: String,
    arity: usize,
    storage: StorageMode,
    indexes: Vec<Index>,
    served: HashMap<BoundPattern, usize>,
    arena: Option<Mutex<TupleArena>>,
}

impl Relation {
    pub fn new(spec: RelationSpec) -> EngineResult<Self> {
        let RelationSpec {
            name,
            arity,
            mut indexes,
            storage,
        } = spec;

        if arity == 0 || arity > MAX_ARITY {
            return Err(EngineError::UnsupportedArity {
                relation: name,
                arity,
                max: MAX_ARITY,
            });
        }
        if indexes.is_empty() {
            indexes.push(IndexSpec::new((0..arity).collect()));
        }

        let mut built = Vec::with_capacity(indexes.len());
        let mut served = HashMap::new();
        for (number, index_spec) in indexes.into_iter().enumerate() {
            if index_spec.order.len() != arity {
                return Err(EngineError::ArityMismatch {
                    relation: name,
                    expected: arity,
                    actual: index_spec.order.len(),
                });
            }
            let order = ColumnOrder::new(&name, index_spec.order)?;
            for text in &index_spec.patterns {
                let pattern = BoundPattern::parse(text)
                    .filter(|p| p.arity() == arity && p.is_prefix_of(&order))
                    .ok_or_else(|| EngineError::PatternNotServed {
                        relation: name.clone(),
                        pattern: text.clone(),
                    })?;
                served.entry(pattern).or_insert(number);
            }
            built.push(Index::new(order));
        }

        let arena = match storage {
            StorageMode::Direct => None,
            StorageMode::Indirect => Some(Mutex::new(TupleArena::new())),
        };

        Ok(Relation {
            name,
            arity,
            storage,
            indexes: built,
            served,
            arena,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.storage
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    pub fn index(&self, number: usize) -> Option<&Index> {
        self.indexes.get(number)
    }

    fn primary(&self) -> &Index {
        &self.indexes[0]
    }

    /// Index that answers `pattern` with one contiguous scan.
    pub fn index_for(&self, pattern: BoundPattern) -> Option<usize> {
        if pattern.arity() != self.arity {
            return None;
        }
        if let Some(&number) = self.served.get(&pattern) {
            return Some(number);
        }
        if pattern.is_free() || pattern.is_full() {
            return Some(0);
        }
        self.indexes
            .iter()
            .position(|index| pattern.is_prefix_of(index.order()))
    }

    pub fn len(&self) -> usize {
        self.primary().len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary().is_empty()
    }

    pub fn create_context(&self) -> OperationContext {
        OperationContext::new(self.indexes.len())
    }

    fn check_arity(&self, tuple: &[Word]) -> EngineResult<()> {
        if tuple.len() != self.arity {
            return Err(EngineError::ArityMismatch {
                relation: self.name.clone(),
                expected: self.arity,
                actual: tuple.len(),
            });
        }
        Ok(())
    }

    /// Insert `tuple`, whose width the caller has already checked. Returns
    /// true if it was not yet present.
    pub(crate) fn insert(&self, tuple: &[Word]) -> bool {
        debug_assert_eq!(tuple.len(), self.arity, "arity mismatch on {}", self.name);
        match &self.arena {
            None => {
                if !self.primary().insert(Row::from(tuple)) {
                    return false;
                }
                for index in &self.indexes[1..] {
                    index.insert(Row::from(tuple));
                }
                true
            }
            Some(arena) => {
                let mut arena = arena.lock();
                if self.primary().contains(tuple) {
                    return false;
                }
                let row = arena.alloc(tuple);
                for index in &self.indexes {
                    index.insert(Arc::clone(&row));
                }
                true
            }
        }
    }

    /// Hinted [`Relation::insert`]. The primary hint is consulted once; the
    /// fan-out only refreshes hints.
    pub(crate) fn insert_with(&self, tuple: &[Word], ctx: &mut OperationContext) -> bool {
        debug_assert_eq!(tuple.len(), self.arity, "arity mismatch on {}", self.name);
        match &self.arena {
            None => {
                if !self.primary().insert_with(Row::from(tuple), ctx.hints(0)) {
                    return false;
                }
                for (number, index) in self.indexes.iter().enumerate().skip(1) {
                    index.insert_fresh(Row::from(tuple), ctx.hints(number));
                }
                true
            }
            Some(arena) => {
                if self.primary().hinted(tuple, ctx.hints(0)) {
                    return false;
                }
                let mut arena = arena.lock();
                if self.primary().contains(tuple) {
                    return false;
                }
                let row = arena.alloc(tuple);
                for (number, index) in self.indexes.iter().enumerate() {
                    index.insert_fresh(Arc::clone(&row), ctx.hints(number));
                }
                true
            }
        }
    }

    pub(crate) fn contains(&self, tuple: &[Word]) -> bool {
        self.primary().contains(tuple)
    }

    pub(crate) fn contains_with(&self, tuple: &[Word], ctx: &mut OperationContext) -> bool {
        self.primary().contains_with(tuple, ctx.hints(0))
    }

    pub(crate) fn find(&self, tuple: &[Word]) -> Option<Row> {
        self.primary().find(tuple)
    }

    /// Insert an externally supplied tuple. Returns true if it was new.
    pub fn try_insert(&self, tuple: &[Word]) -> EngineResult<bool> {
        self.check_arity(tuple)?;
        Ok(self.insert(tuple))
    }

    /// Hinted [`Relation::try_insert`].
    pub fn try_insert_with(
        &self,
        tuple: &[Word],
        ctx: &mut OperationContext,
    ) -> EngineResult<bool> {
        self.check_arity(tuple)?;
        Ok(self.insert_with(tuple, ctx))
    }

    pub fn try_contains(&self, tuple: &[Word]) -> EngineResult<bool> {
        self.check_arity(tuple)?;
        Ok(self.contains(tuple))
    }

    /// Hinted [`Relation::try_contains`].
    pub fn try_contains_with(
        &self,
        tuple: &[Word],
        ctx: &mut OperationContext,
    ) -> EngineResult<bool> {
        self.check_arity(tuple)?;
        Ok(self.contains_with(tuple, ctx))
    }

    /// Stored handle equal to `tuple`, if any.
    pub fn try_find(&self, tuple: &[Word]) -> EngineResult<Option<Row>> {
        self.check_arity(tuple)?;
        Ok(self.find(tuple))
    }

    /// Tuples agreeing with `key` on the columns bound by `pattern`, in the
    /// order of the index that serves the pattern.
    pub fn range(&self, pattern: BoundPattern, key: &[Word]) -> EngineResult<IndexRange<'_>> {
        self.check_arity(key)?;
        let number = self
            .index_for(pattern)
            .ok_or_else(|| EngineError::PatternNotServed {
                relation: self.name.clone(),
                pattern: pattern.to_string(),
            })?;
        let index = &self.indexes[number];
        if pattern.is_free() {
            return Ok(index.iter());
        }
        let (lower, upper) = pattern.bounds(key);
        Ok(index.range(&lower, &upper))
    }

    /// Raw bound range on a specific index.
    pub(crate) fn range_on(&self, number: usize, lower: &[Word], upper: &[Word]) -> IndexRange<'_> {
        self.indexes[number].range(lower, upper)
    }

    /// Hinted [`Relation::range_on`].
    pub(crate) fn range_on_with(
        &self,
        number: usize,
        lower: &[Word],
        upper: &[Word],
        ctx: &mut OperationContext,
    ) -> IndexRange<'_> {
        self.indexes[number].range_with(lower, upper, ctx.hints(number))
    }

    /// Every tuple in primary index order.
    pub fn iter(&self) -> IndexRange<'_> {
        self.primary().iter()
    }

    /// Owned copy of the contents in primary index order.
    pub fn to_vec(&self) -> Vec<Vec<Word>> {
        self.iter().to_vec()
    }

    /// Disjoint chunks of the primary index for parallel scans.
    pub fn partition(&self, chunk_size: usize) -> Vec<IndexRange<'_>> {
        self.primary().partition(chunk_size)
    }

    /// Release every tuple. Arena handles become invalid.
    pub fn purge(&self) {
        let arena = self.arena.as_ref().map(|arena| arena.lock());
        for index in &self.indexes {
            index.purge();
        }
        if let Some(mut arena) = arena {
            arena.clear();
        }
    }

    /// True when `other` has the same arity, storage and index orders.
    pub fn same_shape(&self, other: &Relation) -> bool {
        self.arity == other.arity
            && self.storage == other.storage
            && self.indexes.len() == other.indexes.len()
            && self
                .indexes
                .iter()
                .zip(&other.indexes)
                .all(|(a, b)| a.order() == b.order())
    }

    /// Exchange contents with a relation of the same shape.
    pub(crate) fn swap_contents(&mut self, other: &mut Relation) {
        debug_assert!(self.same_shape(other));
        std::mem::swap(&mut self.indexes, &mut other.indexes);
        std::mem::swap(&mut self.arena, &mut other.arena);
    }

    pub fn statistics(&self) -> RelationStatistics {
        RelationStatistics {
            name: self.name.clone(),
            arity: self.arity,
            storage: self.storage,
            len: self.len(),
            arena_tuples: self.arena.as_ref().map(|a| a.lock().len()),
            indexes: self.indexes.iter().map(Index::statistics).collect(),
        }
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("storage", &self.storage)
            .field("indexes", &self.indexes)
            .finish()
    }
}
