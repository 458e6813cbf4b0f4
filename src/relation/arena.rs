//! Append-only tuple arena for indirect relations.
//!
//! Each logical tuple is allocated once here; indexes hold clones of the
//! returned handle. Handles stay valid until the owning relation is purged.

use crate::tuple::{Row, Word};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct TupleArena {
    rows: Vec<Row>,
}

impl TupleArena {
    pub fn new() -> Self {
        TupleArena { rows: Vec::new() }
    }

    /// Store a canonical copy of `tuple` and return its handle.
    pub fn alloc(&mut self, tuple: &[Word]) -> Row {
        let row = Row::from(tuple);
        self.rows.push(Arc::clone(&row));
        row
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Words held by the arena (for statistics).
    pub fn words(&self) -> usize {
        self.rows.iter().map(|r| r.len()).sum()
    }

    pub fn clear(&mut self) {
        self.rows = Vec::new();
    }
}
