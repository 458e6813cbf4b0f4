//! Relation and index statistics.
//!
//! Snapshots are plain data; their `Display` output follows the layout
//! Soufflé prints for a relation:
//!
//! ```text
//! Statistics for Relation path:
//!  arity 2 direct b-tree index 0 lex-order [0,1]
//!   size 3, hint hits 2, hint misses 5
//!  arity 2 direct b-tree index 1 lex-order [1,0]
//!   size 3, hint hits 0, hint misses 4
//! ```

use crate::relation::StorageMode;
use crate::tuple::ColumnOrder;
use serde::Serialize;
use std::fmt;

/// Snapshot of one index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IndexStatistics {
    /// Column order of the index
    #[serde(serialize_with = "serialize_order")]
    pub order: ColumnOrder,
    /// Number of stored tuples
    pub len: usize,
    /// Hinted operations answered from the hint
    pub hint_hits: u64,
    /// Hinted operations that fell through to the container
    pub hint_misses: u64,
}

fn serialize_order<S: serde::Serializer>(order: &ColumnOrder, s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(order.columns())
}

impl IndexStatistics {
    /// Fraction of hinted operations answered from the hint.
    pub fn hint_ratio(&self) -> f64 {
        let total = self.hint_hits + self.hint_misses;
        if total == 0 {
            0.0
        } else {
            self.hint_hits as f64 / total as f64
        }
    }
}

/// Snapshot of one relation and all of its indexes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RelationStatistics {
    pub name: String,
    pub arity: usize,
    pub storage: StorageMode,
    /// Tuples in the primary index
    pub len: usize,
    /// Arena slots in use (indirect relations only)
    pub arena_tuples: Option<usize>,
    pub indexes: Vec<IndexStatistics>,
}

impl fmt::Display for RelationStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Statistics for Relation {}:", self.name)?;
        for (number, index) in self.indexes.iter().enumerate() {
            writeln!(
                f,
                " arity {} {} b-tree index {} lex-order {}",
                self.arity, self.storage, number, index.order
            )?;
            writeln!(
                f,
                "  size {}, hint hits {}, hint misses {}",
                index.len, index.hint_hits, index.hint_misses
            )?;
        }
        if let Some(slots) = self.arena_tuples {
            writeln!(f, "  arena tuples {slots}")?;
        }
        Ok(())
    }
}

/// Statistics for every relation of an engine, in catalog order.
#[derive(Clone, Debug, Default, Serialize)]
pub struct EngineStatistics {
    pub relations: Vec<RelationStatistics>,
}

impl EngineStatistics {
    pub fn get(&self, name: &str) -> Option<&RelationStatistics> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Sum of primary-index sizes.
    pub fn total_tuples(&self) -> usize {
        self.relations.iter().map(|r| r.len).sum()
    }
}

impl fmt::Display for EngineStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for relation in &self.relations {
            write!(f, "{relation}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RelationStatistics {
        RelationStatistics {
            name: "path".to_string(),
            arity: 2,
            storage: StorageMode::Direct,
            len: 3,
            arena_tuples: None,
            indexes: vec![
                IndexStatistics {
                    order: ColumnOrder::identity(2),
                    len: 3,
                    hint_hits: 2,
                    hint_misses: 5,
                },
                IndexStatistics {
                    order: ColumnOrder::new("path", vec![1, 0]).unwrap(),
                    len: 3,
                    hint_hits: 0,
                    hint_misses: 4,
                },
            ],
        }
    }

    #[test]
    fn test_relation_display() {
        let text = sample().to_string();
        let expected = "Statistics for Relation path:\n \
                        arity 2 direct b-tree index 0 lex-order [0,1]\n  \
                        size 3, hint hits 2, hint misses 5\n \
                        arity 2 direct b-tree index 1 lex-order [1,0]\n  \
                        size 3, hint hits 0, hint misses 4\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_indirect_display_reports_arena() {
        let mut stats = sample();
        stats.storage = StorageMode::Indirect;
        stats.arena_tuples = Some(3);
        let text = stats.to_string();
        assert!(text.contains(" arity 2 indirect b-tree index 0 lex-order [0,1]"));
        assert!(text.ends_with("  arena tuples 3\n"));
    }

    #[test]
    fn test_hint_ratio() {
        let stats = sample();
        assert!((stats.indexes[0].hint_ratio() - 2.0 / 7.0).abs() < 1e-9);
        let empty = IndexStatistics {
            order: ColumnOrder::identity(1),
            len: 0,
            hint_hits: 0,
            hint_misses: 0,
        };
        assert!(empty.hint_ratio().abs() < f64::EPSILON);
    }

    #[test]
    fn test_engine_statistics_json() {
        let engine = EngineStatistics {
            relations: vec![sample()],
        };
        assert_eq!(engine.total_tuples(), 3);
        assert!(engine.get("path").is_some());
        let json = serde_json::to_value(&engine).unwrap();
        assert_eq!(json["relations"][0]["storage"], "direct");
        assert_eq!(json["relations"][0]["indexes"][1]["order"][0], 1);
    }
}
