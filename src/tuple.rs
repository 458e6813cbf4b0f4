//! # Tuples and Column Orders
//!
//! A tuple is a fixed-arity row of [`Word`]s. Words are opaque symbol or
//! constant ids; they are compared as signed integers.
//!
//! Tuples carry no ordering of their own. Every index orders its tuples under a
//! [`ColumnOrder`], a permutation of the relation's columns compared
//! lexicographically:
//!
//! ```text
//! order [1, 0, 2]:   (5, 1, 9) < (2, 3, 0)     column 1 decides: 1 < 3
//! order [0, 1, 2]:   (5, 1, 9) > (2, 3, 0)     column 0 decides: 5 > 2
//! ```

use crate::error::{EngineError, EngineResult};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// One column value.
pub type Word = i32;

/// Smallest word; fills free columns of a lower bound.
pub const MIN_WORD: Word = Word::MIN;

/// Largest word; fills free columns of an upper bound.
pub const MAX_WORD: Word = Word::MAX;

/// Widest relation supported (one bit per column in a bound pattern).
pub const MAX_ARITY: usize = 64;

/// A stored tuple. Shared by handle when several indexes reference one copy.
pub type Row = Arc<[Word]>;

/// Lexicographic comparator defined by a column permutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnOrder {
    columns: Box<[usize]>,
}

impl ColumnOrder {
    /// Build an order, checking that `columns` is a permutation of `0..len`.
    pub fn new(relation: &str, columns: Vec<usize>) -> EngineResult<Self> {
        let mut seen = vec![false; columns.len()];
        for &col in &columns {
            match seen.get_mut(col) {
                Some(slot) if !*slot => *slot = true,
                _ => {
                    return Err(EngineError::InvalidColumnOrder {
                        relation: relation.to_string(),
                        order: columns,
                    })
                }
            }
        }
        Ok(ColumnOrder {
            columns: columns.into_boxed_slice(),
        })
    }

    /// The natural order `[0, 1, .., arity-1]`.
    pub fn identity(arity: usize) -> Self {
        ColumnOrder {
            columns: (0..arity).collect(),
        }
    }

    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Sign of the first differing column, scanning in order.
    pub fn compare(&self, a: &[Word], b: &[Word]) -> Ordering {
        for &col in self.columns.iter() {
            match a[col].cmp(&b[col]) {
                Ordering::Equal => {}
                other => return other,
            }
        }
        Ordering::Equal
    }

    /// Strict order consistent with [`ColumnOrder::compare`].
    pub fn less(&self, a: &[Word], b: &[Word]) -> bool {
        self.compare(a, b) == Ordering::Less
    }

    /// True iff every column matches.
    pub fn equal(&self, a: &[Word], b: &[Word]) -> bool {
        self.columns.iter().all(|&col| a[col] == b[col])
    }

    /// Position of `column` within this order.
    pub fn position(&self, column: usize) -> Option<usize> {
        self.columns.iter().position(|&c| c == column)
    }
}

impl fmt::Display for ColumnOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols: Vec<String> = self.columns.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", cols.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identity_order_is_lexicographic() {
        let order = ColumnOrder::identity(3);
        assert_eq!(order.compare(&[1, 2, 3], &[1, 2, 4]), Ordering::Less);
        assert_eq!(order.compare(&[2, 0, 0], &[1, 9, 9]), Ordering::Greater);
        assert_eq!(order.compare(&[1, 2, 3], &[1, 2, 3]), Ordering::Equal);
    }

    #[test]
    fn test_permuted_order() {
        let order = ColumnOrder::new("r", vec![1, 0, 2]).unwrap();
        assert!(order.less(&[5, 1, 9], &[2, 3, 0]));
        assert!(!ColumnOrder::identity(3).less(&[5, 1, 9], &[2, 3, 0]));
    }

    #[test]
    fn test_values_compare_signed() {
        let order = ColumnOrder::identity(1);
        assert!(order.less(&[-1], &[0]));
        assert!(order.less(&[MIN_WORD], &[MAX_WORD]));
    }

    #[test]
    fn test_rejects_non_permutation() {
        assert!(ColumnOrder::new("r", vec![0, 0]).is_err());
        assert!(ColumnOrder::new("r", vec![0, 2]).is_err());
        assert!(ColumnOrder::new("r", vec![2, 0, 1]).is_ok());
    }

    #[test]
    fn test_display() {
        let order = ColumnOrder::new("r", vec![3, 0, 1, 2]).unwrap();
        assert_eq!(order.to_string(), "[3,0,1,2]");
        assert_eq!(order.position(0), Some(1));
    }

    proptest! {
        #[test]
        fn prop_compare_less_equal_agree(
            a in prop::collection::vec(-3i32..3, 4),
            b in prop::collection::vec(-3i32..3, 4),
        ) {
            let order = ColumnOrder::new("r", vec![2, 0, 3, 1]).unwrap();
            let cmp = order.compare(&a, &b);
            prop_assert_eq!(order.less(&a, &b), cmp == Ordering::Less);
            prop_assert_eq!(order.equal(&a, &b), cmp == Ordering::Equal);
            prop_assert_eq!(order.compare(&b, &a), cmp.reverse());
        }
    }
}
