//! Bound patterns: which columns of a range query are fixed.
//!
//! A pattern is written as one digit per column, column 0 first: `1100`
//! binds columns 0 and 1 and leaves 2 and 3 free. Free columns of the lower
//! bound are filled with [`MIN_WORD`] and those of the upper bound with
//! [`MAX_WORD`], so the pair spans every tuple that agrees on the bound
//! columns.
//!
//! Under a given [`ColumnOrder`] that span is contiguous only when the bound
//! columns are exactly the first `k` columns of the order. Indexes are
//! declared so that every pattern they serve has this prefix property.

use crate::tuple::{ColumnOrder, Word, MAX_ARITY, MAX_WORD, MIN_WORD};
use std::fmt;

/// Set of bound columns, one bit per column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundPattern {
    bits: u64,
    arity: usize,
}

impl BoundPattern {
    /// Pattern with every column free (full scan).
    pub fn free(arity: usize) -> Self {
        debug_assert!(arity <= MAX_ARITY);
        BoundPattern { bits: 0, arity }
    }

    /// Pattern with every column bound (exact lookup).
    pub fn full(arity: usize) -> Self {
        debug_assert!(arity <= MAX_ARITY);
        let bits = if arity == MAX_ARITY {
            u64::MAX
        } else {
            (1u64 << arity) - 1
        };
        BoundPattern { bits, arity }
    }

    /// Pattern binding exactly `columns`. Columns out of range yield `None`.
    pub fn from_columns(arity: usize, columns: &[usize]) -> Option<Self> {
        if arity > MAX_ARITY {
            return None;
        }
        let mut bits = 0u64;
        for &col in columns {
            if col >= arity {
                return None;
            }
            bits |= 1 << col;
        }
        Some(BoundPattern { bits, arity })
    }

    /// Parse the `1100` notation.
    pub fn parse(text: &str) -> Option<Self> {
        let arity = text.len();
        if arity == 0 || arity > MAX_ARITY {
            return None;
        }
        let mut bits = 0u64;
        for (col, ch) in text.chars().enumerate() {
            match ch {
                '1' => bits |= 1 << col,
                '0' => {}
                _ => return None,
            }
        }
        Some(BoundPattern { bits, arity })
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn is_bound(&self, column: usize) -> bool {
        column < self.arity && self.bits & (1 << column) != 0
    }

    pub fn bound_count(&self) -> usize {
        self.bits.count_ones() as usize
    }

    /// No column bound.
    pub fn is_free(&self) -> bool {
        self.bits == 0
    }

    /// Every column bound.
    pub fn is_full(&self) -> bool {
        self.bound_count() == self.arity
    }

    pub fn bound_columns(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.arity).filter(move |&c| self.is_bound(c))
    }

    /// True when the bound columns are exactly a prefix of `order`.
    pub fn is_prefix_of(&self, order: &ColumnOrder) -> bool {
        if order.arity() != self.arity {
            return false;
        }
        let k = self.bound_count();
        order.columns()[..k].iter().all(|&c| self.is_bound(c))
    }

    /// Lower and upper bound tuples for `key`, whose bound columns carry the
    /// values to match. Free columns of `key` are ignored.
    pub fn bounds(&self, key: &[Word]) -> (Vec<Word>, Vec<Word>) {
        let mut lower = vec![MIN_WORD; self.arity];
        let mut upper = vec![MAX_WORD; self.arity];
        self.fill_bounds(key, &mut lower, &mut upper);
        (lower, upper)
    }

    /// In-place variant of [`BoundPattern::bounds`].
    pub fn fill_bounds(&self, key: &[Word], lower: &mut [Word], upper: &mut [Word]) {
        for col in 0..self.arity {
            if self.is_bound(col) {
                lower[col] = key[col];
                upper[col] = key[col];
            } else {
                lower[col] = MIN_WORD;
                upper[col] = MAX_WORD;
            }
        }
    }
}

impl fmt::Display for BoundPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for col in 0..self.arity {
            f.write_str(if self.is_bound(col) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let p = BoundPattern::parse("1100").unwrap();
        assert!(p.is_bound(0));
        assert!(p.is_bound(1));
        assert!(!p.is_bound(2));
        assert_eq!(p.bound_count(), 2);
        assert_eq!(p.to_string(), "1100");
        assert!(BoundPattern::parse("11x0").is_none());
        assert!(BoundPattern::parse("").is_none());
    }

    #[test]
    fn test_free_and_full() {
        assert!(BoundPattern::free(3).is_free());
        assert!(BoundPattern::full(3).is_full());
        assert_eq!(BoundPattern::full(3).to_string(), "111");
        assert!(BoundPattern::full(MAX_ARITY).is_full());
    }

    #[test]
    fn test_from_columns() {
        let p = BoundPattern::from_columns(5, &[3]).unwrap();
        assert_eq!(p.to_string(), "00010");
        assert!(BoundPattern::from_columns(2, &[2]).is_none());
    }

    #[test]
    fn test_prefix_property() {
        let order = ColumnOrder::new("r", vec![3, 0, 1, 2, 4]).unwrap();
        assert!(BoundPattern::parse("00010").unwrap().is_prefix_of(&order));
        assert!(BoundPattern::parse("10010").unwrap().is_prefix_of(&order));
        assert!(!BoundPattern::parse("10000").unwrap().is_prefix_of(&order));
        assert!(BoundPattern::parse("00000").unwrap().is_prefix_of(&order));
        assert!(BoundPattern::parse("11111").unwrap().is_prefix_of(&order));

        let identity = ColumnOrder::identity(4);
        assert!(BoundPattern::parse("1100").unwrap().is_prefix_of(&identity));
        assert!(!BoundPattern::parse("0100").unwrap().is_prefix_of(&identity));
    }

    #[test]
    fn test_bounds_fill_sentinels() {
        let p = BoundPattern::parse("0010").unwrap();
        let (lower, upper) = p.bounds(&[9, 9, 7, 9]);
        assert_eq!(lower, vec![MIN_WORD, MIN_WORD, 7, MIN_WORD]);
        assert_eq!(upper, vec![MAX_WORD, MAX_WORD, 7, MAX_WORD]);
    }
}
