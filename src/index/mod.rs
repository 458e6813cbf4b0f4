//! # Ordered Indexes
//!
//! An [`Index`] is an ordered set of tuples under one [`ColumnOrder`]. Entries
//! are tuple handles ([`Row`]); a direct relation gives each index its own
//! copy, an indirect relation hands every index the same arena handle.
//!
//! ## Range queries
//!
//! ```text
//! range(lower, upper)
//!   compare(lower, upper) > 0   -> empty (inverted bound)
//!   compare(lower, upper) == 0  -> exact lookup, zero or one tuple
//!   otherwise                   -> [lower_bound(lower), upper_bound(upper))
//! ```
//!
//! A returned [`IndexRange`] is lazy and can be iterated any number of times.
//! It holds a shared read guard on the container for as long as it lives, so
//! inserts into the same index wait until the range is dropped. The join
//! driver never writes to a relation it is scanning.
//!
//! ## Concurrency
//!
//! `insert` takes `&self` and serialises on the container's write lock, so
//! concurrent inserts of one tuple produce exactly one winner.

mod hints;

pub use hints::OperationHints;

use crate::statistics::IndexStatistics;
use crate::tuple::{ColumnOrder, Row, Word};
use parking_lot::{RwLock, RwLockReadGuard};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::{btree_set, BTreeSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

/// Default maximum partition size handed to one worker.
pub const DEFAULT_CHUNK_SIZE: usize = 400;

/// Source of index epochs. Unique across all indexes so a hint taken on one
/// index can never validate against another.
static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

fn next_epoch() -> u64 {
    NEXT_EPOCH.fetch_add(1, AtomicOrdering::Relaxed)
}

/// A tuple handle ordered by its index's column order.
#[derive(Clone)]
struct IndexEntry {
    order: Arc<ColumnOrder>,
    row: Row,
}

impl PartialEq for IndexEntry {
    fn eq(&self, other: &Self) -> bool {
        self.order.equal(&self.row, &other.row)
    }
}

impl Eq for IndexEntry {}

impl PartialOrd for IndexEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order.compare(&self.row, &other.row)
    }
}

/// Anything the container can be searched with. Lookups go through
/// `dyn EntryKey` so a search borrows its tuple and the index's order instead
/// of building an owned entry.
trait EntryKey {
    fn order(&self) -> &ColumnOrder;
    fn words(&self) -> &[Word];
}

impl EntryKey for IndexEntry {
    fn order(&self) -> &ColumnOrder {
        &self.order
    }

    fn words(&self) -> &[Word] {
        &self.row
    }
}

/// Borrowed search key.
struct SearchKey<'k> {
    order: &'k ColumnOrder,
    words: &'k [Word],
}

impl EntryKey for SearchKey<'_> {
    fn order(&self) -> &ColumnOrder {
        self.order
    }

    fn words(&self) -> &[Word] {
        self.words
    }
}

impl<'a> Borrow<dyn EntryKey + 'a> for IndexEntry {
    fn borrow(&self) -> &(dyn EntryKey + 'a) {
        self
    }
}

// Must agree with `Ord for IndexEntry`.
impl<'a> PartialEq for dyn EntryKey + 'a {
    fn eq(&self, other: &Self) -> bool {
        self.order().equal(self.words(), other.words())
    }
}

impl<'a> Eq for dyn EntryKey + 'a {}

impl<'a> PartialOrd for dyn EntryKey + 'a {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<'a> Ord for dyn EntryKey + 'a {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order().compare(self.words(), other.words())
    }
}

/// Ordered tuple container under one column order.
pub struct Index {
    order: Arc<ColumnOrder>,
    entries: RwLock<BTreeSet<IndexEntry>>,
    epoch: AtomicU64,
    hint_hits: AtomicU64,
    hint_misses: AtomicU64,
}

impl Index {
    pub fn new(order: ColumnOrder) -> Self {
        Index {
            order: Arc::new(order),
            entries: RwLock::new(BTreeSet::new()),
            epoch: AtomicU64::new(next_epoch()),
            hint_hits: AtomicU64::new(0),
            hint_misses: AtomicU64::new(0),
        }
    }

    pub fn order(&self) -> &ColumnOrder {
        &self.order
    }

    pub fn arity(&self) -> usize {
        self.order.arity()
    }

    /// Current epoch; changes on every purge.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(AtomicOrdering::Acquire)
    }

    fn entry(&self, row: Row) -> IndexEntry {
        IndexEntry {
            order: Arc::clone(&self.order),
            row,
        }
    }

    fn key<'k>(&'k self, tuple: &'k [Word]) -> SearchKey<'k> {
        SearchKey {
            order: self.order(),
            words: tuple,
        }
    }

    fn check_hint(&self, hints: &OperationHints, tuple: &[Word]) -> bool {
        let hit = hints.matches(self.epoch(), &self.order, tuple);
        let counter = if hit { &self.hint_hits } else { &self.hint_misses };
        counter.fetch_add(1, AtomicOrdering::Relaxed);
        hit
    }

    /// True when `hints` alone prove `tuple` present.
    pub(crate) fn hinted(&self, tuple: &[Word], hints: &OperationHints) -> bool {
        self.check_hint(hints, tuple)
    }

    /// Insert a handle. Returns false if an equal tuple is already present.
    pub fn insert(&self, row: Row) -> bool {
        debug_assert_eq!(row.len(), self.arity());
        let entry = self.entry(row);
        self.entries.write().insert(entry)
    }

    /// Hinted [`Index::insert`].
    pub fn insert_with(&self, row: Row, hints: &mut OperationHints) -> bool {
        if self.check_hint(hints, &row) {
            return false;
        }
        self.insert_fresh(row, hints)
    }

    /// Insert without consulting `hints`, then point them at `row`. For
    /// callers that already know the tuple is new to the relation.
    pub(crate) fn insert_fresh(&self, row: Row, hints: &mut OperationHints) -> bool {
        let epoch = self.epoch();
        let inserted = self.insert(Arc::clone(&row));
        hints.remember(epoch, row);
        inserted
    }

    pub fn contains(&self, tuple: &[Word]) -> bool {
        let key = self.key(tuple);
        self.entries
            .read_recursive()
            .contains(&key as &dyn EntryKey)
    }

    /// Hinted [`Index::contains`].
    pub fn contains_with(&self, tuple: &[Word], hints: &mut OperationHints) -> bool {
        if self.check_hint(hints, tuple) {
            return true;
        }
        let epoch = self.epoch();
        match self.find(tuple) {
            Some(row) => {
                hints.remember(epoch, row);
                true
            }
            None => false,
        }
    }

    /// Stored handle equal to `tuple`, if any.
    pub fn find(&self, tuple: &[Word]) -> Option<Row> {
        let key = self.key(tuple);
        self.entries
            .read_recursive()
            .get(&key as &dyn EntryKey)
            .map(|entry| Arc::clone(&entry.row))
    }

    /// Every tuple between `lower` and `upper` (both inclusive) in index order.
    pub fn range(&self, lower: &[Word], upper: &[Word]) -> IndexRange<'_> {
        match self.order.compare(lower, upper) {
            Ordering::Greater => IndexRange::empty(),
            Ordering::Equal => IndexRange::exact(self.find(lower)),
            Ordering::Less => self.between(lower, upper),
        }
    }

    /// Hinted [`Index::range`]; the hint only short-circuits exact matches.
    pub fn range_with(
        &self,
        lower: &[Word],
        upper: &[Word],
        hints: &mut OperationHints,
    ) -> IndexRange<'_> {
        match self.order.compare(lower, upper) {
            Ordering::Greater => IndexRange::empty(),
            Ordering::Equal => {
                let epoch = self.epoch();
                if self.check_hint(hints, lower) {
                    return IndexRange::exact(hints.row(epoch).cloned());
                }
                let found = self.find(lower);
                if let Some(row) = &found {
                    hints.remember(epoch, Arc::clone(row));
                }
                IndexRange::exact(found)
            }
            Ordering::Less => self.between(lower, upper),
        }
    }

    fn between(&self, lower: &[Word], upper: &[Word]) -> IndexRange<'_> {
        IndexRange {
            entries: Some(self.entries.read_recursive()),
            span: Span::Between {
                order: self.order(),
                lower: Bound::Included(Row::from(lower)),
                upper: Bound::Included(Row::from(upper)),
            },
        }
    }

    /// Full forward iteration.
    pub fn iter(&self) -> IndexRange<'_> {
        IndexRange {
            entries: Some(self.entries.read_recursive()),
            span: Span::All,
        }
    }

    /// Disjoint consecutive sub-ranges of at most `chunk_size` tuples covering
    /// the whole index in order.
    pub fn partition(&self, chunk_size: usize) -> Vec<IndexRange<'_>> {
        let chunk_size = chunk_size.max(1);
        let entries = self.entries.read_recursive();
        let starts: Vec<Row> = entries
            .iter()
            .step_by(chunk_size)
            .map(|entry| Arc::clone(&entry.row))
            .collect();

        let mut chunks = Vec::with_capacity(starts.len());
        let mut starts = starts.into_iter().peekable();
        while let Some(start) = starts.next() {
            let end = starts
                .peek()
                .cloned()
                .map_or(Bound::Unbounded, Bound::Excluded);
            chunks.push(IndexRange {
                entries: Some(self.entries.read_recursive()),
                span: Span::Between {
                    order: self.order(),
                    lower: Bound::Included(start),
                    upper: end,
                },
            });
        }
        drop(entries);
        chunks
    }

    pub fn len(&self) -> usize {
        self.entries.read_recursive().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read_recursive().is_empty()
    }

    /// Drop every entry and start a new epoch.
    pub fn purge(&self) {
        let old = {
            let mut entries = self.entries.write();
            self.epoch.store(next_epoch(), AtomicOrdering::Release);
            std::mem::take(&mut *entries)
        };
        drop(old);
    }

    pub fn statistics(&self) -> IndexStatistics {
        IndexStatistics {
            order: (*self.order).clone(),
            len: self.len(),
            hint_hits: self.hint_hits.load(AtomicOrdering::Relaxed),
            hint_misses: self.hint_misses.load(AtomicOrdering::Relaxed),
        }
    }
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("order", &self.order.to_string())
            .field("len", &self.len())
            .finish()
    }
}

enum Span<'a> {
    Empty,
    Exact(Option<Row>),
    Between {
        order: &'a ColumnOrder,
        lower: Bound<Row>,
        upper: Bound<Row>,
    },
    All,
}

/// Lazy, restartable view of a contiguous span of an index.
pub struct IndexRange<'a> {
    entries: Option<RwLockReadGuard<'a, BTreeSet<IndexEntry>>>,
    span: Span<'a>,
}

impl std::fmt::Debug for IndexRange<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexRange").finish_non_exhaustive()
    }
}

impl<'a> IndexRange<'a> {
    fn empty() -> Self {
        IndexRange {
            entries: None,
            span: Span::Empty,
        }
    }

    fn exact(row: Option<Row>) -> Self {
        IndexRange {
            entries: None,
            span: Span::Exact(row),
        }
    }

    pub fn iter(&self) -> RangeIter<'_> {
        let inner = match (&self.span, &self.entries) {
            (Span::Exact(Some(row)), _) => Inner::Single(Some(row)),
            (Span::Between { order, lower, upper }, Some(entries)) => {
                let order: &ColumnOrder = order;
                let lower = lower.as_ref().map(|row| SearchKey { order, words: row });
                let upper = upper.as_ref().map(|row| SearchKey { order, words: row });
                Inner::Entries(entries.range::<dyn EntryKey, _>((
                    lower.as_ref().map(|k| k as &dyn EntryKey),
                    upper.as_ref().map(|k| k as &dyn EntryKey),
                )))
            }
            (Span::All, Some(entries)) => Inner::All(entries.iter()),
            _ => Inner::Done,
        };
        RangeIter { inner }
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Owned copies of the tuples in range order.
    pub fn to_vec(&self) -> Vec<Vec<Word>> {
        self.iter().map(<[Word]>::to_vec).collect()
    }
}

impl<'r> IntoIterator for &'r IndexRange<'_> {
    type Item = &'r [Word];
    type IntoIter = RangeIter<'r>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

enum Inner<'r> {
    Done,
    Single(Option<&'r Row>),
    Entries(btree_set::Range<'r, IndexEntry>),
    All(btree_set::Iter<'r, IndexEntry>),
}

/// Iterator over one pass of an [`IndexRange`].
pub struct RangeIter<'r> {
    inner: Inner<'r>,
}

impl<'r> Iterator for RangeIter<'r> {
    type Item = &'r [Word];

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            Inner::Done => None,
            Inner::Single(slot) => slot.take().map(|row| &row[..]),
            Inner::Entries(it) => it.next().map(|entry| &entry.row[..]),
            Inner::All(it) => it.next().map(|entry| &entry.row[..]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{MAX_WORD, MIN_WORD};

    fn row(values: &[Word]) -> Row {
        Row::from(values)
    }

    fn sample() -> Index {
        let index = Index::new(ColumnOrder::identity(4));
        for t in [[1, 2, 3, 4], [1, 2, 5, 6], [1, 3, 0, 0]] {
            index.insert(row(&t));
        }
        index
    }

    #[test]
    fn test_insert_reports_duplicates() {
        let index = Index::new(ColumnOrder::identity(2));
        assert!(index.insert(row(&[1, 2])));
        assert!(!index.insert(row(&[1, 2])));
        assert_eq!(index.len(), 1);
        assert!(index.contains(&[1, 2]));
        assert!(!index.contains(&[2, 1]));
    }

    #[test]
    fn test_prefix_range() {
        let index = sample();
        let range = index.range(&[1, 2, MIN_WORD, MIN_WORD], &[1, 2, MAX_WORD, MAX_WORD]);
        assert_eq!(range.to_vec(), vec![vec![1, 2, 3, 4], vec![1, 2, 5, 6]]);
        // restartable
        assert_eq!(range.iter().count(), 2);
        assert_eq!(range.iter().count(), 2);
    }

    #[test]
    fn test_exact_range_collapses_to_lookup() {
        let index = sample();
        let hit = index.range(&[1, 2, 3, 4], &[1, 2, 3, 4]);
        assert_eq!(hit.to_vec(), vec![vec![1, 2, 3, 4]]);
        let miss = index.range(&[1, 2, 3, 5], &[1, 2, 3, 5]);
        assert!(miss.is_empty());
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let index = sample();
        let range = index.range(&[5, 0, 0, 0], &[1, 0, 0, 0]);
        assert!(range.is_empty());
    }

    #[test]
    fn test_range_follows_column_order() {
        let index = Index::new(ColumnOrder::new("r", vec![1, 0]).unwrap());
        for t in [[3, 1], [1, 2], [2, 1]] {
            index.insert(row(&t));
        }
        let all: Vec<Vec<Word>> = index.iter().to_vec();
        assert_eq!(all, vec![vec![2, 1], vec![3, 1], vec![1, 2]]);

        let by_second = index.range(&[MIN_WORD, 1], &[MAX_WORD, 1]);
        assert_eq!(by_second.to_vec(), vec![vec![2, 1], vec![3, 1]]);
    }

    #[test]
    fn test_partition_sizes() {
        let index = Index::new(ColumnOrder::identity(1));
        for i in 0..1000 {
            index.insert(row(&[i]));
        }
        let chunks = index.partition(DEFAULT_CHUNK_SIZE);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.iter().count()).collect();
        assert_eq!(sizes, vec![400, 400, 200]);
    }

    #[test]
    fn test_partition_of_empty_index() {
        let index = Index::new(ColumnOrder::identity(2));
        assert!(index.partition(DEFAULT_CHUNK_SIZE).is_empty());
    }

    #[test]
    fn test_purge_resets_epoch_and_contents() {
        let index = sample();
        let before = index.epoch();
        index.purge();
        assert!(index.is_empty());
        assert_ne!(index.epoch(), before);
        assert!(index.insert(row(&[1, 2, 3, 4])));
    }

    #[test]
    fn test_hints_skip_repeated_lookups() {
        let index = sample();
        let mut hints = OperationHints::new();
        assert!(index.contains_with(&[1, 3, 0, 0], &mut hints));
        assert!(index.contains_with(&[1, 3, 0, 0], &mut hints));
        assert!(!index.insert_with(row(&[1, 3, 0, 0]), &mut hints));
        let stats = index.statistics();
        assert_eq!(stats.hint_hits, 2);
        assert_eq!(stats.hint_misses, 1);
    }

    #[test]
    fn test_stale_hint_after_purge() {
        let index = sample();
        let mut hints = OperationHints::new();
        assert!(index.contains_with(&[1, 2, 3, 4], &mut hints));
        index.purge();
        assert!(!index.contains_with(&[1, 2, 3, 4], &mut hints));
        assert!(index.insert_with(row(&[1, 2, 3, 4]), &mut hints));
    }

    #[test]
    fn test_hinted_exact_range() {
        let index = sample();
        let mut hints = OperationHints::new();
        let first = index.range_with(&[1, 2, 5, 6], &[1, 2, 5, 6], &mut hints);
        assert_eq!(first.to_vec(), vec![vec![1, 2, 5, 6]]);
        let second = index.range_with(&[1, 2, 5, 6], &[1, 2, 5, 6], &mut hints);
        assert_eq!(second.to_vec(), vec![vec![1, 2, 5, 6]]);
        assert_eq!(index.statistics().hint_hits, 1);
    }

    #[test]
    fn test_fresh_insert_skips_hint_check() {
        let index = sample();
        let mut hints = OperationHints::new();
        assert!(index.insert_fresh(row(&[7, 7, 7, 7]), &mut hints));
        let stats = index.statistics();
        assert_eq!((stats.hint_hits, stats.hint_misses), (0, 0));
        // the hint now points at the fresh tuple
        assert!(index.contains_with(&[7, 7, 7, 7], &mut hints));
        assert_eq!(index.statistics().hint_hits, 1);
    }

    #[test]
    fn test_lookups_share_the_column_order() {
        let index = sample();
        let held = Arc::strong_count(&index.order);
        assert!(index.contains(&[1, 2, 3, 4]));
        assert!(index.find(&[1, 3, 0, 0]).is_some());
        let range = index.range(&[1, 2, MIN_WORD, MIN_WORD], &[1, 2, MAX_WORD, MAX_WORD]);
        assert_eq!(range.iter().count(), 2);
        let chunks = index.partition(2);
        assert_eq!(chunks.len(), 2);
        // one count per stored entry plus the index itself, none per search
        assert_eq!(Arc::strong_count(&index.order), held);
        assert_eq!(held, index.len() + 1);
    }

    #[test]
    fn test_concurrent_inserts_have_one_winner() {
        let index = Arc::new(Index::new(ColumnOrder::identity(2)));
        let winners: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let index = Arc::clone(&index);
                    s.spawn(move || (0..100).filter(|&i| index.insert(row(&[i, i]))).count())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(winners, 100);
        assert_eq!(index.len(), 100);
    }
}
