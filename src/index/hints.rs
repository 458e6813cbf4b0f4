//! Per-call-site operation hints.
//!
//! A hint remembers the last tuple an index confirmed as present, stamped with
//! the index epoch at the time. Indexes only grow between purges, so while the
//! epoch is unchanged a repeated lookup of that tuple can be answered from the
//! hint without touching the container.

use crate::tuple::{ColumnOrder, Row, Word};

/// Epoch value that never matches a live index.
const NO_EPOCH: u64 = 0;

/// Last-hit cache for one index, owned by one worker.
#[derive(Debug, Clone)]
pub struct OperationHints {
    epoch: u64,
    last: Option<Row>,
}

impl OperationHints {
    pub fn new() -> Self {
        OperationHints {
            epoch: NO_EPOCH,
            last: None,
        }
    }

    /// True when the hint proves `tuple` present in an index at `epoch`.
    pub(crate) fn matches(&self, epoch: u64, order: &ColumnOrder, tuple: &[Word]) -> bool {
        self.epoch == epoch
            && self
                .last
                .as_deref()
                .is_some_and(|last| order.equal(last, tuple))
    }

    /// The hinted tuple, if it is still valid at `epoch`.
    pub(crate) fn row(&self, epoch: u64) -> Option<&Row> {
        if self.epoch == epoch {
            self.last.as_ref()
        } else {
            None
        }
    }

    pub(crate) fn remember(&mut self, epoch: u64, row: Row) {
        self.epoch = epoch;
        self.last = Some(row);
    }

    pub fn clear(&mut self) {
        self.epoch = NO_EPOCH;
        self.last = None;
    }
}

impl Default for OperationHints {
    fn default() -> Self {
        Self::new()
    }
}
