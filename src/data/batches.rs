//! Cyclic batch cursor over a training window.
//!
//! A window of `window_len` steps is partitioned into consecutive batches of
//! `batch_size` steps (the last one may be shorter). The cursor hands them out
//! in order and wraps to the first batch after the last one. The position is a
//! plain index, so training can be restarted from a saved position with
//! [`CyclicBatches::seek`].
use std::ops::Range;

/// `CyclicBatches` — explicit index-modulo cursor over batch ranges.
///
/// Invariants
/// ----------
/// - `batch_size` is clamped to `1..=window_len`; a requested size of `0` or
///   anything larger than the window yields one batch spanning the window.
/// - `cursor < self.len()` at all times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclicBatches {
    window_len: usize,
    batch_size: usize,
    cursor: usize,
}

impl CyclicBatches {
    /// Partition a window of `window_len` steps into batches of `batch_size`.
    ///
    /// Panics
    /// ------
    /// - If `window_len == 0`; windows are validated non-empty upstream.
    pub fn new(window_len: usize, batch_size: usize) -> Self {
        assert!(window_len > 0, "batch cursor needs a non-empty window");
        let batch_size =
            if batch_size == 0 || batch_size > window_len { window_len } else { batch_size };
        Self { window_len, batch_size, cursor: 0 }
    }

    /// One batch spanning the whole window.
    pub fn full(window_len: usize) -> Self {
        Self::new(window_len, window_len)
    }

    /// Number of batches in one pass over the window.
    pub fn len(&self) -> usize {
        self.window_len.div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.window_len == 0
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Index of the batch the next [`advance`](Self::advance) will return.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Range of batch `index` (taken modulo the number of batches).
    pub fn range(&self, index: usize) -> Range<usize> {
        let index = index % self.len();
        let start = index * self.batch_size;
        let end = (start + self.batch_size).min(self.window_len);
        start..end
    }

    /// Range of the current batch without moving the cursor.
    pub fn peek(&self) -> Range<usize> {
        self.range(self.cursor)
    }

    /// Return the current batch range and move to the next batch, wrapping.
    pub fn advance(&mut self) -> Range<usize> {
        let range = self.range(self.cursor);
        self.cursor = (self.cursor + 1) % self.len();
        range
    }

    /// Move the cursor back to the first batch.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Restore a saved position (taken modulo the number of batches).
    pub fn seek(&mut self, position: usize) {
        self.cursor = position % self.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Purpose
    // -------
    // Batches are served sequentially, the short tail batch included, and
    // the cursor wraps back to the first batch.
    //
    // Given
    // -----
    // - A window of 5 steps with batch size 2.
    //
    // Expect
    // ------
    // - Ranges 0..2, 2..4, 4..5, then 0..2 again.
    fn advance_is_sequential_then_wraps() {
        // Arrange
        let mut batches = CyclicBatches::new(5, 2);

        // Act
        let served: Vec<_> = (0..4).map(|_| batches.advance()).collect();

        // Assert
        assert_eq!(batches.len(), 3);
        assert_eq!(served, vec![0..2, 2..4, 4..5, 0..2]);
        assert_eq!(batches.position(), 1);
    }

    #[test]
    fn degenerate_sizes_collapse_to_one_batch() {
        for size in [0, 7] {
            let mut batches = CyclicBatches::new(4, size);
            assert_eq!(batches.len(), 1);
            assert_eq!(batches.advance(), 0..4);
            assert_eq!(batches.advance(), 0..4);
        }
    }

    #[test]
    fn seek_and_reset_restore_position() {
        let mut batches = CyclicBatches::new(6, 2);
        batches.seek(5);
        assert_eq!(batches.position(), 2);
        assert_eq!(batches.peek(), 4..6);
        batches.reset();
        assert_eq!(batches.advance(), 0..2);
    }
}
