//! Rewind History - Fixed-capacity ring buffer for per-tick history
//!
//! This crate provides the bounded history store used by every other
//! rewind crate (input history, predicted positions, frame snapshots).
//!
//! # Features
//!
//! - **Bounded memory**: capacity is fixed at construction, the buffer never resizes
//! - **O(1) insertion**: writes go to the cursor, which advances modulo capacity
//! - **Relative indexing**: `0` is the next slot to be written, `-1` the most recent write
//! - **Silent eviction**: the oldest entry is overwritten on wraparound
//!
//! The buffer does not track which slots hold live data. Callers know their own
//! retention window; reading an overwritten slot returns stale data without error.
//!
//! # Example
//!
//! ```rust
//! use rewind_history::RingHistoryBuffer;
//!
//! let mut buffer = RingHistoryBuffer::new(5);
//! for value in 1..=7 {
//!     buffer.add_value(value);
//! }
//!
//! assert_eq!(*buffer.at_offset(-1), 7);
//! assert_eq!(*buffer.at_offset(-5), 3);
//!
//! let mut out = [0; 5];
//! let copied = buffer.copy_range(buffer.index(-3), buffer.end(), &mut out).unwrap();
//! assert_eq!(&out[..copied], &[5, 6, 7]);
//! ```

mod error;

pub use error::{Error, Result};

/// A fixed-size circular store addressed relative to its write cursor
#[derive(Debug, Clone)]
pub struct RingHistoryBuffer<T> {
    /// Slot storage, always `capacity` long
    data: Vec<T>,
    /// Next slot to be written
    end: usize,
    /// Total number of writes since construction
    written: u64,
}

impl<T: Clone + Default> RingHistoryBuffer<T> {
    /// Create a new buffer with `capacity` default-initialized slots
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than 0");
        Self {
            data: vec![T::default(); capacity],
            end: 0,
            written: 0,
        }
    }

    /// Copy the entries from absolute slot `start` (included) to `end` (excluded)
    /// into `dest`, following wraparound
    ///
    /// `start == end` is an empty range. Returns the number of entries copied, or
    /// [`Error::InsufficientDestinationCapacity`] if `dest` cannot hold them all,
    /// in which case `dest` is left untouched.
    pub fn copy_range(&self, start: usize, end: usize, dest: &mut [T]) -> Result<usize> {
        let required = self.range_len(start, end)?;
        if required > dest.len() {
            return Err(Error::InsufficientDestinationCapacity {
                required,
                available: dest.len(),
            });
        }

        for (slot, value) in dest.iter_mut().zip(self.iter_range(start, end)) {
            slot.clone_from(value);
        }
        Ok(required)
    }
}

impl<T> RingHistoryBuffer<T> {
    /// Write a value at the cursor and advance it, overwriting the oldest entry once full
    pub fn add_value(&mut self, value: T) {
        self.data[self.end] = value;
        self.end = (self.end + 1) % self.data.len();
        self.written += 1;
    }

    /// Write every value of `values` in order
    pub fn add_slice(&mut self, values: &[T])
    where
        T: Clone,
    {
        for value in values {
            self.add_value(value.clone());
        }
    }

    /// Map a relative offset to an absolute slot index
    ///
    /// `0` is the next slot to be written and `-1` the most recently written one.
    /// Offsets of any magnitude wrap correctly, e.g. `-3` with `end == 1` on a
    /// buffer of capacity `n` yields `n - 2`.
    pub fn index(&self, offset: isize) -> usize {
        let capacity = self.data.len() as isize;
        (self.end as isize + offset).rem_euclid(capacity) as usize
    }

    /// The absolute index of the next slot to be written
    pub fn end(&self) -> usize {
        self.end
    }

    /// Get the value at an absolute slot index
    pub fn get(&self, index: usize) -> Option<&T> {
        self.data.get(index)
    }

    /// Get a mutable reference to the value at an absolute slot index
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.data.get_mut(index)
    }

    /// Get the value at a relative offset (see [`RingHistoryBuffer::index`])
    pub fn at_offset(&self, offset: isize) -> &T {
        &self.data[self.index(offset)]
    }

    /// The most recently written value, if anything was written yet
    pub fn latest(&self) -> Option<&T> {
        (self.written > 0).then(|| self.at_offset(-1))
    }

    /// Iterate from absolute slot `start` (included) to `end` (excluded), following wraparound
    ///
    /// Out-of-range indices yield an empty iterator.
    pub fn iter_range(&self, start: usize, end: usize) -> impl Iterator<Item = &T> + '_ {
        let capacity = self.data.len();
        let count = self.range_len(start, end).unwrap_or(0);
        (0..count).map(move |i| &self.data[(start + i) % capacity])
    }

    /// Fixed number of slots
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Total number of values written since construction
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Number of slots that hold a written (not default-initialized) value
    pub fn retained(&self) -> usize {
        self.written.min(self.data.len() as u64) as usize
    }

    fn range_len(&self, start: usize, end: usize) -> Result<usize> {
        let capacity = self.data.len();
        for index in [start, end] {
            if index >= capacity {
                return Err(Error::IndexOutOfRange { index, capacity });
            }
        }
        Ok((end + capacity - start) % capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(capacity: usize, values: impl IntoIterator<Item = i32>) -> RingHistoryBuffer<i32> {
        let mut buffer = RingHistoryBuffer::new(capacity);
        for value in values {
            buffer.add_value(value);
        }
        buffer
    }

    #[test]
    fn test_new() {
        let buffer: RingHistoryBuffer<u32> = RingHistoryBuffer::new(64);
        assert_eq!(buffer.capacity(), 64);
        assert_eq!(buffer.end(), 0);
        assert_eq!(buffer.retained(), 0);
        assert!(buffer.latest().is_none());
    }

    #[test]
    #[should_panic(expected = "Capacity must be greater than 0")]
    fn test_zero_capacity_panics() {
        let _ = RingHistoryBuffer::<u8>::new(0);
    }

    #[test]
    fn test_latest_write_before_wrap() {
        let capacity = 8;
        let mut buffer = RingHistoryBuffer::new(capacity);
        for k in 1..=capacity as i32 {
            buffer.add_value(k * 10);
            assert_eq!(buffer.index(-1), (k - 1) as usize);
            assert_eq!(*buffer.at_offset(-1), k * 10);
        }
    }

    #[test]
    fn test_latest_write_after_wrap() {
        let capacity = 4;
        let mut buffer = RingHistoryBuffer::new(capacity);
        for k in 1..=11 {
            buffer.add_value(k);
            // the k-th write lands on slot (k - 1) mod C, overwriting write k - C
            assert_eq!(buffer.index(-1), ((k - 1) % capacity as i32) as usize);
            assert_eq!(buffer.latest(), Some(&k));
        }
        assert_eq!(buffer.retained(), capacity);
        assert_eq!(buffer.written(), 11);
        // slots now hold writes 8..=11
        assert_eq!(*buffer.at_offset(-4), 8);
    }

    #[test]
    fn test_index_wraps_many_times() {
        let capacity = 7;
        let buffer = filled(capacity, 0..3);
        for k in -10..=10isize {
            let offset = k * capacity as isize;
            assert_eq!(buffer.index(offset), buffer.end());
            assert_eq!(buffer.index(offset - 1), 2);
            assert_eq!(buffer.index(offset + 2), 5);
        }
    }

    #[test]
    fn test_index_wraps_below_zero() {
        let buffer = filled(5, [1]);
        assert_eq!(buffer.end(), 1);
        assert_eq!(buffer.index(-3), 3);
    }

    #[test]
    fn test_capacity_five_scenario() {
        let buffer = filled(5, 1..=7);

        assert_eq!(*buffer.at_offset(-1), 7);
        assert_eq!(*buffer.at_offset(-5), 3);

        let mut out = [0; 5];
        let copied = buffer
            .copy_range(buffer.index(-3), buffer.end(), &mut out)
            .unwrap();
        assert_eq!(copied, 3);
        assert_eq!(&out[..copied], &[5, 6, 7]);
    }

    #[test]
    fn test_copy_range_empty() {
        let buffer = filled(5, 1..=3);
        let mut out: [i32; 0] = [];
        assert_eq!(buffer.copy_range(2, 2, &mut out).unwrap(), 0);
    }

    #[test]
    fn test_copy_range_insufficient_destination() {
        let buffer = filled(6, 1..=6);
        let mut out = [0; 2];
        let err = buffer
            .copy_range(buffer.index(-4), buffer.end(), &mut out)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientDestinationCapacity {
                required: 4,
                available: 2
            }
        ));
        assert_eq!(out, [0, 0]);
    }

    #[test]
    fn test_copy_range_rejects_out_of_range_index() {
        let buffer = filled(3, 1..=3);
        let mut out = [0; 3];
        assert!(matches!(
            buffer.copy_range(3, 0, &mut out),
            Err(Error::IndexOutOfRange { index: 3, capacity: 3 })
        ));
        assert_eq!(buffer.iter_range(5, 0).count(), 0);
    }

    #[test]
    fn test_add_slice_and_iter_range() {
        let mut buffer = RingHistoryBuffer::new(4);
        buffer.add_slice(&[1, 2, 3, 4, 5, 6]);

        let values: Vec<_> = buffer
            .iter_range(buffer.index(-3), buffer.end())
            .copied()
            .collect();
        assert_eq!(values, vec![4, 5, 6]);
    }

    #[test]
    fn test_stale_slots_are_returned_without_error() {
        let buffer = filled(3, 1..=5);
        // offset -4 aliases -1 and silently returns the latest value
        assert_eq!(*buffer.at_offset(-4), 5);
    }
}
