//! Fixed-capacity FIFO of pipeline units
//!
//! The buffer does no locking of its own. Callers go through
//! [`crate::cell::BufferCell`], which reserves a slot and takes the cell's
//! mutex before touching it.

use std::collections::VecDeque;

use crate::unit::Unit;

/// A FIFO queue holding at most `capacity` units
#[derive(Debug)]
pub struct BoundedBuffer {
    slots: VecDeque<Unit>,
    capacity: usize,
}

impl BoundedBuffer {
    /// Create an empty buffer with room for `capacity` units
    ///
    /// Storage is allocated once here and never grows.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `unit` at the tail
    ///
    /// # Panics
    ///
    /// Panics if the buffer is full. Callers reserve a slot first, so this
    /// only fires on a broken handoff protocol.
    pub fn deposit(&mut self, unit: Unit) {
        assert!(
            self.slots.len() < self.capacity,
            "deposit into full buffer (capacity {})",
            self.capacity
        );
        self.slots.push_back(unit);
    }

    /// Remove and return the unit at the head
    ///
    /// # Panics
    ///
    /// Panics if the buffer is empty. As with [`BoundedBuffer::deposit`], a
    /// caller holding a full-slot reservation never observes this.
    pub fn consume(&mut self) -> Unit {
        match self.slots.pop_front() {
            Some(unit) => unit,
            None => panic!("consume from empty buffer"),
        }
    }

    /// Units currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no unit is pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Maximum number of units, fixed at creation
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_new_buffer_is_empty() {
        let buf = BoundedBuffer::new(80);
        assert!(buf.is_empty());
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), 80);
    }

    #[rstest]
    #[case(1, 1)]
    #[case(4, 3)]
    #[case(80, 80)]
    fn test_fifo_round_trip(#[case] capacity: usize, #[case] count: usize) {
        let mut buf = BoundedBuffer::new(capacity);
        let units: Vec<Unit> = (0..count).map(|i| Unit::Byte(b'a' + (i % 26) as u8)).collect();

        for unit in &units {
            buf.deposit(*unit);
        }
        assert_eq!(buf.len(), count);

        let drained: Vec<Unit> = (0..count).map(|_| buf.consume()).collect();
        assert_eq!(drained, units);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_interleaved_operations_keep_order() {
        let mut buf = BoundedBuffer::new(2);
        buf.deposit(Unit::Byte(b'x'));
        buf.deposit(Unit::Byte(b'y'));
        assert_eq!(buf.consume(), Unit::Byte(b'x'));
        buf.deposit(Unit::End);
        assert_eq!(buf.consume(), Unit::Byte(b'y'));
        assert_eq!(buf.consume(), Unit::End);
    }

    #[test]
    fn test_sentinel_stored_unchanged() {
        let mut buf = BoundedBuffer::new(1);
        buf.deposit(Unit::End);
        assert_eq!(buf.consume(), Unit::End);
    }

    #[test]
    #[should_panic(expected = "deposit into full buffer")]
    fn test_deposit_into_full_panics() {
        let mut buf = BoundedBuffer::new(1);
        buf.deposit(Unit::Byte(b'a'));
        buf.deposit(Unit::Byte(b'b'));
    }

    #[test]
    #[should_panic(expected = "consume from empty buffer")]
    fn test_consume_from_empty_panics() {
        let mut buf = BoundedBuffer::new(1);
        let _ = buf.consume();
    }
}
