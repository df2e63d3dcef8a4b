//! Bounded single-producer/single-consumer handoff between two stages
//!
//! A [`BufferCell`] bundles one [`BoundedBuffer`] with its three semaphores:
//!
//! - `empty_slots` counts free slots (starts at the capacity)
//! - `full_slots` counts occupied slots (starts at zero)
//! - `mutex` is binary (starts at one) and serializes buffer mutation
//!
//! Every transfer runs the same four steps: claim the slot semaphore, take the
//! mutex, touch the buffer, then release the mutex and signal the other side.
//! The slot is always claimed before the mutex, so a stage never sleeps on a
//! full or empty buffer while holding the lock its counterpart needs.
//!
//! Dropping either end closes the cell and releases one phantom permit to the
//! other side, so a peer suspended on a slot semaphore wakes up and fails with
//! [`PipelineError::Disconnected`] instead of waiting forever. Units already in
//! the buffer are still delivered before the consumer sees the disconnect.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use compio_sync::{Semaphore, SemaphorePermit};
use tracing::trace;

use crate::buffer::BoundedBuffer;
use crate::error::{PipelineError, Result};
use crate::unit::Unit;

/// Shared state of one inter-stage buffer
pub struct BufferCell {
    capacity: usize,
    buffer: UnsafeCell<BoundedBuffer>,
    mutex: Semaphore,
    full_slots: Semaphore,
    empty_slots: Semaphore,
    /// Set when either end is dropped
    closed: AtomicBool,
}

// SAFETY: the buffer is only reached through `with_buffer`, which requires a
// permit from `mutex`. That semaphore is created with a single permit and only
// ever released by the permit's drop, so at most one reference exists at a time.
unsafe impl Sync for BufferCell {}

impl BufferCell {
    /// Create a cell with `capacity` slots and return its two ends
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `capacity` is zero, since
    /// such a cell could never transfer a unit.
    pub fn channel(capacity: usize) -> Result<(Producer, Consumer)> {
        if capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "buffer capacity must be at least 1".to_string(),
            ));
        }

        let cell = Arc::new(Self {
            capacity,
            buffer: UnsafeCell::new(BoundedBuffer::new(capacity)),
            mutex: Semaphore::new(1),
            full_slots: Semaphore::new(0),
            empty_slots: Semaphore::new(capacity),
            closed: AtomicBool::new(false),
        });

        Ok((
            Producer {
                cell: Arc::clone(&cell),
            },
            Consumer { cell },
        ))
    }

    fn with_buffer<R>(
        &self,
        _permit: &SemaphorePermit<'_>,
        f: impl FnOnce(&mut BoundedBuffer) -> R,
    ) -> R {
        // SAFETY: the caller holds the only permit of `self.mutex`.
        unsafe { f(&mut *self.buffer.get()) }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// The depositing end of a [`BufferCell`]
///
/// Not `Clone`: each cell has exactly one producer.
pub struct Producer {
    cell: Arc<BufferCell>,
}

impl Producer {
    /// Append `unit`, suspending while the buffer is full
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Disconnected`] if the consumer has been
    /// dropped, including while this call was suspended.
    pub async fn deposit(&mut self, unit: Unit) -> Result<()> {
        let cell = &*self.cell;
        if cell.is_closed() {
            return Err(PipelineError::Disconnected);
        }

        cell.empty_slots.decrement().await;
        if cell.is_closed() {
            // Leave the phantom slot for the next caller
            cell.empty_slots.increment();
            return Err(PipelineError::Disconnected);
        }
        let permit = cell.mutex.acquire().await;
        cell.with_buffer(&permit, |buf| buf.deposit(unit));
        drop(permit);
        cell.full_slots.increment();

        trace!(%unit, "deposited");
        Ok(())
    }

    /// Number of slots in the cell
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cell.capacity
    }

    /// Slots not currently claimed by a pending or in-flight deposit
    #[must_use]
    pub fn free_slots(&self) -> usize {
        let permits = self.cell.empty_slots.available_permits();
        permits.saturating_sub(usize::from(self.cell.is_closed()))
    }

    /// Whether the consumer has been dropped
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cell.is_closed()
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.cell.close();
        self.cell.full_slots.increment();
    }
}

/// The consuming end of a [`BufferCell`]
///
/// Not `Clone`: each cell has exactly one consumer.
pub struct Consumer {
    cell: Arc<BufferCell>,
}

impl Consumer {
    /// Remove the oldest unit, suspending while the buffer is empty
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Disconnected`] once the producer has been
    /// dropped and every unit it deposited has been consumed.
    pub async fn consume(&mut self) -> Result<Unit> {
        let cell = &*self.cell;

        cell.full_slots.decrement().await;
        let permit = cell.mutex.acquire().await;
        // An empty buffer here means the permit was the producer's phantom
        let unit = cell.with_buffer(&permit, |buf| (!buf.is_empty()).then(|| buf.consume()));
        drop(permit);
        let Some(unit) = unit else {
            cell.full_slots.increment();
            return Err(PipelineError::Disconnected);
        };
        cell.empty_slots.increment();

        trace!(%unit, "consumed");
        Ok(unit)
    }

    /// Units deposited but not yet consumed
    #[must_use]
    pub fn pending(&self) -> usize {
        let permits = self.cell.full_slots.available_permits();
        permits.saturating_sub(usize::from(self.cell.is_closed()))
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.cell.close();
        self.cell.empty_slots.increment();
    }
}
