//! Async counting semaphore for compio runtime
//!
//! Unlike a pure concurrency limiter, a counting semaphore lets one task
//! decrement and a *different* task increment. This is what a bounded
//! producer/consumer handoff needs: the producer claims a free slot and the
//! consumer hands it back.
//!
//! # Example
//!
//! ```rust,no_run
//! use compio_sync::Semaphore;
//!
//! # async fn example() {
//! let full_slots = Semaphore::new(0);
//!
//! let consumer = full_slots.clone();
//! let handle = compio::runtime::spawn(async move {
//!     // Suspends until the producer signals
//!     consumer.decrement().await;
//! });
//!
//! full_slots.increment();
//! handle.await.unwrap();
//! # }
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use thiserror::Error;

/// Errors raised when constructing a semaphore
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaphoreError {
    /// The initial count was below zero
    #[error("Semaphore value cannot be negative (got {0})")]
    NegativeCount(i64),
}

/// A compio-compatible async counting semaphore
///
/// # Design
///
/// - **Lock-free fast path**: the count is an atomic, decremented with a CAS loop
/// - **FIFO waiters**: suspended tasks are queued and woken one per increment
/// - **Recheck after wake**: a woken task retries the check-and-decrement, so
///   a wake-up never counts as a successful decrement by itself
/// - **Cloneable**: clones share the same count and wait queue
#[derive(Clone)]
pub struct Semaphore {
    /// Shared state between all clones of this semaphore
    inner: Arc<SemaphoreInner>,
}

/// Internal shared state for the semaphore
struct SemaphoreInner {
    /// Current count (atomic for lock-free operations)
    permits: AtomicUsize,
    /// Tasks suspended in `decrement`
    waiters: Mutex<Waiters>,
}

/// Queue of suspended decrements, keyed so a future can find its own entry
#[derive(Default)]
struct Waiters {
    next_id: u64,
    queue: VecDeque<(u64, Waker)>,
}

impl Semaphore {
    /// Create a new semaphore with the given initial count
    ///
    /// A count of zero is valid: the first `decrement` will suspend until
    /// someone calls `increment`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use compio_sync::Semaphore;
    ///
    /// let sem = Semaphore::new(0);
    /// assert_eq!(sem.available_permits(), 0);
    /// ```
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self {
            inner: Arc::new(SemaphoreInner {
                permits: AtomicUsize::new(permits),
                waiters: Mutex::new(Waiters::default()),
            }),
        }
    }

    /// Create a semaphore from a signed initial count
    ///
    /// # Errors
    ///
    /// Returns [`SemaphoreError::NegativeCount`] if `initial` is below zero.
    ///
    /// # Example
    ///
    /// ```rust
    /// use compio_sync::{Semaphore, SemaphoreError};
    ///
    /// assert!(Semaphore::try_new(3).is_ok());
    /// assert_eq!(
    ///     Semaphore::try_new(-1).err(),
    ///     Some(SemaphoreError::NegativeCount(-1))
    /// );
    /// ```
    pub fn try_new(initial: i64) -> Result<Self, SemaphoreError> {
        let permits =
            usize::try_from(initial).map_err(|_| SemaphoreError::NegativeCount(initial))?;
        Ok(Self::new(permits))
    }

    /// Increment the count and wake the oldest suspended task, if any
    ///
    /// Never blocks.
    pub fn increment(&self) {
        self.inner.permits.fetch_add(1, Ordering::Release);
        self.wake_one();
    }

    /// Decrement the count, suspending while it is zero
    ///
    /// Returns only once this call itself performed the decrement.
    pub async fn decrement(&self) {
        Decrement {
            semaphore: self,
            waiter: None,
        }
        .await;
    }

    /// Decrement the count if it is currently positive
    ///
    /// # Example
    ///
    /// ```rust
    /// use compio_sync::Semaphore;
    ///
    /// let sem = Semaphore::new(1);
    /// assert!(sem.try_decrement());
    /// assert!(!sem.try_decrement());
    /// ```
    #[must_use]
    pub fn try_decrement(&self) -> bool {
        let mut current = self.inner.permits.load(Ordering::Acquire);

        loop {
            if current == 0 {
                return false;
            }

            match self.inner.permits.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Decrement the count and return a guard that increments it on drop
    ///
    /// This is the binary-semaphore (mutex) usage: the same task takes and
    /// gives back the permit.
    pub async fn acquire(&self) -> SemaphorePermit<'_> {
        self.decrement().await;
        SemaphorePermit { semaphore: self }
    }

    /// Non-suspending variant of [`Semaphore::acquire`]
    #[must_use]
    pub fn try_acquire(&self) -> Option<SemaphorePermit<'_>> {
        self.try_decrement()
            .then(|| SemaphorePermit { semaphore: self })
    }

    /// Get the current count
    ///
    /// Useful for monitoring and tests; the value may change immediately.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.inner.permits.load(Ordering::Acquire)
    }

    /// Number of tasks currently suspended in `decrement`
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.waiters().queue.len()
    }

    fn waiters(&self) -> MutexGuard<'_, Waiters> {
        self.inner
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn wake_one(&self) {
        let next = self.waiters().queue.pop_front();
        if let Some((_, waker)) = next {
            waker.wake();
        }
    }

    /// Insert or refresh the waker for waiter `id`, allocating an id on first use
    fn register(&self, id: &mut Option<u64>, waker: &Waker) {
        let mut waiters = self.waiters();
        let key = match *id {
            Some(key) => key,
            None => {
                let key = waiters.next_id;
                waiters.next_id += 1;
                *id = Some(key);
                key
            }
        };

        if let Some(entry) = waiters.queue.iter_mut().find(|(k, _)| *k == key) {
            if !entry.1.will_wake(waker) {
                entry.1 = waker.clone();
            }
        } else {
            waiters.queue.push_back((key, waker.clone()));
        }
    }

    /// Remove waiter `id`; returns false if an increment already popped it
    fn unregister(&self, id: u64) -> bool {
        let mut waiters = self.waiters();
        match waiters.queue.iter().position(|(k, _)| *k == id) {
            Some(pos) => {
                waiters.queue.remove(pos);
                true
            }
            None => false,
        }
    }
}

/// RAII guard returned by [`Semaphore::acquire`]; increments on drop
pub struct SemaphorePermit<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.semaphore.increment();
    }
}

/// Future behind [`Semaphore::decrement`]
///
/// 1. Try the fast path
/// 2. Register the task's waker in the queue
/// 3. Retry once more so an increment racing with registration is not missed
struct Decrement<'a> {
    semaphore: &'a Semaphore,
    /// Queue key, assigned on first registration
    waiter: Option<u64>,
}

impl Decrement<'_> {
    fn complete(&mut self) {
        if let Some(id) = self.waiter.take() {
            self.semaphore.unregister(id);
        }
    }
}

impl Future for Decrement<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.semaphore.try_decrement() {
            this.complete();
            return Poll::Ready(());
        }

        this.semaphore.register(&mut this.waiter, cx.waker());

        if this.semaphore.try_decrement() {
            this.complete();
            return Poll::Ready(());
        }

        Poll::Pending
    }
}

impl Drop for Decrement<'_> {
    fn drop(&mut self) {
        // A wake-up consumed by a future that never decremented is passed on
        if let Some(id) = self.waiter.take() {
            if !self.semaphore.unregister(id) && self.semaphore.available_permits() > 0 {
                self.semaphore.wake_one();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    /// Yield once to the compio scheduler so spawned tasks get to run
    struct YieldNow(bool);

    impl Future for YieldNow {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.0 {
                Poll::Ready(())
            } else {
                self.0 = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }

    async fn yield_now() {
        YieldNow(false).await;
    }

    #[test]
    fn test_semaphore_new() {
        let sem = Semaphore::new(100);
        assert_eq!(sem.available_permits(), 100);
        assert_eq!(sem.waiting(), 0);

        let empty = Semaphore::new(0);
        assert_eq!(empty.available_permits(), 0);
    }

    #[test]
    fn test_semaphore_try_new_rejects_negative() {
        assert_eq!(
            Semaphore::try_new(-5).err(),
            Some(SemaphoreError::NegativeCount(-5))
        );
        assert_eq!(Semaphore::try_new(0).unwrap().available_permits(), 0);
        assert_eq!(Semaphore::try_new(80).unwrap().available_permits(), 80);
    }

    #[test]
    fn test_semaphore_try_decrement() {
        let sem = Semaphore::new(2);

        assert!(sem.try_decrement());
        assert_eq!(sem.available_permits(), 1);
        assert!(sem.try_decrement());
        assert_eq!(sem.available_permits(), 0);

        // Count never goes below zero
        assert!(!sem.try_decrement());
        assert_eq!(sem.available_permits(), 0);

        sem.increment();
        assert_eq!(sem.available_permits(), 1);
    }

    #[test]
    fn test_increment_beyond_initial() {
        let sem = Semaphore::new(0);
        for _ in 0..5 {
            sem.increment();
        }
        assert_eq!(sem.available_permits(), 5);
    }

    #[test]
    fn test_semaphore_permit_drop() {
        let sem = Semaphore::new(1);

        {
            let _permit = sem.try_acquire().unwrap();
            assert_eq!(sem.available_permits(), 0);
            assert!(sem.try_acquire().is_none());
        }

        assert_eq!(sem.available_permits(), 1);
    }

    #[compio::test]
    async fn test_decrement_fast_path() {
        let sem = Semaphore::new(2);

        sem.decrement().await;
        sem.decrement().await;
        assert_eq!(sem.available_permits(), 0);
        assert_eq!(sem.waiting(), 0);
    }

    #[compio::test]
    async fn test_decrement_blocks_until_increment() {
        let sem = Semaphore::new(0);
        let done = Arc::new(AtomicBool::new(false));

        let waiter = sem.clone();
        let flag = done.clone();
        let handle = compio::runtime::spawn(async move {
            waiter.decrement().await;
            flag.store(true, Ordering::SeqCst);
        });

        // Let the spawned task run and suspend
        for _ in 0..10 {
            yield_now().await;
        }
        assert!(!done.load(Ordering::SeqCst));
        assert_eq!(sem.waiting(), 1);

        sem.increment();
        handle.await.unwrap();

        assert!(done.load(Ordering::SeqCst));
        assert_eq!(sem.available_permits(), 0);
        assert_eq!(sem.waiting(), 0);
    }

    #[compio::test]
    async fn test_acquire_release_wakes_waiter() {
        let mutex = Semaphore::new(1);

        let permit = mutex.acquire().await;
        assert_eq!(mutex.available_permits(), 0);

        let other = mutex.clone();
        let handle = compio::runtime::spawn(async move {
            let _permit = other.acquire().await;
            42
        });

        for _ in 0..10 {
            yield_now().await;
        }
        assert_eq!(mutex.waiting(), 1);

        drop(permit);

        let result = handle.await.unwrap();
        assert_eq!(result, 42);
        assert_eq!(mutex.available_permits(), 1);
    }

    #[compio::test]
    async fn test_multiple_waiters_all_complete() {
        let sem = Semaphore::new(0);

        let mut handles = Vec::new();
        for i in 0..5 {
            let sem = sem.clone();
            handles.push(compio::runtime::spawn(async move {
                sem.decrement().await;
                i
            }));
        }

        for _ in 0..10 {
            yield_now().await;
        }
        assert_eq!(sem.waiting(), 5);

        for _ in 0..5 {
            sem.increment();
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(results, vec![0, 1, 2, 3, 4]);
        assert_eq!(sem.available_permits(), 0);
    }

    #[compio::test]
    async fn test_ping_pong_handoff() {
        // Two semaphores bouncing a token: neither side may run ahead
        let ping = Semaphore::new(1);
        let pong = Semaphore::new(0);
        let rounds = 1000;

        let (p, q) = (ping.clone(), pong.clone());
        let handle = compio::runtime::spawn(async move {
            for _ in 0..rounds {
                q.decrement().await;
                p.increment();
            }
        });

        for _ in 0..rounds {
            ping.decrement().await;
            pong.increment();
        }

        handle.await.unwrap();
        assert_eq!(ping.available_permits(), 1);
        assert_eq!(pong.available_permits(), 0);
    }

    #[compio::test]
    async fn test_high_contention_counts_balance() {
        let sem = Semaphore::new(3);
        let mut handles = Vec::new();

        for i in 0..200 {
            let sem = sem.clone();
            handles.push(compio::runtime::spawn(async move {
                let _permit = sem.acquire().await;
                yield_now().await;
                i
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(results.len(), 200);
        assert_eq!(sem.available_permits(), 3);
        assert_eq!(sem.waiting(), 0);
    }
}
