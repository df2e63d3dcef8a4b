//! Async synchronization primitives for compio runtime
//!
//! This crate provides async synchronization primitives that are compatible
//! with the [compio](https://github.com/compio-rs/compio) async runtime.
//!
//! # Primitives
//!
//! - [`Semaphore`] - Async counting semaphore for producer/consumer handoffs
//!
//! # Example
//!
//! ```rust,no_run
//! use compio_sync::Semaphore;
//!
//! #[compio::main]
//! async fn main() {
//!     let empty_slots = Semaphore::new(4);
//!     let full_slots = Semaphore::new(0);
//!
//!     let (empty, full) = (empty_slots.clone(), full_slots.clone());
//!     let consumer = compio::runtime::spawn(async move {
//!         for _ in 0..100 {
//!             full.decrement().await;
//!             empty.increment();
//!         }
//!     });
//!
//!     // Never more than 4 items in flight
//!     for _ in 0..100 {
//!         empty_slots.decrement().await;
//!         full_slots.increment();
//!     }
//!     consumer.await.unwrap();
//! }
//! ```

mod semaphore;

pub use semaphore::{Semaphore, SemaphoreError, SemaphorePermit};
