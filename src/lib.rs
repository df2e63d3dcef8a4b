//! charpipe: a three-stage concurrent text pipeline
//!
//! A reader, a transformer and a writer run as separate tasks on the compio
//! runtime and hand bytes to each other through two bounded buffers. Each
//! buffer is guarded by a counting-semaphore triple (free slots, full slots
//! and a binary mutex) from the `compio-sync` crate.
//!
//! The transformer rewrites newlines as spaces and collapses `**` into `^`;
//! the writer emits the result in fixed-width lines.

pub mod buffer;
pub mod cell;
pub mod cli;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod stage;
pub mod unit;

// Re-export commonly used types
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, PipelineConfig, PipelineReport, PipelineStats};
pub use stage::TrailingLine;
pub use unit::Unit;
