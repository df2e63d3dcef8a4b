//! The three pipeline stages
//!
//! Each stage is a descriptor built before launch: it owns its private state
//! and holds handles to the cells it reads from or writes to. `run` consumes
//! the descriptor and loops until the end-of-stream sentinel reaches it.
//!
//! ```text
//! Reader --(cell A)--> Transformer --(cell B)--> Writer
//! ```

use tracing::{debug, error, warn};

use crate::cell::{Consumer, Producer};
use crate::error::{PipelineError, Result};
use crate::io::{LineSink, UnitSource};
use crate::unit::Unit;

const NEWLINE: Unit = Unit::Byte(b'\n');
const SPACE: Unit = Unit::Byte(b' ');
const STAR: Unit = Unit::Byte(b'*');
const CARET: Unit = Unit::Byte(b'^');

/// What the writer does with a final line shorter than the line width
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrailingLine {
    /// Drop it; every emitted line is exactly the configured width
    #[default]
    Discard,
    /// Emit it as a shorter final line
    Flush,
}

/// Counters reported by the reader
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReaderStats {
    /// Bytes deposited into the first cell, end marker excluded
    pub bytes_read: u64,
}

/// Counters reported by the transformer
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransformerStats {
    /// Bytes taken from the input cell
    pub consumed: u64,
    /// Bytes placed in the output cell
    pub forwarded: u64,
    /// `**` pairs collapsed into `^`
    pub carets: u64,
    /// Newlines rewritten as spaces
    pub newlines: u64,
}

/// Counters reported by the writer
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriterStats {
    /// Bytes taken from the second cell
    pub consumed: u64,
    /// Lines accepted by the sink
    pub lines_written: u64,
    /// Bytes of a trailing partial line that were not emitted
    pub discarded: u64,
}

/// Sole producer into the first cell
pub struct Reader<S> {
    source: S,
    output: Producer,
}

impl<S: UnitSource> Reader<S> {
    /// Bind `source` to the first cell's producing end
    pub fn new(source: S, output: Producer) -> Self {
        Self { source, output }
    }

    /// Copy every unit from the source into the output cell, end marker included
    ///
    /// A read error ends the stream early: the end marker is still deposited so
    /// downstream stages terminate, then the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by the source, or
    /// [`PipelineError::Disconnected`] if the transformer went away.
    pub async fn run(mut self) -> Result<ReaderStats> {
        debug!(source = self.source.name(), "reader started");
        let mut stats = ReaderStats::default();
        let mut failure = None;

        loop {
            let unit = match self.source.next_unit().await {
                Ok(unit) => unit,
                Err(e) => {
                    error!("Failed to read from {}: {}", self.source.name(), e);
                    failure = Some(e);
                    Unit::End
                }
            };

            self.output.deposit(unit).await?;

            if unit.is_end() {
                break;
            }
            stats.bytes_read += 1;
        }

        debug!(bytes = stats.bytes_read, "reader finished");
        failure.map_or(Ok(stats), Err)
    }
}

/// Consumer of the first cell and producer into the second
///
/// Rewrites newlines as spaces and collapses each `**` into a single `^`.
pub struct Transformer {
    input: Consumer,
    output: Producer,
    stats: TransformerStats,
}

impl Transformer {
    /// Bind the first cell's consuming end to the second cell's producing end
    #[must_use]
    pub fn new(input: Consumer, output: Producer) -> Self {
        Self {
            input,
            output,
            stats: TransformerStats::default(),
        }
    }

    /// Run until the end marker has been forwarded
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Disconnected`] if a neighbouring stage went
    /// away before the end marker arrived.
    pub async fn run(mut self) -> Result<TransformerStats> {
        debug!("transformer started");

        loop {
            let first = self.take().await?;

            if first != STAR {
                self.emit(first).await?;
                if first.is_end() {
                    break;
                }
                continue;
            }

            let second = self.take().await?;
            if second == STAR {
                self.stats.carets += 1;
                self.emit(CARET).await?;
            } else {
                // Lone star: both pass through in order, the end marker included
                self.emit(first).await?;
                self.emit(second).await?;
                if second.is_end() {
                    break;
                }
            }
        }

        debug!(
            consumed = self.stats.consumed,
            forwarded = self.stats.forwarded,
            carets = self.stats.carets,
            "transformer finished"
        );
        Ok(self.stats)
    }

    /// Consume one unit, rewriting a newline as a space
    async fn take(&mut self) -> Result<Unit> {
        let unit = self.input.consume().await?;
        if !unit.is_end() {
            self.stats.consumed += 1;
        }
        if unit == NEWLINE {
            self.stats.newlines += 1;
            return Ok(SPACE);
        }
        Ok(unit)
    }

    async fn emit(&mut self, unit: Unit) -> Result<()> {
        self.output.deposit(unit).await?;
        if !unit.is_end() {
            self.stats.forwarded += 1;
        }
        Ok(())
    }
}

/// Sole consumer of the second cell; emits fixed-width lines
pub struct Writer<K> {
    input: Consumer,
    sink: K,
    line_width: usize,
    trailing: TrailingLine,
}

impl<K: LineSink> Writer<K> {
    /// Bind the second cell's consuming end to `sink`
    pub fn new(input: Consumer, sink: K, line_width: usize, trailing: TrailingLine) -> Self {
        Self {
            input,
            sink,
            line_width,
            trailing,
        }
    }

    /// Consume until the end marker, emitting a line every `line_width` bytes
    ///
    /// If the sink fails, the writer stops writing but keeps draining its input
    /// until the end marker, so the upstream stages can still finish.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by the sink, or
    /// [`PipelineError::Disconnected`] if the transformer went away before
    /// sending the end marker.
    pub async fn run(mut self) -> Result<(WriterStats, K)> {
        debug!(sink = self.sink.name(), width = self.line_width, "writer started");
        let mut stats = WriterStats::default();
        let mut failure: Option<PipelineError> = None;
        let mut line = Vec::with_capacity(self.line_width);

        while let Unit::Byte(byte) = self.input.consume().await? {
            stats.consumed += 1;
            line.push(byte);

            if line.len() == self.line_width {
                self.emit(&line, &mut stats, &mut failure).await;
                line.clear();
            }
        }

        if !line.is_empty() {
            match self.trailing {
                TrailingLine::Flush => self.emit(&line, &mut stats, &mut failure).await,
                TrailingLine::Discard => {
                    debug!(len = line.len(), "discarding partial trailing line");
                    stats.discarded = line.len() as u64;
                }
            }
        }

        debug!(lines = stats.lines_written, "writer finished");
        match failure {
            Some(e) => Err(e),
            None => Ok((stats, self.sink)),
        }
    }

    async fn emit(
        &mut self,
        line: &[u8],
        stats: &mut WriterStats,
        failure: &mut Option<PipelineError>,
    ) {
        if failure.is_some() {
            return;
        }

        match self.sink.write_line(line).await {
            Ok(()) => stats.lines_written += 1,
            Err(e) => {
                warn!(
                    "Failed to write to {}: {}; draining remaining input",
                    self.sink.name(),
                    e
                );
                *failure = Some(e);
            }
        }
    }
}
