//! Pipeline orchestration
//!
//! Builds the two cells, hands each stage its descriptor and launches all
//! three on the compio runtime. `run` returns only after every stage has been
//! joined, so no cell is torn down while a stage is still draining it.

use std::any::Any;
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::cell::BufferCell;
use crate::error::{PipelineError, Result};
use crate::io::{LineSink, UnitSource};
use crate::stage::{
    Reader, ReaderStats, TrailingLine, Transformer, TransformerStats, Writer, WriterStats,
};

/// Default slots per inter-stage buffer
pub const DEFAULT_CAPACITY: usize = 80;

/// Default output line width
pub const DEFAULT_LINE_WIDTH: usize = 80;

/// Startup parameters, fixed for the whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Slots in each of the two inter-stage buffers
    pub capacity: usize,
    /// Bytes per emitted line
    pub line_width: usize,
    /// Handling of a final line shorter than `line_width`
    pub trailing: TrailingLine,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            line_width: DEFAULT_LINE_WIDTH,
            trailing: TrailingLine::Discard,
        }
    }
}

impl PipelineConfig {
    /// Check the configuration before anything is launched
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if either the capacity or the
    /// line width is zero.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "buffer capacity must be at least 1".to_string(),
            ));
        }
        if self.line_width == 0 {
            return Err(PipelineError::InvalidConfig(
                "line width must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Summary of a completed run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    /// Reader counters
    pub reader: ReaderStats,
    /// Transformer counters
    pub transformer: TransformerStats,
    /// Writer counters
    pub writer: WriterStats,
    /// Wall time from cell construction to the last join
    pub duration: Duration,
}

/// Result of [`Pipeline::run`]: the statistics and the sink handed back
#[derive(Debug)]
pub struct PipelineReport<K> {
    /// Per-stage counters and elapsed time
    pub stats: PipelineStats,
    /// The sink passed to [`Pipeline::run`]
    pub sink: K,
}

/// The reader → transformer → writer pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline from a validated configuration
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails [`PipelineConfig::validate`].
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration this pipeline runs with
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline from `source` to `sink` and wait for all stages
    ///
    /// Must be called from within a compio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::StageFailed`] if a stage task panicked, which
    /// takes precedence over the disconnects its neighbours then observe.
    /// Otherwise returns the reader's or writer's error. All three stages are
    /// joined before any error is returned.
    pub async fn run<S, K>(&self, source: S, sink: K) -> Result<PipelineReport<K>>
    where
        S: UnitSource + 'static,
        K: LineSink + 'static,
    {
        let start = Instant::now();

        let (raw_tx, raw_rx) = BufferCell::channel(self.config.capacity)?;
        let (cooked_tx, cooked_rx) = BufferCell::channel(self.config.capacity)?;

        let reader = Reader::new(source, raw_tx);
        let transformer = Transformer::new(raw_rx, cooked_tx);
        let writer = Writer::new(
            cooked_rx,
            sink,
            self.config.line_width,
            self.config.trailing,
        );

        debug!(
            capacity = self.config.capacity,
            line_width = self.config.line_width,
            "launching pipeline stages"
        );
        let reader = compio::runtime::spawn(reader.run());
        let transformer = compio::runtime::spawn(transformer.run());
        let writer = compio::runtime::spawn(writer.run());

        // Join everything first; only then look at the outcomes
        let reader = reader.await;
        let transformer = transformer.await;
        let writer = writer.await;
        debug!("all pipeline stages joined");

        let reader = joined("reader", reader);
        let transformer = joined("transformer", transformer);
        let writer = joined("writer", writer);

        let (reader, transformer, writer) = (reader?, transformer?, writer?);
        let reader = reader?;
        let transformer = transformer?;
        let (writer, sink) = writer?;

        Ok(PipelineReport {
            stats: PipelineStats {
                reader,
                transformer,
                writer,
                duration: start.elapsed(),
            },
            sink,
        })
    }
}

/// Map a stage task's join outcome, turning a panic into `StageFailed`
fn joined<T>(
    stage: &'static str,
    outcome: std::result::Result<T, Box<dyn Any + Send>>,
) -> Result<T> {
    outcome.map_err(|_| {
        error!(stage, "stage panicked");
        PipelineError::StageFailed { stage }
    })
}
