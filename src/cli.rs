//! Command-line interface definitions

use clap::Parser;
use compio_sync::SemaphoreError;

use crate::error::{PipelineError, Result};
use crate::pipeline::{PipelineConfig, DEFAULT_CAPACITY, DEFAULT_LINE_WIDTH};
use crate::stage::TrailingLine;

/// Read standard input, turn newlines into spaces and `**` into `^`, and print
/// it in fixed-width lines
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Slots in each inter-stage buffer
    ///
    /// Smaller values force more handoffs between stages; the output is the
    /// same for any positive value.
    #[arg(
        short = 'n',
        long,
        default_value_t = DEFAULT_CAPACITY as i64,
        allow_negative_numbers = true
    )]
    pub capacity: i64,

    /// Characters per output line
    #[arg(
        short = 'w',
        long,
        default_value_t = DEFAULT_LINE_WIDTH as i64,
        allow_negative_numbers = true
    )]
    pub line_width: i64,

    /// What to do with a final line shorter than the line width
    #[arg(long, value_enum, default_value_t = TrailingMode::Discard)]
    pub trailing: TrailingMode,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all logging except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Handling of a final partial line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TrailingMode {
    /// Drop it, so every line has the full width
    Discard,
    /// Print it as a shorter last line
    Flush,
}

impl From<TrailingMode> for TrailingLine {
    fn from(mode: TrailingMode) -> Self {
        match mode {
            TrailingMode::Discard => Self::Discard,
            TrailingMode::Flush => Self::Flush,
        }
    }
}

impl Args {
    /// Validate the arguments and build the pipeline configuration
    ///
    /// # Errors
    ///
    /// A negative capacity is reported as [`PipelineError::Semaphore`], since
    /// it would be the initial count of the free-slot semaphores. A negative
    /// or zero line width, or a zero capacity, is [`PipelineError::InvalidConfig`].
    pub fn to_config(&self) -> Result<PipelineConfig> {
        let capacity = usize::try_from(self.capacity)
            .map_err(|_| SemaphoreError::NegativeCount(self.capacity))?;

        let line_width = usize::try_from(self.line_width).map_err(|_| {
            PipelineError::InvalidConfig(format!(
                "line width cannot be negative (got {})",
                self.line_width
            ))
        })?;

        let config = PipelineConfig {
            capacity,
            line_width,
            trailing: self.trailing.into(),
        };
        config.validate()?;
        Ok(config)
    }
}
