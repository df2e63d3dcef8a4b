//! charpipe: reformat standard input into fixed-width lines
//!
//! Newlines become spaces and `**` becomes `^`. The work is split across a
//! reader, a transformer and a writer task connected by bounded buffers.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};

use charpipe::cli::Args;
use charpipe::io::{ReadSource, WriteSink};
use charpipe::Pipeline;

#[compio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Logs go to stderr; stdout carries only pipeline output
    let level = if args.quiet {
        Level::ERROR
    } else {
        match args.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting charpipe v{}", env!("CARGO_PKG_VERSION"));

    let config = args.to_config().context("Invalid arguments")?;
    info!("Buffer capacity: {}", config.capacity);
    info!("Line width: {}", config.line_width);
    info!("Trailing line: {:?}", config.trailing);

    let pipeline = Pipeline::new(config).context("Invalid configuration")?;
    let report = pipeline
        .run(ReadSource::stdin(), WriteSink::stdout())
        .await
        .context("Pipeline failed")?;

    let stats = report.stats;
    info!("Pipeline completed successfully");
    info!("Bytes read: {}", stats.reader.bytes_read);
    info!("Carets produced: {}", stats.transformer.carets);
    info!("Lines written: {}", stats.writer.lines_written);
    if stats.writer.discarded > 0 {
        info!("Partial trailing line discarded: {} bytes", stats.writer.discarded);
    }
    info!("Duration: {:?}", stats.duration);

    Ok(())
}
