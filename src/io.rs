//! Input and output collaborators for the pipeline
//!
//! The reader stage pulls units from a [`UnitSource`] and the writer stage
//! pushes finished lines into a [`LineSink`]. Both are called by exactly one
//! stage, one call at a time.
//!
//! [`ReadSource`] and [`WriteSink`] wrap blocking `std::io` handles. Every
//! blocking call runs on compio's blocking pool, so a read that waits for
//! input suspends only the reader task while the other stages keep draining.

use std::io::{self, ErrorKind, Read, Write};

use async_trait::async_trait;
use tracing::warn;

use crate::error::{PipelineError, Result};
use crate::unit::Unit;

/// Bytes requested from the underlying reader per blocking call
const READ_CHUNK: usize = 8192;

/// Source of input units
///
/// Yields one byte per call, then [`Unit::End`] once exhausted.
#[async_trait(?Send)]
pub trait UnitSource {
    /// Read the next unit
    async fn next_unit(&mut self) -> Result<Unit>;

    /// Get source name (for debugging)
    fn name(&self) -> &str {
        "unknown"
    }
}

/// Destination for completed output lines
#[async_trait(?Send)]
pub trait LineSink {
    /// Write one complete line
    async fn write_line(&mut self, line: &[u8]) -> Result<()>;

    /// Get sink name (for debugging)
    fn name(&self) -> &str {
        "unknown"
    }
}

/// [`UnitSource`] over any blocking reader
///
/// The reader is moved onto the blocking pool for each chunk and handed back
/// afterwards, so it must be `Send`.
pub struct ReadSource<R> {
    /// `None` once exhausted, or if a blocking read panicked
    reader: Option<R>,
    chunk: Vec<u8>,
    pos: usize,
    name: String,
}

impl<R: Read + Send + 'static> ReadSource<R> {
    /// Wrap `reader`, naming the source for log output
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            reader: Some(reader),
            chunk: Vec::new(),
            pos: 0,
            name: name.into(),
        }
    }

    /// Fetch the next chunk off-thread
    ///
    /// Returns `false` once the reader reports end of input.
    async fn refill(&mut self) -> Result<bool> {
        let Some(mut reader) = self.reader.take() else {
            return Ok(false);
        };
        let mut chunk = std::mem::take(&mut self.chunk);
        chunk.resize(READ_CHUNK, 0);

        let (reader, mut chunk, result) = compio::runtime::spawn_blocking(move || {
            let result = loop {
                match reader.read(&mut chunk) {
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    other => break other,
                }
            };
            (reader, chunk, result)
        })
        .await
        .map_err(|e| io::Error::other(format!("blocking read panicked: {e:?}")))?;

        self.pos = 0;
        match result {
            Ok(0) => {
                chunk.clear();
                self.chunk = chunk;
                Ok(false)
            }
            Ok(n) => {
                chunk.truncate(n);
                self.chunk = chunk;
                self.reader = Some(reader);
                Ok(true)
            }
            Err(e) => {
                warn!("Read from {} failed: {}", self.name, e);
                chunk.clear();
                self.chunk = chunk;
                self.reader = Some(reader);
                Err(e.into())
            }
        }
    }
}

impl ReadSource<io::Stdin> {
    /// Source reading standard input
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(io::stdin(), "stdin")
    }
}

#[async_trait(?Send)]
impl<R: Read + Send + 'static> UnitSource for ReadSource<R> {
    async fn next_unit(&mut self) -> Result<Unit> {
        if self.pos == self.chunk.len() && !self.refill().await? {
            return Ok(Unit::End);
        }
        let byte = self.chunk[self.pos];
        self.pos += 1;
        Ok(Unit::Byte(byte))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// [`LineSink`] writing each line followed by a newline
///
/// Each line is written and flushed on the blocking pool.
pub struct WriteSink<W> {
    /// `None` only if a blocking write panicked
    writer: Option<W>,
    name: String,
}

impl<W: Write + Send + 'static> WriteSink<W> {
    /// Wrap `writer`, naming the sink for log output
    pub fn new(writer: W, name: impl Into<String>) -> Self {
        Self {
            writer: Some(writer),
            name: name.into(),
        }
    }

    /// Recover the underlying writer
    ///
    /// Returns `None` if a write panicked and took the writer with it.
    pub fn into_inner(self) -> Option<W> {
        self.writer
    }
}

impl WriteSink<io::Stdout> {
    /// Sink writing standard output
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout(), "stdout")
    }
}

#[async_trait(?Send)]
impl<W: Write + Send + 'static> LineSink for WriteSink<W> {
    async fn write_line(&mut self, line: &[u8]) -> Result<()> {
        let mut writer = self.writer.take().ok_or_else(|| {
            PipelineError::Sink(format!("{} lost its writer to a panic", self.name))
        })?;
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line);
        buf.push(b'\n');

        let (writer, result) = compio::runtime::spawn_blocking(move || {
            let result = writer.write_all(&buf).and_then(|()| writer.flush());
            (writer, result)
        })
        .await
        .map_err(|e| io::Error::other(format!("blocking write panicked: {e:?}")))?;

        self.writer = Some(writer);
        Ok(result?)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// In-memory [`LineSink`] that keeps every line it receives
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Vec<Vec<u8>>,
    /// Refuse writes after this many lines (for exercising failure paths)
    fail_after: Option<usize>,
}

impl MemorySink {
    /// An empty sink that accepts every line
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that accepts `limit` lines and rejects the rest
    #[must_use]
    pub fn failing_after(limit: usize) -> Self {
        Self {
            lines: Vec::new(),
            fail_after: Some(limit),
        }
    }

    /// Lines received so far, without their newline
    #[must_use]
    pub fn lines(&self) -> &[Vec<u8>] {
        &self.lines
    }

    /// Lines decoded lossily as UTF-8
    #[must_use]
    pub fn lines_lossy(&self) -> Vec<String> {
        self.lines
            .iter()
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }
}

#[async_trait(?Send)]
impl LineSink for MemorySink {
    async fn write_line(&mut self, line: &[u8]) -> Result<()> {
        if self.fail_after.is_some_and(|limit| self.lines.len() >= limit) {
            return Err(PipelineError::Sink(format!(
                "memory sink full after {} lines",
                self.lines.len()
            )));
        }
        self.lines.push(line.to_vec());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct BrokenReader;

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("device unplugged"))
        }
    }

    #[compio::test]
    async fn test_read_source_yields_bytes_then_end() {
        let mut source = ReadSource::new(Cursor::new(b"a\n".to_vec()), "cursor");
        assert_eq!(source.name(), "cursor");

        assert_eq!(source.next_unit().await.unwrap(), Unit::Byte(b'a'));
        assert_eq!(source.next_unit().await.unwrap(), Unit::Byte(b'\n'));
        assert_eq!(source.next_unit().await.unwrap(), Unit::End);
        // Exhausted sources keep reporting the end
        assert_eq!(source.next_unit().await.unwrap(), Unit::End);
    }

    #[compio::test]
    async fn test_read_source_propagates_errors() {
        let mut source = ReadSource::new(BrokenReader, "broken");
        assert!(matches!(
            source.next_unit().await,
            Err(PipelineError::Io(_))
        ));
    }

    #[compio::test]
    async fn test_write_sink_appends_newline() {
        let mut sink = WriteSink::new(Vec::new(), "vec");
        sink.write_line(b"abc").await.unwrap();
        sink.write_line(b"def").await.unwrap();
        assert_eq!(sink.into_inner().unwrap(), b"abc\ndef\n");
    }

    #[compio::test]
    async fn test_read_source_spans_chunks() {
        let input: Vec<u8> = (0..READ_CHUNK * 2 + 3).map(|i| (i % 251) as u8).collect();
        let mut source = ReadSource::new(Cursor::new(input.clone()), "cursor");

        let mut seen = Vec::new();
        while let Unit::Byte(b) = source.next_unit().await.unwrap() {
            seen.push(b);
        }
        assert_eq!(seen, input);
    }

    #[compio::test]
    async fn test_memory_sink_failure_limit() {
        let mut sink = MemorySink::failing_after(1);
        sink.write_line(b"ok").await.unwrap();
        assert!(matches!(
            sink.write_line(b"nope").await,
            Err(PipelineError::Sink(_))
        ));
        assert_eq!(sink.lines_lossy(), vec!["ok".to_string()]);
    }
}
