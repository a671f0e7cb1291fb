//! Newline-delimited JSON adapters

use super::{SampleSource, SourceRecord};
use crate::error::{Result, SinkError, SinkResult};
use crate::sink::ResultSink;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tokio::sync::Mutex;
use tracing::debug;

/// Reads one sample payload per line from any buffered async reader
///
/// Every line is attributed to the same partition. Blank lines are skipped.
pub struct NdjsonSource<R> {
    lines: Lines<R>,
    partition: u32,
    name: String,
}

impl<R> NdjsonSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            lines: reader.lines(),
            partition: 0,
            name: name.into(),
        }
    }

    pub fn with_partition(mut self, partition: u32) -> Self {
        self.partition = partition;
        self
    }
}

impl NdjsonSource<tokio::io::BufReader<tokio::io::Stdin>> {
    /// Source over the process standard input
    pub fn stdin() -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()), "stdin")
    }
}

#[async_trait]
impl<R> SampleSource for NdjsonSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_record(&mut self) -> Result<Option<SourceRecord>> {
        while let Some(line) = self.lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return Ok(Some(SourceRecord::new(self.partition, line.as_bytes())));
        }
        debug!(source = %self.name, "Source exhausted");
        Ok(None)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Writes every payload as one line to an async writer
pub struct WriterSink<W> {
    writer: Mutex<W>,
    name: String,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W, name: impl Into<String>) -> Self {
        Self {
            writer: Mutex::new(writer),
            name: name.into(),
        }
    }

    /// Consume the sink and return the writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl WriterSink<tokio::io::BufWriter<tokio::io::Stdout>> {
    /// Sink over the process standard output
    pub fn stdout() -> Self {
        Self::new(tokio::io::BufWriter::new(tokio::io::stdout()), "stdout")
    }
}

#[async_trait]
impl<W> ResultSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, _key: &str, payload: &[u8]) -> SinkResult<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(payload).await.map_err(write_error)?;
        writer.write_all(b"\n").await.map_err(write_error)?;
        Ok(())
    }

    async fn flush(&self) -> SinkResult<()> {
        self.writer.lock().await.flush().await.map_err(write_error)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A reader that went away (closed pipe) will never accept another line
fn write_error(err: std::io::Error) -> SinkError {
    if err.kind() == std::io::ErrorKind::BrokenPipe {
        SinkError::Closed
    } else {
        SinkError::Io(err)
    }
}
