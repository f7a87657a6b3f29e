//! The streaming read loop.

use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ReaderClient, Record, RecordStream};
use crate::config::ReadMode;
use crate::error::{Result, TailError};
use crate::group::PinnedGroup;

/// Receives each record the loop emits.
pub trait RecordSink: Send {
    fn emit(&mut self, record: &Record) -> std::io::Result<()>;
}

/// Writes each record value followed by a newline.
pub struct LineSink<W> {
    writer: W,
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> RecordSink for LineSink<W> {
    fn emit(&mut self, record: &Record) -> std::io::Result<()> {
        self.writer.write_all(&record.value)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

impl RecordSink for Vec<Record> {
    fn emit(&mut self, record: &Record) -> std::io::Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Where the read loop stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamCursor {
    pub topic: String,
    pub group_id: String,
    /// partition -> offset of the last emitted record
    pub positions: BTreeMap<i32, i64>,
    pub emitted: u64,
    pub cancelled: bool,
}

impl StreamCursor {
    fn new(topic: &str, group_id: &str) -> Self {
        Self {
            topic: topic.to_string(),
            group_id: group_id.to_string(),
            positions: BTreeMap::new(),
            emitted: 0,
            cancelled: false,
        }
    }

    fn advance(&mut self, record: &Record) {
        self.positions.insert(record.partition, record.offset);
        self.emitted += 1;
    }
}

/// An open reading session under a pinned group id.
pub struct StreamReader<S> {
    stream: S,
    cursor: StreamCursor,
    read_timeout: Duration,
}

impl<S: RecordStream> StreamReader<S> {
    /// Open a reading session for a group whose pinning generation has left.
    pub async fn open<R>(client: &R, pinned: PinnedGroup, read_timeout: Duration) -> Result<Self>
    where
        R: ReaderClient<Stream = S>,
    {
        let stream = client
            .open(pinned.group_id(), pinned.topic())
            .await
            .map_err(|e| TailError::ReadError(format!("opening reader for {}: {}", pinned.group_id(), e)))?;

        info!(group_id = %pinned.group_id(), topic = %pinned.topic(), "Opened reader session");
        Ok(Self {
            stream,
            cursor: StreamCursor::new(pinned.topic(), pinned.group_id()),
            read_timeout,
        })
    }

    /// Run the loop until the mode's termination condition, a read failure,
    /// or cancellation. The session is closed before returning.
    pub async fn run<K: RecordSink>(
        mut self,
        mode: ReadMode,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> Result<StreamCursor> {
        let outcome = self.read_loop(mode, sink, cancel).await;

        let closed = self.stream.close().await;
        info!(
            group_id = %self.cursor.group_id,
            emitted = self.cursor.emitted,
            "Closed reader session"
        );

        outcome?;
        if let Err(e) = closed {
            warn!(group_id = %self.cursor.group_id, error = %e, "Reader session did not close cleanly");
        }
        Ok(self.cursor)
    }

    async fn read_loop<K: RecordSink>(
        &mut self,
        mode: ReadMode,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            if let ReadMode::FixedCount(limit) = mode {
                if self.cursor.emitted >= limit {
                    return Ok(());
                }
            }
            if cancel.is_cancelled() {
                self.cursor.cancelled = true;
                return Ok(());
            }

            // Fresh deadline for every fetch.
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.cursor.cancelled = true;
                    return Ok(());
                }
                fetched = tokio::time::timeout(self.read_timeout, self.stream.fetch()) => fetched,
            };

            let record = match fetched {
                Ok(Ok(record)) => record,
                Ok(Err(e)) => return Err(TailError::ReadError(e.to_string())),
                Err(_) => return Err(TailError::ReadTimeout(self.read_timeout)),
            };

            debug!(partition = record.partition, offset = record.offset, "Fetched record");
            sink.emit(&record)?;
            self.cursor.advance(&record);
        }
    }
}
