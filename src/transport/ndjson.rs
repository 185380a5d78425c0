//! Newline-delimited JSON transport over any `AsyncRead + AsyncWrite` pair.
//!
//! This is the production transport: in `main.rs` it is wired to process
//! stdin/stdout. One JSON object per `\n`-terminated line; a trailing `\r`
//! is tolerated on read.
//!
//! Grounded on the reader/writer task split in the teacher's
//! `stdio.rs`, but inverted to server direction and collapsed from
//! channel-fed background tasks into direct `tokio::select!`-guarded reads
//! and writes: a server transport's caller already drives one await point
//! per message, so there is no subprocess plumbing to decouple from.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransportError};
use crate::transport::{decode_line, encode_for_write, Transport};

/// NDJSON transport wrapping one reader half and one writer half.
///
/// The reader and writer are each guarded by their own `tokio::sync::Mutex`
/// (SPEC_FULL §4.1's "mutex per direction"), so one reader and one writer
/// may proceed in parallel while concurrent calls within a direction
/// serialize. `closed` is an `RwLock<bool>`, re-checked after acquiring the
/// per-direction mutex so a concurrent close cannot race a read/write that
/// started just before it.
pub struct NdjsonTransport<R, W> {
    reader: Mutex<Lines<BufReader<R>>>,
    writer: Mutex<W>,
    closed: RwLock<bool>,
    cancel: CancellationToken,
}

impl<R, W> NdjsonTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap a reader and writer half into an NDJSON transport.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(BufReader::new(reader).lines()),
            writer: Mutex::new(writer),
            closed: RwLock::new(false),
            cancel: CancellationToken::new(),
        }
    }

    async fn check_open(&self) -> Result<()> {
        if *self.closed.read().await {
            return Err(TransportError::Closed.into());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<R, W> Transport for NdjsonTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn read_message(&self, cancellation: &CancellationToken) -> Result<serde_json::Value> {
        self.check_open().await?;
        let mut guard = self.reader.lock().await;
        self.check_open().await?;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransportError::Closed.into()),
            _ = cancellation.cancelled() => Err(TransportError::Timeout.into()),
            line = guard.next_line() => match line {
                Ok(Some(l)) => decode_line(&l),
                Ok(None) => {
                    *self.closed.write().await = true;
                    Err(TransportError::Closed.into())
                }
                Err(e) => Err(TransportError::Io(e).into()),
            }
        }
    }

    async fn write_message(&self, message: &serde_json::Value, cancellation: &CancellationToken) -> Result<()> {
        self.check_open().await?;
        let encoded = encode_for_write(message)?;
        let mut guard = self.writer.lock().await;
        self.check_open().await?;

        let line = format!("{encoded}\n");
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransportError::Closed.into()),
            _ = cancellation.cancelled() => Err(TransportError::Timeout.into()),
            result = guard.write_all(line.as_bytes()) => {
                result.map_err(|e| TransportError::Io(e))?;
                guard.flush().await.map_err(TransportError::Io)?;
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<()> {
        *self.closed.write().await = true;
        self.cancel.cancel();
        Ok(())
    }
}
