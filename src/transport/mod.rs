//! Framed, concurrency-safe message transport (SPEC_FULL §4.1).
//!
//! [`Transport`] is server-directed: it reads one complete inbound message
//! at a time and writes one complete outbound message at a time, in
//! contrast to a client transport's push/pull pair. Concrete
//! implementations:
//!
//! - [`ndjson::NdjsonTransport`] -- newline-delimited JSON over any
//!   `AsyncRead + AsyncWrite` pair (stdio in production).
//! - [`memory::MemoryTransport`] -- an in-process, bounded-queue pair used
//!   by tests and by other components that embed a transport without a
//!   real stream.
//!
//! # Canonical Import Path
//!
//! ```no_run
//! use cowgnition::transport::Transport;
//! ```

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransportError};

/// Default cap on a single framed message, per SPEC_FULL §6.
pub const MAX_MESSAGE_BYTES: usize = 1_048_576;

/// Minimum buffer depth for the in-memory transport's bounded queues.
pub const MIN_MEMORY_QUEUE_DEPTH: usize = 100;

/// Abstraction over one framed message stream.
///
/// Implementations own their underlying stream and buffers exclusively
/// (SPEC_FULL §3's ownership rule). One reader and one writer may proceed
/// concurrently; concurrent calls to the same direction are serialized
/// internally by each implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read exactly one framed JSON message, decoded and structurally
    /// validated. `cancellation` is the caller's per-message context
    /// (SPEC_FULL §4.1: `ReadMessage(ctx) -> bytes | error`); a blocked read
    /// aborts as soon as it fires, independent of the transport's own
    /// `close()` signal (invariant 3).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the transport is closed or the
    /// peer hung up, [`TransportError::Timeout`] if `cancellation` fires
    /// first, [`TransportError::MessageTooLarge`] if the frame exceeds
    /// [`MAX_MESSAGE_BYTES`], [`TransportError::ParseError`] for malformed
    /// JSON, or [`TransportError::InvalidMessage`] for JSON-RPC structural
    /// violations.
    async fn read_message(&self, cancellation: &CancellationToken) -> Result<Value>;

    /// Write one framed JSON message atomically; concurrent writers never
    /// interleave bytes (invariant 2). `cancellation` aborts a blocked write
    /// the same way it aborts a blocked read.
    ///
    /// # Errors
    ///
    /// Same error classes as [`Transport::read_message`], plus
    /// [`TransportError::ShortWrite`].
    async fn write_message(&self, message: &Value, cancellation: &CancellationToken) -> Result<()>;

    /// Idempotently close the transport. Subsequent reads/writes, and any
    /// already-blocked ones, return [`TransportError::Closed`].
    async fn close(&self) -> Result<()>;
}

/// Serialize and size-check a message before handing it to a concrete
/// transport's write path. Shared by every [`Transport`] implementation so
/// the size cap and structural check are enforced identically everywhere.
pub(crate) fn encode_for_write(message: &Value) -> Result<String> {
    crate::protocol::validate_structure(message).map_err(|e| {
        TransportError::InvalidMessage(e.to_string())
    })?;
    let encoded = serde_json::to_string(message)?;
    if encoded.len() > MAX_MESSAGE_BYTES {
        return Err(TransportError::MessageTooLarge {
            size: encoded.len(),
            cap: MAX_MESSAGE_BYTES,
        }
        .into());
    }
    Ok(encoded)
}

/// Decode and structurally validate one line read from the wire.
pub(crate) fn decode_line(line: &str) -> Result<Value> {
    let trimmed = line.trim_end_matches('\r');
    if trimmed.trim().is_empty() {
        return Err(TransportError::InvalidMessage("empty line".to_string()).into());
    }
    if trimmed.len() > MAX_MESSAGE_BYTES {
        return Err(TransportError::MessageTooLarge {
            size: trimmed.len(),
            cap: MAX_MESSAGE_BYTES,
        }
        .into());
    }
    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| TransportError::ParseError(e.to_string()))?;
    crate::protocol::validate_structure(&value)
        .map_err(|e| TransportError::InvalidMessage(e.to_string()))?;
    Ok(value)
}

pub mod memory;
pub mod ndjson;
