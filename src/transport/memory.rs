//! An in-process, bounded-queue transport pair used by tests and by
//! embedding components that don't need a real byte stream.
//!
//! Grounded on the teacher's `transport/fake.rs` test double, generalized
//! to the §4.1 close-ordering rule: a pair must not drop its shared
//! channels from one side alone, since the other side may still have
//! buffered messages to read. Each half tracks its own `closed` flag and a
//! shared two-bit counter; only once *both* halves have called `close()`
//! is the outbound sender actually dropped.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransportError};
use crate::transport::{encode_for_write, Transport, MIN_MEMORY_QUEUE_DEPTH};

const SIDE_A: u8 = 0b01;
const SIDE_B: u8 = 0b10;

struct CloseCoordinator {
    flags: AtomicU8,
}

impl CloseCoordinator {
    fn new() -> Self {
        Self {
            flags: AtomicU8::new(0),
        }
    }

    /// Marks `side` as closed. Returns `true` if this call observed both
    /// sides closed (i.e. the caller should now drop its sender).
    fn mark_closed(&self, side: u8) -> bool {
        let prev = self.flags.fetch_or(side, Ordering::AcqRel);
        (prev | side) == (SIDE_A | SIDE_B)
    }
}

/// One half of an in-memory transport pair.
pub struct MemoryTransport {
    outbound: Mutex<Option<mpsc::Sender<Value>>>,
    inbound: Mutex<mpsc::Receiver<Value>>,
    closed: RwLock<bool>,
    coordinator: Arc<CloseCoordinator>,
    side: u8,
    cancel: CancellationToken,
}

impl MemoryTransport {
    /// Build a connected pair of in-memory transports with at least
    /// [`MIN_MEMORY_QUEUE_DEPTH`] buffered slots in each direction.
    pub fn pair(capacity: usize) -> (MemoryTransport, MemoryTransport) {
        let capacity = capacity.max(MIN_MEMORY_QUEUE_DEPTH);
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);
        let coordinator = Arc::new(CloseCoordinator::new());

        let a = MemoryTransport {
            outbound: Mutex::new(Some(a_tx)),
            inbound: Mutex::new(a_rx),
            closed: RwLock::new(false),
            coordinator: Arc::clone(&coordinator),
            side: SIDE_A,
            cancel: CancellationToken::new(),
        };
        let b = MemoryTransport {
            outbound: Mutex::new(Some(b_tx)),
            inbound: Mutex::new(b_rx),
            closed: RwLock::new(false),
            coordinator,
            side: SIDE_B,
            cancel: CancellationToken::new(),
        };
        (a, b)
    }

    async fn check_open(&self) -> Result<()> {
        if *self.closed.read().await {
            return Err(TransportError::Closed.into());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn read_message(&self, cancellation: &CancellationToken) -> Result<Value> {
        self.check_open().await?;
        let mut guard = self.inbound.lock().await;
        self.check_open().await?;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransportError::Closed.into()),
            _ = cancellation.cancelled() => Err(TransportError::Timeout.into()),
            item = guard.recv() => match item {
                Some(v) => Ok(v),
                None => {
                    *self.closed.write().await = true;
                    Err(TransportError::Closed.into())
                }
            }
        }
    }

    async fn write_message(&self, message: &Value, cancellation: &CancellationToken) -> Result<()> {
        self.check_open().await?;
        // Validate and cap size even though no wire encoding is needed, so
        // the in-memory transport obeys the same contract as NDJSON.
        encode_for_write(message)?;

        let guard = self.outbound.lock().await;
        let Some(sender) = guard.as_ref() else {
            return Err(TransportError::Closed.into());
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransportError::Closed.into()),
            _ = cancellation.cancelled() => Err(TransportError::Timeout.into()),
            result = sender.send(message.clone()) => {
                result.map_err(|_| TransportError::Closed)?;
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<()> {
        *self.closed.write().await = true;
        self.cancel.cancel();
        if self.coordinator.mark_closed(self.side) {
            let mut guard = self.outbound.lock().await;
            *guard = None;
        }
        Ok(())
    }
}
