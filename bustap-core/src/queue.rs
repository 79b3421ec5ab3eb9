//! Handoff queue between the interceptor and the writer thread.
//!
//! An unbounded crossbeam channel carrying [`QueueItem`]s. The interceptor
//! pushes from the bus dispatch task and never waits on the writer; the
//! writer pops and blocks while the queue is empty. End of stream is an
//! explicit [`QueueItem::Stop`] variant rather than a reserved value.
//!
//! Single producer, single consumer, strict FIFO: output order in the
//! capture file is the order records were pushed here.

use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use thiserror::Error;

use crate::error::CaptureError;
use crate::record::Record;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueItem {
    Record(Record),
    Stop,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Handoff queue already stopped")]
    Stopped,
}

impl From<QueueError> for CaptureError {
    fn from(_: QueueError) -> Self {
        CaptureError::QueueClosed
    }
}

struct InnerQueue {
    tx: Sender<QueueItem>,
    rx: Receiver<QueueItem>,
    // Held across the send in `push` and `stop`, so nothing lands behind STOP.
    stopped: Mutex<bool>,
}

/// Shared handle to the handoff queue. Cheap to clone via [`HandoffQueue::share`].
pub struct HandoffQueue {
    inner: Arc<InnerQueue>,
}

impl Default for HandoffQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl HandoffQueue {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            inner: Arc::new(InnerQueue {
                tx,
                rx,
                stopped: Mutex::new(false),
            }),
        }
    }

    /// Creates new handle to the same queue.
    #[inline]
    pub fn share(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Appends a record to the tail. Never blocks.
    ///
    /// Fails once [`HandoffQueue::stop`] has been called. Every accepted
    /// record is queued ahead of STOP, even when racing with `stop`.
    #[inline]
    pub fn push(&self, record: Record) -> Result<(), QueueError> {
        let stopped = self.inner.stopped.lock();
        if *stopped {
            return Err(QueueError::Stopped);
        }
        // The queue owns a receiver, so the channel cannot be disconnected.
        let _ = self.inner.tx.send(QueueItem::Record(record));
        Ok(())
    }

    /// Pushes the end-of-stream marker. Only the first call succeeds.
    pub fn stop(&self) -> Result<(), QueueError> {
        let mut stopped = self.inner.stopped.lock();
        if *stopped {
            return Err(QueueError::Stopped);
        }
        *stopped = true;
        let _ = self.inner.tx.send(QueueItem::Stop);
        Ok(())
    }

    /// Blocks until an item is available and returns it in FIFO order.
    #[inline]
    pub fn pop(&self) -> QueueItem {
        // Unreachable while `self` holds the sender; treat as end of stream.
        self.inner.rx.recv().unwrap_or(QueueItem::Stop)
    }

    /// Number of items waiting, including a pending STOP.
    pub fn len(&self) -> usize {
        self.inner.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.rx.is_empty()
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.stopped.lock()
    }
}
