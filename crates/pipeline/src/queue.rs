//! Bounded ingestion queue between producers and the processor.
//!
//! Producers never wait: [`IngestionQueue::enqueue`] fails immediately with
//! [`QueueError::Full`] when the queue is at capacity, which callers surface
//! as a retryable error. The single consumer waits in
//! [`QueueReceiver::dequeue`] until a batch arrives or shutdown is signalled.
//! Batches come out in the order they went in.

use cranewatch_core::telemetry::ServiceBatch;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio_util::sync::CancellationToken;

/// Default capacity, in batches.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// Transient: the processor is behind. Retry later.
    #[error("Ingestion queue is full (capacity {capacity})")]
    Full { capacity: usize },

    /// The processor has shut down and accepts no more work.
    #[error("Ingestion queue is closed")]
    Closed,
}

/// Producer handle. Cheap to clone; one per inbound request is fine.
#[derive(Clone)]
pub struct IngestionQueue {
    sender: mpsc::Sender<ServiceBatch>,
}

/// Consumer half, owned by the processor.
pub struct QueueReceiver {
    receiver: mpsc::Receiver<ServiceBatch>,
}

impl IngestionQueue {
    /// Create a queue holding at most `capacity` batches (minimum 1).
    pub fn new(capacity: usize) -> (Self, QueueReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, QueueReceiver { receiver })
    }

    /// Admit one batch, or reject it without waiting.
    pub fn enqueue(&self, batch: ServiceBatch) -> Result<(), QueueError> {
        self.sender.try_send(batch).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full {
                capacity: self.capacity(),
            },
            TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Admit several batches atomically: all of them or none.
    ///
    /// Returns the number of batches queued.
    pub fn enqueue_all(&self, batches: Vec<ServiceBatch>) -> Result<usize, QueueError> {
        if batches.is_empty() {
            return Ok(0);
        }
        if batches.len() > self.capacity() {
            return Err(QueueError::Full {
                capacity: self.capacity(),
            });
        }

        let permits = self.sender.try_reserve_many(batches.len()).map_err(|e| match e {
            TrySendError::Full(()) => QueueError::Full {
                capacity: self.capacity(),
            },
            TrySendError::Closed(()) => QueueError::Closed,
        })?;

        let count = batches.len();
        for (permit, batch) in permits.zip(batches) {
            permit.send(batch);
        }
        Ok(count)
    }

    /// Maximum number of queued batches.
    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// Batches currently waiting.
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free slots.
    pub fn available(&self) -> usize {
        self.sender.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl QueueReceiver {
    /// Wait for the next batch.
    ///
    /// Returns `None` once `cancel` fires (even if batches remain; see
    /// [`close`](Self::close) and [`try_dequeue`](Self::try_dequeue) for
    /// draining) or when every producer handle has been dropped.
    pub async fn dequeue(&mut self, cancel: &CancellationToken) -> Option<ServiceBatch> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            batch = self.receiver.recv() => batch,
        }
    }

    /// Take a batch if one is waiting.
    pub fn try_dequeue(&mut self) -> Option<ServiceBatch> {
        match self.receiver.try_recv() {
            Ok(batch) => Some(batch),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Stop accepting new batches. Already queued batches stay available.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
