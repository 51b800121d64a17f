//! Bounded hand-off queue with a shed-on-full drop policy.
//!
//! Every hand-off point in the pipeline (source to routing workers, batch
//! assembler to delivery workers) uses the same policy: a fixed-capacity
//! queue, a non-blocking enqueue, and a counted drop when the queue is
//! full. The upstream producer is never blocked indefinitely.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_channel::{Receiver, TrySendError};
use tracing::{error, warn};

/// Counts dropped items and logs at a throttled rate.
#[derive(Debug)]
pub struct DropCounter {
    stage: &'static str,
    dropped: AtomicU64,
    log_every: u64,
}

impl DropCounter {
    pub fn new(stage: &'static str, log_every: u64) -> Self {
        Self {
            stage,
            dropped: AtomicU64::new(0),
            log_every: log_every.max(1),
        }
    }

    /// Records one drop. Logs on the first drop and every `log_every`th after.
    pub fn record(&self) -> u64 {
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if total % self.log_every == 1 || self.log_every == 1 {
            error!(
                stage = self.stage,
                total_dropped = total,
                "Dropping items, consumer is not keeping up"
            );
        }
        total
    }

    pub fn total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Sending half of a dropping queue.
#[derive(Clone)]
pub struct DropSender<T> {
    tx: async_channel::Sender<T>,
    counter: Arc<DropCounter>,
}

impl<T> DropSender<T> {
    /// Non-blocking enqueue. Returns true when the item was queued; a full
    /// queue drops the item and bumps the counter.
    pub fn send(&self, item: T) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.counter.record();
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(stage = self.counter.stage, "queue closed, item discarded");
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.counter.total()
    }

    /// Items currently queued.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn counter(&self) -> Arc<DropCounter> {
        self.counter.clone()
    }

    /// Closes the queue. Consumers drain remaining items and then observe
    /// closure.
    pub fn close(&self) {
        self.tx.close();
    }
}

/// Creates a bounded queue whose sender sheds on overflow.
pub fn dropping_channel<T>(
    stage: &'static str,
    capacity: usize,
    log_every: u64,
) -> (DropSender<T>, Receiver<T>) {
    let (tx, rx) = async_channel::bounded(capacity);
    (
        DropSender {
            tx,
            counter: Arc::new(DropCounter::new(stage, log_every)),
        },
        rx,
    )
}
