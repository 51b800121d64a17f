//! Batching sink: accumulates routed records, hands completed batches to
//! a pool of delivery workers, sheds batches when the delivery queue is
//! full, and abandons batches after exhausting retries.

use std::sync::Arc;
use std::time::Duration;

use async_channel::{Receiver, TrySendError};
use async_trait::async_trait;
use nozzle_core::{dropping_channel, DropSender, Error, EventFields, Result, RoutedRecord, Sink};
use parking_lot::Mutex;
use telemetry::metrics;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::batch::Batch;
use crate::client::EventWriter;
use crate::config::SinkConfig;

const BATCH_DROP_LOG_EVERY: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Open,
    Closing,
    Closed,
}

struct Inner {
    state: State,
    records_tx: Option<async_channel::Sender<RoutedRecord>>,
    handles: Vec<JoinHandle<()>>,
}

/// Destination sink that batches records towards an [`EventWriter`].
pub struct BatchingSink {
    writer: Arc<dyn EventWriter>,
    config: SinkConfig,
    inner: Mutex<Inner>,
}

impl BatchingSink {
    pub fn new(writer: Arc<dyn EventWriter>, config: SinkConfig) -> Self {
        Self {
            writer,
            config,
            inner: Mutex::new(Inner {
                state: State::Idle,
                records_tx: None,
                handles: Vec::new(),
            }),
        }
    }
}

#[async_trait]
impl Sink for BatchingSink {
    async fn open(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != State::Idle {
            return Err(Error::internal("batching sink already opened"));
        }

        let (records_tx, records_rx) = async_channel::bounded(self.config.queue_size.max(1));
        let (batch_tx, batch_rx) = dropping_channel(
            "delivery",
            self.config.delivery_queue_capacity.max(1),
            BATCH_DROP_LOG_EVERY,
        );

        let workers = self.config.workers.max(1);
        let mut handles = Vec::with_capacity(workers + 1);
        handles.push(tokio::spawn(assemble(
            records_rx,
            batch_tx,
            self.config.batch_size.max(1),
            Duration::from_millis(self.config.flush_interval_ms.max(1)),
        )));
        for worker in 0..workers {
            handles.push(tokio::spawn(deliver_loop(
                worker,
                batch_rx.clone(),
                self.writer.clone(),
                self.config.retries,
            )));
        }

        inner.records_tx = Some(records_tx);
        inner.handles = handles;
        inner.state = State::Open;
        info!(
            workers = workers,
            batch_size = self.config.batch_size,
            flush_interval_ms = self.config.flush_interval_ms,
            "Batching sink opened"
        );
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let handles = {
            let mut inner = self.inner.lock();
            match inner.state {
                State::Idle => {
                    inner.state = State::Closed;
                    return Ok(());
                }
                State::Closing | State::Closed => return Ok(()),
                State::Open => {}
            }
            inner.state = State::Closing;
            // Dropping the intake sender lets the assembler drain, flush
            // its partial batch, and close the delivery queue behind it.
            inner.records_tx = None;
            std::mem::take(&mut inner.handles)
        };

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Sink task ended abnormally: {}", e);
            }
        }

        self.inner.lock().state = State::Closed;
        info!("Batching sink closed");
        Ok(())
    }

    async fn write(&self, fields: EventFields, message: &str) -> Result<()> {
        let records_tx = {
            let inner = self.inner.lock();
            if inner.state != State::Open {
                return Err(Error::NotAccepting("batching sink"));
            }
            match inner.records_tx.clone() {
                Some(tx) => tx,
                None => return Err(Error::internal("sink open without an intake queue")),
            }
        };

        match records_tx.try_send(RoutedRecord::new(fields, message)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::QueueFull("delivery intake")),
            Err(TrySendError::Closed(_)) => Err(Error::NotAccepting("batching sink")),
        }
    }
}

/// Accumulates records into batches bounded by size and accumulation time.
async fn assemble(
    records: Receiver<RoutedRecord>,
    batches: DropSender<Batch>,
    max_size: usize,
    max_age: Duration,
) {
    let mut batch = Batch::new();
    loop {
        if batch.is_empty() {
            match records.recv().await {
                Ok(record) => {
                    batch.push(record);
                    if batch.len() >= max_size {
                        flush(&mut batch, &batches);
                    }
                }
                Err(_) => break,
            }
            continue;
        }

        let remaining = max_age.saturating_sub(batch.age());
        tokio::select! {
            received = records.recv() => match received {
                Ok(record) => {
                    batch.push(record);
                    if batch.len() >= max_size {
                        flush(&mut batch, &batches);
                    }
                }
                Err(_) => break,
            },
            _ = tokio::time::sleep(remaining) => {
                flush(&mut batch, &batches);
            }
        }
    }
    // Intake ended; hand over whatever accumulated.
    flush(&mut batch, &batches);
}

fn flush(batch: &mut Batch, batches: &DropSender<Batch>) {
    if batch.is_empty() {
        return;
    }
    let completed = batch.take();
    let records = completed.len();
    metrics().batches_assembled.inc();
    if batches.send(completed) {
        debug!(records = records, "Batch handed to delivery queue");
    } else {
        metrics().batches_dropped.inc();
    }
    metrics().delivery_queue_depth.set(batches.len() as u64);
}

async fn deliver_loop(
    worker: usize,
    batches: Receiver<Batch>,
    writer: Arc<dyn EventWriter>,
    retries: u32,
) {
    while let Ok(batch) = batches.recv().await {
        deliver(worker, writer.as_ref(), batch, retries).await;
    }
}

/// Attempts delivery at most `retries + 1` times, then abandons the batch.
async fn deliver(worker: usize, writer: &dyn EventWriter, batch: Batch, retries: u32) {
    let started = std::time::Instant::now();
    let records = batch.len();
    let mut last_error = None;

    for attempt in 0..=retries {
        if attempt > 0 {
            warn!(worker = worker, attempt = attempt, "Retrying batch delivery");
        }
        match writer.write(batch.records()).await {
            Ok(()) => {
                metrics().batches_delivered.inc();
                metrics().records_delivered.inc_by(records as u64);
                metrics()
                    .delivery_latency_ms
                    .observe(started.elapsed().as_millis() as u64);
                debug!(worker = worker, records = records, "Delivered batch");
                return;
            }
            Err(e) => {
                metrics().delivery_errors.inc();
                last_error = Some(e);
            }
        }
    }

    metrics().batches_abandoned.inc();
    let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
    error!(
        worker = worker,
        records = records,
        error = %reason,
        "Abandoning batch after exhausting retries"
    );
}
