//! The dispatcher: owns the firehose read loop, a bounded routing queue,
//! and the pool of routing workers.

use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use firehose::{CloseCode, FirehoseSource, SourceError};
use nozzle_core::{dropping_channel, DropSender, Envelope, Error, Result};
use telemetry::metrics;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::router::Route;

/// Routing worker pool size.
const ROUTING_WORKERS: usize = 10;
const DEFAULT_ROUTING_QUEUE_CAPACITY: usize = 5_000;
const DROP_LOG_EVERY: u64 = 1_000;

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct NozzleConfig {
    /// Capacity of the queue between the read loop and routing workers.
    pub routing_queue_capacity: usize,
    /// Periodic received-count report; `None` disables it.
    pub status_interval: Option<Duration>,
}

impl Default for NozzleConfig {
    fn default() -> Self {
        Self {
            routing_queue_capacity: DEFAULT_ROUTING_QUEUE_CAPACITY,
            status_interval: None,
        }
    }
}

/// Reads envelopes from the firehose source and fans them out to routing
/// workers under backpressure.
pub struct Nozzle {
    source: Arc<dyn FirehoseSource>,
    router: Arc<dyn Route>,
    config: NozzleConfig,
    closing: CancellationToken,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
}

impl Nozzle {
    pub fn new(
        source: Arc<dyn FirehoseSource>,
        router: Arc<dyn Route>,
        config: NozzleConfig,
    ) -> Self {
        let (closed_tx, closed_rx) = watch::channel(false);
        Self {
            source,
            router,
            config,
            closing: CancellationToken::new(),
            closed_tx,
            closed_rx,
        }
    }

    /// Opens the source, launches the routing workers, and runs the read
    /// loop until the source closes its streams or `close` is called.
    /// Returns the last source error observed, if any.
    pub async fn start(&self) -> Result<()> {
        self.source.open().await?;
        let (events, errors) = self.source.read();

        let (work_tx, work_rx) = dropping_channel::<Envelope>(
            "routing",
            self.config.routing_queue_capacity.max(1),
            DROP_LOG_EVERY,
        );
        for _ in 0..ROUTING_WORKERS {
            let work_rx = work_rx.clone();
            let router = self.router.clone();
            tokio::spawn(async move {
                while let Ok(envelope) = work_rx.recv().await {
                    if let Err(e) = router.route(envelope).await {
                        metrics().routing_errors.inc();
                        error!("Failed to route event: {}", e);
                    }
                }
            });
        }

        let result = self.read_loop(events, errors, &work_tx).await;

        // Let the workers drain what is queued and exit.
        work_tx.close();
        let _ = self.closed_tx.send(true);
        result
    }

    /// Closes the source, signals the read loop, and blocks until the
    /// loop has exited. Routing and delivery work drains on its own.
    pub async fn close(&self) -> Result<()> {
        self.source.close().await?;
        self.closing.cancel();

        let mut closed = self.closed_rx.clone();
        while !*closed.borrow_and_update() {
            if closed.changed().await.is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn read_loop(
        &self,
        events: Receiver<Envelope>,
        errors: Receiver<SourceError>,
        work_tx: &DropSender<Envelope>,
    ) -> Result<()> {
        let mut last_error: Option<SourceError> = None;
        let mut received: u64 = 0;
        let mut errors_open = true;
        let mut status = self.config.status_interval.map(|period| {
            tokio::time::interval_at(tokio::time::Instant::now() + period, period)
        });

        loop {
            tokio::select! {
                maybe_envelope = events.recv() => match maybe_envelope {
                    Ok(envelope) => {
                        metrics().envelopes_received.inc();
                        received += 1;
                        if !work_tx.send(envelope) {
                            metrics().envelopes_dropped.inc();
                        }
                    }
                    Err(_) => {
                        info!("Give up after retries, firehose consumer is exiting");
                        return finish(last_error);
                    }
                },
                maybe_error = errors.recv(), if errors_open => match maybe_error {
                    Ok(source_error) => {
                        log_source_error(&source_error);
                        last_error = Some(source_error);
                    }
                    Err(_) => errors_open = false,
                },
                _ = status_tick(&mut status) => {
                    info!(event_count_received = received, "Event count since last report");
                    received = 0;
                }
                _ = self.closing.cancelled() => {
                    return finish(last_error);
                }
            }
        }
    }
}

fn finish(last_error: Option<SourceError>) -> Result<()> {
    match last_error {
        Some(e) => Err(Error::source(e.to_string())),
        None => Ok(()),
    }
}

async fn status_tick(status: &mut Option<tokio::time::Interval>) {
    match status {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Classifies source errors. None of them terminate the read loop; only
/// closure of the source's own streams does.
fn log_source_error(source_error: &SourceError) {
    match source_error {
        SourceError::ConnectionClosed {
            code: CloseCode::Normal,
            ..
        } => {
            error!(
                "Connection was disconnected by the firehose server. This usually means the \
                 nozzle cannot keep up; scale out with more instances sharing the same \
                 subscription id: {}",
                source_error
            );
        }
        SourceError::ConnectionClosed {
            code: CloseCode::PolicyViolation,
            ..
        } => {
            error!(
                "Lost the keep-alive heartbeat with the firehose server. The consumer was \
                 either busy processing events or a temporary network issue dropped the \
                 heartbeat: {}",
                source_error
            );
        }
        SourceError::ConnectionClosed { .. } => {
            error!(
                "Encountered close error while reading from the firehose: {}",
                source_error
            );
        }
        SourceError::Read(_) => {
            error!("Error while reading from the firehose: {}", source_error);
        }
    }
}
