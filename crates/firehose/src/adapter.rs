//! Envelope adapter over the batched-streaming wire form.
//!
//! Subscribes once with the full selector set and runs two pipeline
//! stages joined by bounded queues: stage A pulls wire batches and queues
//! individual wire envelopes, stage B converts them and queues internal
//! envelopes for consumers. When either queue is full the producing stage
//! blocks, pushing backpressure up to the transport; nothing is dropped
//! here.

use async_channel::Receiver;
use async_trait::async_trait;
use nozzle_core::Envelope;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::FirehoseConfig;
use crate::convert;
use crate::source::SourceError;
use crate::wire::{EgressBatchRequest, Selector, WireEnvelope};

/// Capacity of each pipeline stage queue.
const STAGE_CAPACITY: usize = 10_000;
/// Capacity of the error side channel.
const ERROR_CAPACITY: usize = 16;

/// One pull from an open envelope stream.
#[derive(Debug)]
pub enum StreamEvent {
    /// A batch of wire envelopes, possibly empty.
    Batch(Vec<WireEnvelope>),
    /// A transient read failure; the stream stays usable.
    Error(SourceError),
    /// The stream has permanently ended.
    Closed,
}

/// An open subscription yielding wire envelope batches.
#[async_trait]
pub trait EnvelopeStream: Send {
    async fn next(&mut self) -> StreamEvent;
}

/// Opens envelope streams for a subscription request.
#[async_trait]
pub trait Streamer: Send + Sync {
    async fn stream(&self, request: EgressBatchRequest) -> Box<dyn EnvelopeStream>;
}

#[async_trait]
impl<S: Streamer + ?Sized> Streamer for std::sync::Arc<S> {
    async fn stream(&self, request: EgressBatchRequest) -> Box<dyn EnvelopeStream> {
        (**self).stream(request).await
    }
}

/// Adapter normalizing the batched-streaming schema to internal envelopes.
pub struct V2Adapter<S> {
    streamer: S,
}

impl<S: Streamer + 'static> V2Adapter<S> {
    pub fn new(streamer: S) -> Self {
        Self { streamer }
    }

    /// Subscribes and starts both pipeline stages.
    ///
    /// The returned envelope channel closes only after the upstream stream
    /// permanently ends; on cancellation the stages exit and consumers must
    /// treat the cancelled token as the termination signal.
    pub async fn start(
        &self,
        config: &FirehoseConfig,
        shutdown: CancellationToken,
    ) -> (Receiver<Envelope>, Receiver<SourceError>) {
        let request = EgressBatchRequest {
            shard_id: config.subscription_id.clone(),
            selectors: Selector::all(),
        };
        debug!(shard_id = %request.shard_id, "Subscribing to firehose");
        let stream = self.streamer.stream(request).await;

        let (wire_tx, wire_rx) = async_channel::bounded::<WireEnvelope>(STAGE_CAPACITY);
        let (out_tx, out_rx) = async_channel::bounded::<Envelope>(STAGE_CAPACITY);
        let (err_tx, err_rx) = async_channel::bounded::<SourceError>(ERROR_CAPACITY);

        let pull_shutdown = shutdown.clone();
        tokio::spawn(async move {
            pull_stage(stream, wire_tx, err_tx, pull_shutdown).await;
        });

        tokio::spawn(async move {
            convert_stage(wire_rx, out_tx, shutdown).await;
        });

        (out_rx, err_rx)
    }
}

/// Stage A: pull wire batches, queue individual envelopes.
async fn pull_stage(
    mut stream: Box<dyn EnvelopeStream>,
    wire_tx: async_channel::Sender<WireEnvelope>,
    err_tx: async_channel::Sender<SourceError>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => return,
            event = stream.next() => event,
        };

        match event {
            StreamEvent::Batch(batch) => {
                for envelope in batch {
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        sent = wire_tx.send(envelope) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
            StreamEvent::Error(e) => {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = err_tx.send(e) => {}
                }
            }
            StreamEvent::Closed => {
                debug!("Upstream envelope stream ended");
                return;
            }
        }
    }
}

/// Stage B: convert wire envelopes, queue internal envelopes.
async fn convert_stage(
    wire_rx: async_channel::Receiver<WireEnvelope>,
    out_tx: async_channel::Sender<Envelope>,
    shutdown: CancellationToken,
) {
    loop {
        let wire = tokio::select! {
            _ = shutdown.cancelled() => return,
            received = wire_rx.recv() => match received {
                Ok(wire) => wire,
                Err(_) => return,
            },
        };

        for envelope in convert::to_internal(wire) {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                sent = out_tx.send(envelope) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
        }
    }
}
