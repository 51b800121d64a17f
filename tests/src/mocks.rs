//! Mock implementations for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_channel::Receiver;
use async_trait::async_trait;
use firehose::{
    EnvelopeStream, FirehoseSource, SourceError, StreamEvent, Streamer, WireEnvelope,
};
use firehose::wire::EgressBatchRequest;
use hec_sink::EventWriter;
use metadata::{MetadataResolver, Ownership};
use nozzle_core::{Envelope, Result, RoutedRecord};
use parking_lot::Mutex;

/// Firehose source fed from memory.
///
/// Envelopes and errors are injected through the senders; ending the
/// stream closes the envelope channel, which the dispatcher treats as the
/// source giving up.
pub struct MemoryEventSource {
    events_tx: async_channel::Sender<Envelope>,
    events_rx: Receiver<Envelope>,
    errors_tx: async_channel::Sender<SourceError>,
    errors_rx: Receiver<SourceError>,
    closed: AtomicBool,
}

impl MemoryEventSource {
    pub fn new() -> Arc<Self> {
        let (events_tx, events_rx) = async_channel::bounded(4096);
        let (errors_tx, errors_rx) = async_channel::bounded(64);
        Arc::new(Self {
            events_tx,
            events_rx,
            errors_tx,
            errors_rx,
            closed: AtomicBool::new(false),
        })
    }

    pub async fn send(&self, envelope: Envelope) {
        self.events_tx.send(envelope).await.expect("source channel open");
    }

    pub async fn send_error(&self, error: SourceError) {
        self.errors_tx.send(error).await.expect("error channel open");
    }

    /// Simulates the source exhausting its retry budget.
    pub fn end_stream(&self) {
        self.events_tx.close();
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FirehoseSource for MemoryEventSource {
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn read(&self) -> (Receiver<Envelope>, Receiver<SourceError>) {
        (self.events_rx.clone(), self.errors_rx.clone())
    }
}

/// Streamer yielding preset wire batches, then closing.
pub struct MemoryStreamer {
    batches: Mutex<Vec<Vec<WireEnvelope>>>,
    request: Mutex<Option<EgressBatchRequest>>,
}

impl MemoryStreamer {
    pub fn new(batches: Vec<Vec<WireEnvelope>>) -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(batches),
            request: Mutex::new(None),
        })
    }

    pub fn captured_request(&self) -> Option<EgressBatchRequest> {
        self.request.lock().clone()
    }
}

struct MemoryStream {
    batches: Vec<Vec<WireEnvelope>>,
}

#[async_trait]
impl EnvelopeStream for MemoryStream {
    async fn next(&mut self) -> StreamEvent {
        if self.batches.is_empty() {
            StreamEvent::Closed
        } else {
            StreamEvent::Batch(self.batches.remove(0))
        }
    }
}

#[async_trait]
impl Streamer for MemoryStreamer {
    async fn stream(&self, request: EgressBatchRequest) -> Box<dyn EnvelopeStream> {
        *self.request.lock() = Some(request);
        Box::new(MemoryStream {
            batches: self.batches.lock().clone(),
        })
    }
}

/// Metadata resolver with canned data and a call counter.
pub struct CountingResolver {
    data: Mutex<HashMap<String, Ownership>>,
    calls: AtomicUsize,
}

impl CountingResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn with_workload(self: Arc<Self>, workload_id: &str, name: &str) -> Arc<Self> {
        self.data.lock().insert(
            workload_id.to_string(),
            Ownership {
                workload_name: name.to_string(),
                org_name: "acme".to_string(),
                org_id: "org-1".to_string(),
                space_name: "prod".to_string(),
                space_id: "space-1".to_string(),
            },
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataResolver for CountingResolver {
    async fn resolve(&self, workload_id: &str) -> Result<Option<Ownership>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.data.lock().get(workload_id).cloned())
    }

    async fn list_all(&self) -> Result<HashMap<String, Ownership>> {
        Ok(self.data.lock().clone())
    }
}

/// Delivery writer that captures batches in memory.
pub struct MemoryWriter {
    batches: Mutex<Vec<Vec<RoutedRecord>>>,
}

impl MemoryWriter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(Vec::new()),
        })
    }

    pub fn batches(&self) -> Vec<Vec<RoutedRecord>> {
        self.batches.lock().clone()
    }

    pub fn all_records(&self) -> Vec<RoutedRecord> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    pub fn record_count(&self) -> usize {
        self.batches.lock().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl EventWriter for MemoryWriter {
    async fn write(&self, events: &[RoutedRecord]) -> Result<()> {
        self.batches.lock().push(events.to_vec());
        Ok(())
    }
}
