//! Firehose source contract and the streamer-backed implementation.

use async_channel::Receiver;
use async_trait::async_trait;
use nozzle_core::{Envelope, Error, Result};
use parking_lot::Mutex;
use thiserror::Error as ThisError;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::adapter::{Streamer, V2Adapter};
use crate::config::FirehoseConfig;

/// Close reason reported when the server ends the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// Server shed load by closing a healthy connection.
    Normal,
    /// Keep-alive heartbeat was lost before the server closed.
    PolicyViolation,
    Other(u16),
}

/// Errors the source emits on its error channel.
#[derive(Debug, ThisError)]
pub enum SourceError {
    #[error("connection closed by server ({code:?}): {message}")]
    ConnectionClosed { code: CloseCode, message: String },

    #[error("error reading from the firehose: {0}")]
    Read(String),
}

/// A stream of envelopes read from the platform firehose.
///
/// `read` hands out the envelope channel and the error channel. The
/// envelope channel closes permanently once the source has exhausted its
/// retry budget; the error channel emits transient errors repeatedly
/// without ever closing on its own.
#[async_trait]
pub trait FirehoseSource: Send + Sync {
    async fn open(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;

    /// Must be called after a successful `open`.
    fn read(&self) -> (Receiver<Envelope>, Receiver<SourceError>);
}

/// Firehose source backed by a streamer and the envelope adapter.
pub struct StreamerSource<S> {
    adapter: V2Adapter<S>,
    config: FirehoseConfig,
    shutdown: CancellationToken,
    channels: Mutex<Option<(Receiver<Envelope>, Receiver<SourceError>)>>,
}

impl<S: Streamer + 'static> StreamerSource<S> {
    pub fn new(streamer: S, config: FirehoseConfig) -> Self {
        Self {
            adapter: V2Adapter::new(streamer),
            config,
            shutdown: CancellationToken::new(),
            channels: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<S: Streamer + 'static> FirehoseSource for StreamerSource<S> {
    async fn open(&self) -> Result<()> {
        if self.channels.lock().is_some() {
            return Err(Error::source("source already opened"));
        }
        let channels = self
            .adapter
            .start(&self.config, self.shutdown.child_token())
            .await;
        *self.channels.lock() = Some(channels);
        info!(
            subscription_id = %self.config.subscription_id,
            "Firehose source opened"
        );
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.shutdown.cancel();
        Ok(())
    }

    fn read(&self) -> (Receiver<Envelope>, Receiver<SourceError>) {
        match self.channels.lock().as_ref() {
            Some((envelopes, errors)) => (envelopes.clone(), errors.clone()),
            None => {
                // Not opened: hand back channels that read as closed.
                let (_tx, envelopes) = async_channel::bounded(1);
                let (_etx, errors) = async_channel::bounded(1);
                (envelopes, errors)
            }
        }
    }
}
