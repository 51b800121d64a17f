//! Unified error type for the nozzle pipeline.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the nozzle pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("source error: {0}")]
    Source(String),

    #[error("metadata resolution failed: {0}")]
    Resolver(String),

    /// Non-2xx response from the delivery endpoint.
    #[error("non-ok response code [{status}] from ingestion endpoint: {body}")]
    Delivery { status: u16, body: String },

    /// Transport-level failure talking to a remote endpoint.
    #[error("transport error: {0}")]
    Transport(String),

    /// A bounded hand-off queue rejected an item.
    #[error("queue full: {0}")]
    QueueFull(&'static str),

    /// A component was driven outside its accepting state.
    #[error("{0} is not accepting writes")]
    NotAccepting(&'static str),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    pub fn resolver(msg: impl Into<String>) -> Self {
        Self::Resolver(msg.into())
    }

    pub fn delivery(status: u16, body: impl Into<String>) -> Self {
        Self::Delivery {
            status,
            body: body.into(),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
