pub mod server;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("failed to bind status server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("status server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Receiver of the serialized status text the engine produces each cycle.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn start(&mut self) -> Result<(), StatusError>;

    /// Publishes `text` as the latest status. Never blocks on clients.
    fn broadcast(&self, text: &str);

    /// Stops serving. Safe to call repeatedly.
    async fn cleanup(&mut self);
}

/// Sink used when the status server is disabled: writes snapshots to the log.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl StatusSink for LogSink {
    async fn start(&mut self) -> Result<(), StatusError> {
        Ok(())
    }

    fn broadcast(&self, text: &str) {
        debug!(status = text, "Status update");
    }

    async fn cleanup(&mut self) {}
}
