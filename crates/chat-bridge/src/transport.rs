//! Transport abstractions for the chat connection
//!
//! A [`ChatTransport`] opens connections; each open connection is a
//! [`ChatSink`] for outbound text plus a [`ConnectionMonitor`] the transport
//! uses to report that the peer went away.

use async_trait::async_trait;
use craftbridge_core::Result;
use tokio::sync::mpsc;

/// Connection lifecycle events reported to the bridge
pub(crate) enum TransportEvent {
    /// Connect attempt succeeded
    Opened {
        generation: u64,
        sink: Box<dyn ChatSink>,
    },
    /// Connect attempt failed
    Failed { generation: u64, reason: String },
    /// Peer closed an open connection
    Closed { generation: u64 },
    /// Open connection hit an I/O error
    Error { generation: u64, reason: String },
}

/// Reports close/error for one specific connection attempt
///
/// Events are tagged with the attempt's generation so the bridge can ignore
/// reports from connections it has already replaced.
#[derive(Clone)]
pub struct ConnectionMonitor {
    generation: u64,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl ConnectionMonitor {
    pub(crate) fn new(generation: u64, events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { generation, events }
    }

    /// Connection attempt this monitor belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The peer closed the connection
    pub fn closed(&self) {
        // Send errors mean the bridge has shut down
        let _ = self.events.send(TransportEvent::Closed {
            generation: self.generation,
        });
    }

    /// The connection failed
    pub fn error(&self, reason: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Error {
            generation: self.generation,
            reason: reason.into(),
        });
    }
}

/// Write half of an open chat connection
#[async_trait]
pub trait ChatSink: Send {
    /// Send one text frame
    async fn send(&mut self, text: &str) -> Result<()>;

    /// Close the connection; must not fail
    async fn close(&mut self);
}

/// Factory for chat connections
#[async_trait]
pub trait ChatTransport: Send + Sync + 'static {
    /// Open a connection authenticated with `credential`
    ///
    /// Implementations report later peer close/error through `monitor`.
    async fn connect(
        &self,
        credential: &str,
        monitor: ConnectionMonitor,
    ) -> Result<Box<dyn ChatSink>>;
}
