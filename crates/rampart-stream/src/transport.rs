//! Transport collaborator
//!
//! The guardian never assumes how messages arrive. A transport is handed an
//! event sink on every `connect` and pushes messages, heartbeats, errors and
//! state changes into it.

use crate::error::TransportError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// What a transport reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent<M> {
    /// The connection (re)opened
    Open,
    /// Inbound payload
    Message(M),
    /// Liveness signal without payload
    Heartbeat,
    /// The connection broke
    Error(String),
    /// The remote closed the connection
    Closed,
}

/// Sink a transport pushes events into
pub type EventSink<M> = mpsc::UnboundedSender<TransportEvent<M>>;

/// Underlying push transport wrapped by a guardian
#[async_trait]
pub trait Transport<M: Send + 'static>: Send + Sync {
    /// Open the connection. `Ok` means the connection is open.
    async fn connect(&self, events: EventSink<M>) -> Result<(), TransportError>;

    /// Close the connection; must tolerate being called when not connected
    async fn disconnect(&self);
}
