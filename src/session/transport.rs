// src/session/transport.rs
use crate::models::events::OutgoingEvent;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport channel is closed")]
    Closed,
}

/// Outbound side of the template chat connection.
///
/// Sessions receive one at construction; there is no process-wide socket.
pub trait TemplateTransport {
    fn emit(&self, event: OutgoingEvent) -> Result<(), TransportError>;
}

/// Forwards outgoing events into a tokio channel drained by the socket writer.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<OutgoingEvent>,
}

impl ChannelTransport {
    pub fn new(sender: mpsc::UnboundedSender<OutgoingEvent>) -> Self {
        Self { sender }
    }

    /// Transport plus the receiver the writer task should drain.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutgoingEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl TemplateTransport for ChannelTransport {
    fn emit(&self, event: OutgoingEvent) -> Result<(), TransportError> {
        self.sender.send(event).map_err(|_| TransportError::Closed)
    }
}
