//! Message transport between the two peers.
//!
//! The protocol only needs an ordered, reliable stream of [`Message`]s in
//! each direction. Framing, encryption and timeouts belong to the
//! implementation.

use crate::error::{PsiError, Result};
use crate::messages::Message;
use std::sync::mpsc::{channel, Receiver, Sender};
use tracing::trace;

/// Ordered, reliable channel to the peer.
pub trait Transport {
    fn send(&mut self, message: Message) -> Result<()>;

    fn receive(&mut self) -> Result<Message>;

    /// Receive the next message and require it to be a `T`.
    ///
    /// # Errors
    /// Returns `PsiError::ProtocolViolation` if the peer sent a different
    /// kind of message.
    fn expect<T>(&mut self) -> Result<T>
    where
        T: TryFrom<Message, Error = PsiError>,
    {
        let message = self.receive()?;
        trace!(kind = %message.kind(), "received message");
        T::try_from(message)
    }
}

/// One end of an in-process channel pair.
#[derive(Debug)]
pub struct InMemoryTransport {
    tx: Sender<Message>,
    rx: Receiver<Message>,
}

impl InMemoryTransport {
    /// Two connected ends; what one sends, the other receives.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = channel();
        let (b_tx, a_rx) = channel();
        (
            Self { tx: a_tx, rx: a_rx },
            Self { tx: b_tx, rx: b_rx },
        )
    }
}

impl Transport for InMemoryTransport {
    fn send(&mut self, message: Message) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| PsiError::Transport("peer hung up".to_string()))
    }

    fn receive(&mut self) -> Result<Message> {
        self.rx
            .recv()
            .map_err(|_| PsiError::Transport("peer hung up".to_string()))
    }
}
