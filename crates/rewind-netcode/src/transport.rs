//! Transport traits and message plumbing
//!
//! [`Connection`] is the interface to a peer; users implement it for their
//! network stack (UDP with a reliability layer, WebSocket, ...). Messages are
//! encoded with bincode and routed to the reliable or unreliable send by
//! [`Message::channel`].
//!
//! [`LoopbackConnection`] is an in-memory pair for tests and demos.

use crate::error::{Error, Result};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use rewind_core::{Channel, Message, Outbox};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Network address type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// Socket address (IP + port)
    Socket(SocketAddr),
    /// Custom address (in-memory pipes, WebSocket URLs, etc.)
    Custom(String),
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::Socket(addr)
    }
}

impl From<String> for Address {
    fn from(addr: String) -> Self {
        Address::Custom(addr)
    }
}

impl From<&str> for Address {
    fn from(addr: &str) -> Self {
        Address::Custom(addr.to_string())
    }
}

/// Connection to a single peer
pub trait Connection: Send + Sync {
    /// Error type for this connection
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send data reliably (guaranteed delivery, ordered)
    fn send_reliable(&self, data: &[u8]) -> std::result::Result<(), Self::Error>;

    /// Send data unreliably (best effort, may be duplicated or lost)
    ///
    /// For transports that don't support unreliable sends, this falls back to reliable.
    fn send_unreliable(&self, data: &[u8]) -> std::result::Result<(), Self::Error>;

    /// Receive data (non-blocking)
    ///
    /// Returns `Ok(None)` if no data is available.
    fn recv(&self) -> std::result::Result<Option<Vec<u8>>, Self::Error>;

    /// Check if the connection is still alive
    fn is_connected(&self) -> bool;

    /// Get the remote address
    fn remote_addr(&self) -> Option<Address>;

    /// Close the connection gracefully
    fn close(&self) -> std::result::Result<(), Self::Error>;
}

/// Encode a message for the wire
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    Ok(bincode::serialize(message)?)
}

/// Decode a message received from the wire
pub fn decode(data: &[u8]) -> Result<Message> {
    Ok(bincode::deserialize(data)?)
}

/// Send every queued message on its channel, returning how many were sent
pub fn flush<C>(outbox: &mut Outbox, connection: &C) -> Result<usize>
where
    C: Connection,
{
    let mut sent = 0;
    for message in outbox.drain() {
        let data = encode(&message)?;
        let result = match message.channel() {
            Channel::Reliable => connection.send_reliable(&data),
            Channel::Unreliable => connection.send_unreliable(&data),
        };
        result.map_err(|e| Error::Transport(e.to_string()))?;
        sent += 1;
    }
    Ok(sent)
}

/// Receive and decode everything currently available
pub fn drain_incoming<C>(connection: &C) -> Result<Vec<Message>>
where
    C: Connection,
{
    let mut messages = Vec::new();
    while let Some(data) = connection
        .recv()
        .map_err(|e| Error::Transport(e.to_string()))?
    {
        messages.push(decode(&data)?);
    }
    Ok(messages)
}

/// One end of an in-memory connection
///
/// Sends are delivered immediately and in order. With
/// [`LoopbackConnection::duplicate_unreliable`] every unreliable datagram is
/// delivered twice.
#[derive(Debug)]
pub struct LoopbackConnection {
    outgoing: Sender<Vec<u8>>,
    incoming: Receiver<Vec<u8>>,
    remote: Address,
    duplicate_unreliable: bool,
    closed: Arc<AtomicBool>,
}

impl LoopbackConnection {
    /// Create two connected ends named `a` and `b`
    pub fn pair(a: impl Into<Address>, b: impl Into<Address>) -> (Self, Self) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        let closed = Arc::new(AtomicBool::new(false));
        let end_a = Self {
            outgoing: a_tx,
            incoming: a_rx,
            remote: b.into(),
            duplicate_unreliable: false,
            closed: Arc::clone(&closed),
        };
        let end_b = Self {
            outgoing: b_tx,
            incoming: b_rx,
            remote: a.into(),
            duplicate_unreliable: false,
            closed,
        };
        (end_a, end_b)
    }

    /// Deliver every unreliable send twice
    pub fn duplicate_unreliable(mut self, duplicate: bool) -> Self {
        self.duplicate_unreliable = duplicate;
        self
    }

    fn push(&self, data: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Disconnected);
        }
        self.outgoing
            .send(data.to_vec())
            .map_err(|_| Error::Disconnected)
    }
}

impl Connection for LoopbackConnection {
    type Error = Error;

    fn send_reliable(&self, data: &[u8]) -> Result<()> {
        self.push(data)
    }

    fn send_unreliable(&self, data: &[u8]) -> Result<()> {
        self.push(data)?;
        if self.duplicate_unreliable {
            trace!(bytes = data.len(), "duplicating datagram");
            self.push(data)?;
        }
        Ok(())
    }

    fn recv(&self) -> Result<Option<Vec<u8>>> {
        match self.incoming.try_recv() {
            Ok(data) => Ok(Some(data)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Error::Disconnected),
        }
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn remote_addr(&self) -> Option<Address> {
        Some(self.remote.clone())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
