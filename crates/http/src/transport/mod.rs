//! Transport contracts the protocol engine runs on.
//!
//! The engine never opens sockets itself. It drives connections handed to it through
//! one of two contracts:
//!
//! - [`StreamTransport`]: byte-oriented connections (pipes, TCP streams, ...). The
//!   client side also implements [`StreamClientTransport`] to allocate connections.
//! - [`MessageTransport`]: connections exchanging discrete messages of bounded size.
//!   Inbound messages are pushed into a [`MessageInbox`]; the client side implements
//!   [`MessageClientTransport`].
//!
//! Both share [`Transport`], which owns connection release. [`memory`] provides
//! in-process implementations of all of them.

pub mod memory;

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::ProcessingOptions;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Connection: Send + Sync + 'static;

    /// Releases the connection. The engine calls this exactly once per exchange.
    async fn release_connection(&self, connection: &Self::Connection) -> io::Result<()>;
}

#[async_trait]
pub trait StreamTransport: Transport {
    /// Reads up to `buf.len()` bytes; `Ok(0)` means the peer closed the connection.
    async fn read_bytes(&self, connection: &Self::Connection, buf: &mut [u8]) -> io::Result<usize>;

    async fn write_bytes(&self, connection: &Self::Connection, data: &[u8]) -> io::Result<()>;
}

#[async_trait]
pub trait StreamClientTransport: StreamTransport {
    type Endpoint: ?Sized + Send + Sync;

    /// Opens a connection to `remote`. `Ok(None)` means nothing is reachable there.
    async fn allocate_connection(
        &self,
        remote: &Self::Endpoint,
        options: &ProcessingOptions,
    ) -> io::Result<Option<Self::Connection>>;
}

#[async_trait]
pub trait MessageTransport: Transport {
    /// Largest message `send_message` accepts.
    fn max_message_size(&self) -> usize;

    async fn send_message(&self, connection: &Self::Connection, data: Bytes, cancellation: &CancellationToken) -> io::Result<()>;
}

#[async_trait]
pub trait MessageClientTransport: MessageTransport {
    type Endpoint: ?Sized + Send + Sync;

    /// Opens a connection to `remote` whose inbound messages are delivered to `inbox`.
    async fn allocate_connection(
        &self,
        remote: &Self::Endpoint,
        inbox: MessageInbox,
        options: &ProcessingOptions,
    ) -> io::Result<Option<Self::Connection>>;
}

/// Entry point for messages received on a connection.
///
/// Messages are queued in receipt order and consumed by the exchange running on
/// the connection.
#[derive(Debug, Clone)]
pub struct MessageInbox {
    sender: mpsc::UnboundedSender<Bytes>,
}

impl MessageInbox {
    /// Queues a received message. Returns false once the exchange has gone away.
    pub fn on_message(&self, data: &[u8]) -> bool {
        self.sender.unbounded_send(Bytes::copy_from_slice(data)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Consuming side of a [`MessageInbox`].
#[derive(Debug)]
pub struct MessageInbound {
    receiver: mpsc::UnboundedReceiver<Bytes>,
}

impl MessageInbound {
    /// Next message, or `None` once every inbox handle is dropped.
    pub async fn next_message(&mut self) -> Option<Bytes> {
        self.receiver.next().await
    }
}

pub fn message_channel() -> (MessageInbox, MessageInbound) {
    let (sender, receiver) = mpsc::unbounded();
    (MessageInbox { sender }, MessageInbound { receiver })
}
