//! In-process transports.
//!
//! A [`MemoryNetwork`] owns a table of named endpoints. Servers bind a name and accept
//! connections from it; clients allocate connections to a name through
//! [`MemoryStreamTransport`] or [`MemoryMessageTransport`]. Separate networks never
//! see each other's endpoints.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::protocol::ProcessingOptions;
use crate::transport::{
    MessageClientTransport, MessageInbound, MessageInbox, MessageTransport, StreamClientTransport, StreamTransport,
    Transport, message_channel,
};

/// Default capacity of each direction of a byte connection.
pub const DEFAULT_DUPLEX_BUFFER_SIZE: usize = 64 * 1024;

/// Default largest message of a message connection.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024;

type PendingMessageConnection = (MemoryMessageConnection, MessageInbound);

#[derive(Debug, Default)]
struct Endpoints {
    stream: HashMap<String, mpsc::UnboundedSender<DuplexConnection>>,
    message: HashMap<String, mpsc::UnboundedSender<PendingMessageConnection>>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    endpoints: Arc<Mutex<Endpoints>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Default::default()
    }

    fn endpoints(&self) -> MutexGuard<'_, Endpoints> {
        self.endpoints.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds `name` for byte connections.
    ///
    /// # Errors
    ///
    /// [`io::ErrorKind::AddrInUse`] while another live listener holds the name.
    pub fn bind_stream(&self, name: &str) -> io::Result<MemoryStreamListener> {
        let mut endpoints = self.endpoints();
        if endpoints.stream.get(name).is_some_and(|sender| !sender.is_closed()) {
            return Err(io::Error::new(io::ErrorKind::AddrInUse, format!("stream endpoint {name} already bound")));
        }
        let (sender, receiver) = mpsc::unbounded();
        endpoints.stream.insert(name.to_string(), sender);
        debug!(endpoint = name, "bound stream endpoint");
        Ok(MemoryStreamListener { receiver })
    }

    /// Binds `name` for message connections.
    pub fn bind_message(&self, name: &str) -> io::Result<MemoryMessageListener> {
        let mut endpoints = self.endpoints();
        if endpoints.message.get(name).is_some_and(|sender| !sender.is_closed()) {
            return Err(io::Error::new(io::ErrorKind::AddrInUse, format!("message endpoint {name} already bound")));
        }
        let (sender, receiver) = mpsc::unbounded();
        endpoints.message.insert(name.to_string(), sender);
        debug!(endpoint = name, "bound message endpoint");
        Ok(MemoryMessageListener { receiver })
    }

    fn connect_stream(&self, name: &str, buffer_size: usize) -> Option<DuplexConnection> {
        let mut endpoints = self.endpoints();
        let listener = endpoints.stream.get(name)?;

        let (client, server) = tokio::io::duplex(buffer_size);
        if listener.unbounded_send(DuplexConnection::new(server)).is_err() {
            endpoints.stream.remove(name);
            return None;
        }
        Some(DuplexConnection::new(client))
    }

    fn connect_message(&self, name: &str, client_inbox: MessageInbox) -> Option<MemoryMessageConnection> {
        let mut endpoints = self.endpoints();
        let listener = endpoints.message.get(name)?;

        let (server_inbox, server_inbound) = message_channel();
        let server = MemoryMessageConnection::new(client_inbox);
        if listener.unbounded_send((server, server_inbound)).is_err() {
            endpoints.message.remove(name);
            return None;
        }
        Some(MemoryMessageConnection::new(server_inbox))
    }
}

/// Accepting side of a bound byte endpoint. Dropping it unbinds the name.
#[derive(Debug)]
pub struct MemoryStreamListener {
    receiver: mpsc::UnboundedReceiver<DuplexConnection>,
}

impl MemoryStreamListener {
    pub async fn accept(&mut self) -> Option<DuplexConnection> {
        self.receiver.next().await
    }
}

/// Accepting side of a bound message endpoint. Dropping it unbinds the name.
#[derive(Debug)]
pub struct MemoryMessageListener {
    receiver: mpsc::UnboundedReceiver<PendingMessageConnection>,
}

impl MemoryMessageListener {
    /// Next connection with the inbound queue its messages arrive on.
    pub async fn accept(&mut self) -> Option<(MemoryMessageConnection, MessageInbound)> {
        self.receiver.next().await
    }
}

/// One end of an in-memory byte connection.
#[derive(Debug)]
pub struct DuplexConnection {
    reader: tokio::sync::Mutex<ReadHalf<DuplexStream>>,
    writer: tokio::sync::Mutex<WriteHalf<DuplexStream>>,
}

impl DuplexConnection {
    fn new(stream: DuplexStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self { reader: tokio::sync::Mutex::new(reader), writer: tokio::sync::Mutex::new(writer) }
    }
}

/// Byte transport over a [`MemoryNetwork`]; serves both clients and servers.
#[derive(Debug, Clone)]
pub struct MemoryStreamTransport {
    network: MemoryNetwork,
    buffer_size: usize,
}

impl MemoryStreamTransport {
    pub fn new(network: MemoryNetwork) -> Self {
        Self { network, buffer_size: DEFAULT_DUPLEX_BUFFER_SIZE }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }
}

#[async_trait]
impl Transport for MemoryStreamTransport {
    type Connection = DuplexConnection;

    async fn release_connection(&self, connection: &Self::Connection) -> io::Result<()> {
        trace!("shutdown duplex connection");
        connection.writer.lock().await.shutdown().await
    }
}

#[async_trait]
impl StreamTransport for MemoryStreamTransport {
    async fn read_bytes(&self, connection: &Self::Connection, buf: &mut [u8]) -> io::Result<usize> {
        connection.reader.lock().await.read(buf).await
    }

    async fn write_bytes(&self, connection: &Self::Connection, data: &[u8]) -> io::Result<()> {
        let mut writer = connection.writer.lock().await;
        writer.write_all(data).await?;
        writer.flush().await
    }
}

#[async_trait]
impl StreamClientTransport for MemoryStreamTransport {
    type Endpoint = str;

    async fn allocate_connection(&self, remote: &str, _options: &ProcessingOptions) -> io::Result<Option<Self::Connection>> {
        Ok(self.network.connect_stream(remote, self.buffer_size))
    }
}

/// One end of an in-memory message connection.
///
/// Messages go straight into the peer's inbox. Releasing drops the inbox handle so the
/// peer sees its inbound queue end.
#[derive(Debug)]
pub struct MemoryMessageConnection {
    peer: Mutex<Option<MessageInbox>>,
}

impl MemoryMessageConnection {
    fn new(peer: MessageInbox) -> Self {
        Self { peer: Mutex::new(Some(peer)) }
    }

    fn peer(&self) -> Option<MessageInbox> {
        self.peer.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Message transport over a [`MemoryNetwork`]; serves both clients and servers.
#[derive(Debug, Clone)]
pub struct MemoryMessageTransport {
    network: MemoryNetwork,
    max_message_size: usize,
}

impl MemoryMessageTransport {
    pub fn new(network: MemoryNetwork) -> Self {
        Self { network, max_message_size: DEFAULT_MAX_MESSAGE_SIZE }
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }
}

#[async_trait]
impl Transport for MemoryMessageTransport {
    type Connection = MemoryMessageConnection;

    async fn release_connection(&self, connection: &Self::Connection) -> io::Result<()> {
        trace!("close message connection");
        connection.peer.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}

#[async_trait]
impl MessageTransport for MemoryMessageTransport {
    fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    async fn send_message(&self, connection: &Self::Connection, data: Bytes, cancellation: &CancellationToken) -> io::Result<()> {
        if cancellation.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "send cancelled"));
        }
        if data.len() > self.max_message_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("message of {} bytes exceed the limit {}", data.len(), self.max_message_size),
            ));
        }

        let peer = connection.peer().ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        if !peer.on_message(&data) {
            trace!(len = data.len(), "peer gone, drop message");
        }
        Ok(())
    }
}

#[async_trait]
impl MessageClientTransport for MemoryMessageTransport {
    type Endpoint = str;

    async fn allocate_connection(
        &self,
        remote: &str,
        inbox: MessageInbox,
        _options: &ProcessingOptions,
    ) -> io::Result<Option<Self::Connection>> {
        Ok(self.network.connect_message(remote, inbox))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_connection_round_trip() {
        let network = MemoryNetwork::new();
        let transport = MemoryStreamTransport::new(network.clone());
        let mut listener = network.bind_stream("svc").unwrap();

        let client = transport.allocate_connection("svc", &ProcessingOptions::new()).await.unwrap().unwrap();
        let server = listener.accept().await.unwrap();

        transport.write_bytes(&client, b"ping").await.unwrap();
        let mut buf = [0u8; 8];
        let read = transport.read_bytes(&server, &mut buf).await.unwrap();
        assert_eq!(&buf[..read], b"ping");

        transport.release_connection(&client).await.unwrap();
        assert_eq!(transport.read_bytes(&server, &mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_endpoint_has_no_connection() {
        let transport = MemoryStreamTransport::new(MemoryNetwork::new());
        let connection = transport.allocate_connection("nowhere", &ProcessingOptions::new()).await.unwrap();
        assert!(connection.is_none());
    }

    #[tokio::test]
    async fn networks_are_isolated() {
        let first = MemoryNetwork::new();
        let _listener = first.bind_stream("svc").unwrap();
        assert_eq!(first.bind_stream("svc").unwrap_err().kind(), io::ErrorKind::AddrInUse);

        let second = MemoryNetwork::new();
        let transport = MemoryStreamTransport::new(second);
        assert!(transport.allocate_connection("svc", &ProcessingOptions::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn message_connection_round_trip() {
        let network = MemoryNetwork::new();
        let transport = MemoryMessageTransport::new(network.clone()).with_max_message_size(8);
        let mut listener = network.bind_message("svc").unwrap();

        let (client_inbox, mut client_inbound) = message_channel();
        let client = transport.allocate_connection("svc", client_inbox, &ProcessingOptions::new()).await.unwrap().unwrap();
        let (server, mut server_inbound) = listener.accept().await.unwrap();
        let token = CancellationToken::new();

        transport.send_message(&client, Bytes::from_static(b"hello"), &token).await.unwrap();
        assert_eq!(server_inbound.next_message().await.unwrap(), Bytes::from_static(b"hello"));

        transport.send_message(&server, Bytes::from_static(b"back"), &token).await.unwrap();
        assert_eq!(client_inbound.next_message().await.unwrap(), Bytes::from_static(b"back"));

        let too_large = transport.send_message(&client, Bytes::from_static(b"123456789"), &token).await;
        assert_eq!(too_large.unwrap_err().kind(), io::ErrorKind::InvalidInput);

        transport.release_connection(&server).await.unwrap();
        assert!(client_inbound.next_message().await.is_none());
        assert!(transport.send_message(&server, Bytes::from_static(b"x"), &token).await.is_err());
    }
}
