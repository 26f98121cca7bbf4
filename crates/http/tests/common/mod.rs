#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use quasi_http::StandardQuasiHttpServer;
use quasi_http::codec::{PduCodec, TransferPdu};
use quasi_http::handler::{QuasiApplication, make_application};
use quasi_http::protocol::body::{BytesBody, QuasiBody, read_all_bytes};
use quasi_http::protocol::{ProcessingOptions, QuasiHttpError, QuasiRequest, QuasiResponse};
use quasi_http::transport::memory::{
    DuplexConnection, MemoryMessageConnection, MemoryMessageTransport, MemoryNetwork, MemoryStreamTransport,
};
use quasi_http::transport::{
    MessageClientTransport, MessageInbox, MessageTransport, StreamClientTransport, StreamTransport, Transport,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().with_max_level(tracing::Level::TRACE).try_init();
}

/// Responds with the request body, keeping its content type, and echoes the target
/// as the status message.
pub fn echo_application() -> impl QuasiApplication {
    make_application(|mut request: QuasiRequest| async move {
        let mut response = QuasiResponse::with_status_code(200).with_status_message(request.target().to_string());
        for (name, value) in request.headers() {
            response = response.with_header(name.clone(), value.clone());
        }
        if let Some(body) = request.take_body() {
            let data = read_all_bytes(&body, None).await?;
            let mut echoed = BytesBody::new(data);
            if let Some(content_type) = body.content_type() {
                echoed = echoed.with_content_type(content_type);
            }
            response = response.with_body(Arc::new(echoed));
        }
        Ok::<_, QuasiHttpError>(Some(response))
    })
}

/// Results of the exchanges run by a spawned server, in completion order.
pub type ServerResults = mpsc::UnboundedReceiver<Result<(), QuasiHttpError>>;

pub fn spawn_stream_server<A: QuasiApplication>(
    network: &MemoryNetwork,
    name: &str,
    server: StandardQuasiHttpServer<A>,
) -> ServerResults {
    let transport = Arc::new(MemoryStreamTransport::new(network.clone()));
    let mut listener = network.bind_stream(name).unwrap();
    let (results, receiver) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(connection) = listener.accept().await {
            let server = server.clone();
            let transport = transport.clone();
            let results = results.clone();
            tokio::spawn(async move {
                let _ = results.send(server.accept_stream_connection(transport, connection).await);
            });
        }
    });
    receiver
}

pub fn spawn_message_server<A: QuasiApplication, T>(
    network: &MemoryNetwork,
    name: &str,
    transport: Arc<T>,
    server: StandardQuasiHttpServer<A>,
) -> ServerResults
where
    T: MessageTransport<Connection = MemoryMessageConnection>,
{
    let mut listener = network.bind_message(name).unwrap();
    let (results, receiver) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some((connection, inbound)) = listener.accept().await {
            let server = server.clone();
            let transport = transport.clone();
            let results = results.clone();
            tokio::spawn(async move {
                let _ = results.send(server.accept_message_connection(transport, connection, inbound).await);
            });
        }
    });
    receiver
}

/// A body whose reads never complete.
#[derive(Debug, Default)]
pub struct StalledBody;

#[async_trait]
impl QuasiBody for StalledBody {
    fn content_length(&self) -> i64 {
        -1
    }

    async fn read_bytes(&self, _buf: &mut [u8]) -> Result<usize, QuasiHttpError> {
        std::future::pending().await
    }

    async fn end_read(&self, _error: Option<QuasiHttpError>) {}
}

/// Stream transport counting connection releases.
#[derive(Debug)]
pub struct CountingStreamTransport {
    inner: MemoryStreamTransport,
    released: AtomicUsize,
}

impl CountingStreamTransport {
    pub fn new(network: &MemoryNetwork) -> Self {
        Self { inner: MemoryStreamTransport::new(network.clone()), released: AtomicUsize::new(0) }
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for CountingStreamTransport {
    type Connection = DuplexConnection;

    async fn release_connection(&self, connection: &DuplexConnection) -> io::Result<()> {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.inner.release_connection(connection).await
    }
}

#[async_trait]
impl StreamTransport for CountingStreamTransport {
    async fn read_bytes(&self, connection: &DuplexConnection, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read_bytes(connection, buf).await
    }

    async fn write_bytes(&self, connection: &DuplexConnection, data: &[u8]) -> io::Result<()> {
        self.inner.write_bytes(connection, data).await
    }
}

#[async_trait]
impl StreamClientTransport for CountingStreamTransport {
    type Endpoint = str;

    async fn allocate_connection(&self, remote: &str, options: &ProcessingOptions) -> io::Result<Option<DuplexConnection>> {
        self.inner.allocate_connection(remote, options).await
    }
}

/// Message transport recording every PDU it sends.
#[derive(Debug)]
pub struct RecordingMessageTransport {
    inner: MemoryMessageTransport,
    sent: Mutex<Vec<TransferPdu>>,
}

impl RecordingMessageTransport {
    pub fn new(network: &MemoryNetwork, max_message_size: usize) -> Self {
        Self {
            inner: MemoryMessageTransport::new(network.clone()).with_max_message_size(max_message_size),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<TransferPdu> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingMessageTransport {
    type Connection = MemoryMessageConnection;

    async fn release_connection(&self, connection: &MemoryMessageConnection) -> io::Result<()> {
        self.inner.release_connection(connection).await
    }
}

#[async_trait]
impl MessageTransport for RecordingMessageTransport {
    fn max_message_size(&self) -> usize {
        self.inner.max_message_size()
    }

    async fn send_message(&self, connection: &MemoryMessageConnection, data: Bytes, cancellation: &CancellationToken) -> io::Result<()> {
        let pdu = PduCodec::decode_pdu(&data).map_err(io::Error::other)?;
        self.sent.lock().unwrap().push(pdu);
        self.inner.send_message(connection, data, cancellation).await
    }
}

#[async_trait]
impl MessageClientTransport for RecordingMessageTransport {
    type Endpoint = str;

    async fn allocate_connection(
        &self,
        remote: &str,
        inbox: MessageInbox,
        options: &ProcessingOptions,
    ) -> io::Result<Option<MemoryMessageConnection>> {
        self.inner.allocate_connection(remote, inbox, options).await
    }
}
