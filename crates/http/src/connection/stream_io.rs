use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::codec::ExchangeEncoder;
use crate::connection::ExchangeContext;
use crate::protocol::body::{BodyGate, ChunkDecodingBody, ContentTypeBody, QuasiBody, READ_BUFFER_SIZE, SharedBody};
use crate::protocol::{LeadChunk, Message, PayloadItem, QuasiHttpError};
use crate::transport::StreamTransport;

/// Buffers encoded frames and writes them to a stream connection.
pub(crate) struct FrameWriter<T: StreamTransport> {
    context: ExchangeContext<T>,
    buffer: BytesMut,
    encoder: ExchangeEncoder,
}

impl<T: StreamTransport> FrameWriter<T> {
    pub(crate) fn new(context: ExchangeContext<T>) -> Self {
        let max_chunk_size = context.options().max_chunk_size();
        Self { context, buffer: BytesMut::with_capacity(READ_BUFFER_SIZE), encoder: ExchangeEncoder::new(max_chunk_size) }
    }

    #[inline]
    pub(crate) fn write<D: Buf>(&mut self, item: Message<LeadChunk, D>) -> Result<(), QuasiHttpError> {
        self.encoder.encode(item, &mut self.buffer)
    }

    pub(crate) async fn flush(&mut self) -> Result<(), QuasiHttpError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let data = self.buffer.split();
        self.context.transport().write_bytes(self.context.connection(), &data).await?;
        Ok(())
    }

    /// Writes the lead chunk on its own, so the peer can start processing before the body.
    pub(crate) async fn send_lead_chunk(&mut self, lead_chunk: LeadChunk) -> Result<(), QuasiHttpError> {
        self.write(Message::<_, Bytes>::Header(lead_chunk))?;
        self.flush().await
    }

    /// Streams `body` as subsequent chunks up to and including the end-of-body chunk.
    pub(crate) async fn send_body(&mut self, body: &SharedBody) -> Result<u64, QuasiHttpError> {
        let mut buf = vec![0u8; self.context.options().max_chunk_size().min(READ_BUFFER_SIZE * 8)];
        let mut sent = 0u64;
        loop {
            let read = body.read_bytes(&mut buf).await?;
            if read == 0 {
                self.write(Message::<LeadChunk, Bytes>::Payload(PayloadItem::Eof))?;
                self.flush().await?;
                trace!(sent, "body sent");
                return Ok(sent);
            }

            self.write(Message::<LeadChunk, _>::Payload(PayloadItem::Chunk(&buf[..read])))?;
            self.flush().await?;
            sent += read as u64;
        }
    }
}

impl<T: StreamTransport> fmt::Debug for FrameWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameWriter").field("buffered", &self.buffer.len()).finish_non_exhaustive()
    }
}

/// Reads frames from a stream connection.
///
/// Bytes read past the last decoded frame stay buffered and are handed over to the
/// body created by [`into_body`](Self::into_body).
pub(crate) struct FrameReader<T: StreamTransport> {
    context: ExchangeContext<T>,
    buffer: BytesMut,
    scratch: Vec<u8>,
}

impl<T: StreamTransport> FrameReader<T> {
    pub(crate) fn new(context: ExchangeContext<T>) -> Self {
        Self { context, buffer: BytesMut::new(), scratch: vec![0u8; READ_BUFFER_SIZE] }
    }

    pub(crate) async fn read_frame<D>(&mut self, decoder: &mut D) -> Result<D::Item, QuasiHttpError>
    where
        D: Decoder<Error = QuasiHttpError>,
    {
        loop {
            if let Some(item) = decoder.decode(&mut self.buffer)? {
                return Ok(item);
            }

            let read = self.context.transport().read_bytes(self.context.connection(), &mut self.scratch).await?;
            if read == 0 {
                return Err(QuasiHttpError::unexpected_eof("connection closed before a complete frame"));
            }
            trace!(read, "read frame bytes");
            self.buffer.extend_from_slice(&self.scratch[..read]);
        }
    }

    /// The rest of the connection as a raw body.
    pub(crate) fn into_body(self) -> ConnectionBody<T> {
        ConnectionBody { context: self.context, gate: BodyGate::new(), leftover: Mutex::new(self.buffer.freeze()) }
    }

    /// The body announced by `lead_chunk`, decoded from the rest of the connection.
    pub(crate) fn into_content(self, lead_chunk: &LeadChunk) -> Option<SharedBody> {
        if !lead_chunk.has_content() {
            return None;
        }

        let chunk_size_limit = self.context.options().chunk_size_limit();
        let decoding = ChunkDecodingBody::new(self.into_body(), chunk_size_limit, lead_chunk.payload_size());
        Some(Arc::new(ContentTypeBody::new(decoding, lead_chunk.content_type.clone())))
    }
}

/// Raw bytes of a stream connection, starting with what a [`FrameReader`] buffered.
///
/// Ending the body does not release the connection; the connection lease does.
pub(crate) struct ConnectionBody<T: StreamTransport> {
    context: ExchangeContext<T>,
    gate: BodyGate,
    leftover: Mutex<Bytes>,
}

impl<T: StreamTransport> fmt::Debug for ConnectionBody<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBody").field("gate", &self.gate).finish_non_exhaustive()
    }
}

#[async_trait]
impl<T: StreamTransport> QuasiBody for ConnectionBody<T> {
    fn content_length(&self) -> i64 {
        -1
    }

    async fn read_bytes(&self, buf: &mut [u8]) -> Result<usize, QuasiHttpError> {
        self.gate
            .read(async {
                {
                    let mut leftover = self.leftover.lock().unwrap_or_else(PoisonError::into_inner);
                    if !leftover.is_empty() {
                        let len = leftover.len().min(buf.len());
                        buf[..len].copy_from_slice(&leftover[..len]);
                        leftover.advance(len);
                        return Ok(len);
                    }
                }
                Ok(self.context.transport().read_bytes(self.context.connection(), buf).await?)
            })
            .await
    }

    async fn end_read(&self, error: Option<QuasiHttpError>) {
        self.gate.end(error);
    }
}
