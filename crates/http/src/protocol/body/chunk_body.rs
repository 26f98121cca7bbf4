use std::fmt;

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use tokio::sync::Mutex;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::codec::{ChunkDecoder, ChunkEncoder};
use crate::protocol::body::{BodyGate, QuasiBody, READ_BUFFER_SIZE};
use crate::protocol::{PayloadItem, PayloadSize, QuasiHttpError};

/// Exposes the subsequent-chunk wire form of another body.
///
/// Reading yields the inner body's bytes framed as chunks, followed by the
/// end-of-body chunk. The content length is always unknown.
pub struct ChunkEncodingBody<B> {
    inner: B,
    gate: BodyGate,
    state: Mutex<EncodeState>,
}

struct EncodeState {
    encoder: ChunkEncoder,
    encoded: BytesMut,
    scratch: Vec<u8>,
    inner_finished: bool,
}

impl<B: QuasiBody> ChunkEncodingBody<B> {
    pub fn new(inner: B, max_chunk_size: usize) -> Self {
        let payload_size = PayloadSize::from_content_length(inner.content_length());
        let state = EncodeState {
            encoder: ChunkEncoder::new(max_chunk_size, payload_size),
            encoded: BytesMut::new(),
            scratch: vec![0u8; max_chunk_size.clamp(1, READ_BUFFER_SIZE)],
            inner_finished: false,
        };
        Self { inner, gate: BodyGate::new(), state: Mutex::new(state) }
    }
}

impl<B: fmt::Debug> fmt::Debug for ChunkEncodingBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkEncodingBody").field("inner", &self.inner).field("gate", &self.gate).finish()
    }
}

#[async_trait]
impl<B: QuasiBody> QuasiBody for ChunkEncodingBody<B> {
    fn content_length(&self) -> i64 {
        -1
    }

    fn content_type(&self) -> Option<&str> {
        self.inner.content_type()
    }

    async fn read_bytes(&self, buf: &mut [u8]) -> Result<usize, QuasiHttpError> {
        self.gate
            .read(async {
                let mut guard = self.state.lock().await;
                let state = &mut *guard;
                loop {
                    if !state.encoded.is_empty() {
                        let len = state.encoded.len().min(buf.len());
                        buf[..len].copy_from_slice(&state.encoded[..len]);
                        state.encoded.advance(len);
                        return Ok(len);
                    }
                    if state.inner_finished {
                        return Ok(0);
                    }

                    let read = self.inner.read_bytes(&mut state.scratch).await?;
                    if read == 0 {
                        state.encoder.encode(PayloadItem::<Bytes>::Eof, &mut state.encoded)?;
                        state.inner_finished = true;
                    } else {
                        let data = Bytes::copy_from_slice(&state.scratch[..read]);
                        state.encoder.encode(PayloadItem::Chunk(data), &mut state.encoded)?;
                    }
                }
            })
            .await
    }

    async fn end_read(&self, error: Option<QuasiHttpError>) {
        if self.gate.end(error.clone()) {
            self.inner.end_read(error).await;
        }
    }
}

/// Decodes the subsequent chunks arriving on another body, usually the raw bytes
/// left on a connection after a lead chunk.
///
/// The body ends at the end-of-body chunk; the inner body reaching its end before
/// that is a transport error.
pub struct ChunkDecodingBody<B> {
    inner: B,
    gate: BodyGate,
    content_length: i64,
    state: Mutex<DecodeState>,
}

struct DecodeState {
    decoder: ChunkDecoder,
    raw: BytesMut,
    decoded: Bytes,
    scratch: Vec<u8>,
}

impl<B: QuasiBody> ChunkDecodingBody<B> {
    pub fn new(inner: B, chunk_size_limit: usize, payload_size: PayloadSize) -> Self {
        let state = DecodeState {
            decoder: ChunkDecoder::new(chunk_size_limit, payload_size),
            raw: BytesMut::new(),
            decoded: Bytes::new(),
            scratch: vec![0u8; READ_BUFFER_SIZE],
        };
        Self { inner, gate: BodyGate::new(), content_length: payload_size.content_length(), state: Mutex::new(state) }
    }
}

impl<B: fmt::Debug> fmt::Debug for ChunkDecodingBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkDecodingBody")
            .field("inner", &self.inner)
            .field("content_length", &self.content_length)
            .field("gate", &self.gate)
            .finish()
    }
}

#[async_trait]
impl<B: QuasiBody> QuasiBody for ChunkDecodingBody<B> {
    fn content_length(&self) -> i64 {
        self.content_length
    }

    fn content_type(&self) -> Option<&str> {
        self.inner.content_type()
    }

    async fn read_bytes(&self, buf: &mut [u8]) -> Result<usize, QuasiHttpError> {
        self.gate
            .read(async {
                let mut guard = self.state.lock().await;
                let state = &mut *guard;
                loop {
                    if !state.decoded.is_empty() {
                        let len = state.decoded.len().min(buf.len());
                        buf[..len].copy_from_slice(&state.decoded[..len]);
                        state.decoded.advance(len);
                        return Ok(len);
                    }

                    match state.decoder.decode(&mut state.raw)? {
                        Some(PayloadItem::Chunk(data)) => state.decoded = data,
                        Some(PayloadItem::Eof) => return Ok(0),
                        None => {
                            let read = self.inner.read_bytes(&mut state.scratch).await?;
                            if read == 0 {
                                return Err(QuasiHttpError::unexpected_eof("connection closed before the end of body chunk"));
                            }
                            trace!(read, "read raw body bytes");
                            state.raw.extend_from_slice(&state.scratch[..read]);
                        }
                    }
                }
            })
            .await
    }

    async fn end_read(&self, error: Option<QuasiHttpError>) {
        if self.gate.end(error.clone()) {
            self.inner.end_read(error).await;
        }
    }
}
