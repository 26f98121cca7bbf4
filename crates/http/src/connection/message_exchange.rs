//! PDU plumbing shared by both sides of the message-oriented protocol.
//!
//! A [`MessageExchange`] owns the inbound message queue of a connection. Every PDU
//! is read through [`MessageExchange::receive`], which serves chunk-gets for the body
//! this side is sending and turns a Fin into [`QuasiHttpError::PeerAborted`], so
//! whoever waits for a response or a body chunk also keeps the outgoing body flowing.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::codec::{BodyDirection, PDU_HEADER_LEN, PduCodec, TransferPdu};
use crate::connection::{AbortSignal, ExchangeContext};
use crate::ensure;
use crate::protocol::body::{
    BodyGate, BytesBody, ContentTypeBody, QuasiBody, READ_BUFFER_SIZE, SharedBody, read_all_bytes, read_up_to,
};
use crate::protocol::{LeadChunk, PayloadSize, QuasiHttpError, TransferPhase};
use crate::transport::{MessageInbound, MessageTransport};

pub(crate) struct MessageExchange<T: MessageTransport> {
    context: ExchangeContext<T>,
    cancellation: CancellationToken,
    inbound: Mutex<MessageInbound>,
    outgoing: Mutex<Option<OutgoingChunkTransfer>>,
}

impl<T: MessageTransport> MessageExchange<T> {
    pub(crate) fn new(context: ExchangeContext<T>, inbound: MessageInbound, cancellation: CancellationToken) -> Self {
        Self { context, cancellation, inbound: Mutex::new(inbound), outgoing: Mutex::new(None) }
    }

    pub(crate) fn context(&self) -> &ExchangeContext<T> {
        &self.context
    }

    /// Most data bytes a chunk-ret can carry.
    pub(crate) fn max_data_len(&self) -> usize {
        self.context.transport().max_message_size().saturating_sub(PDU_HEADER_LEN).max(1)
    }

    /// Data bytes left in a message once `pdu`, carrying empty inline data, is encoded.
    pub(crate) fn inline_capacity(&self, pdu: TransferPdu) -> Result<usize, QuasiHttpError> {
        let encoded = PduCodec::encode_pdu(pdu)?;
        Ok(self.context.transport().max_message_size().saturating_sub(encoded.len()))
    }

    pub(crate) async fn send(&self, pdu: TransferPdu) -> Result<(), QuasiHttpError> {
        self.send_with(pdu, &self.cancellation).await
    }

    async fn send_with(&self, pdu: TransferPdu, cancellation: &CancellationToken) -> Result<(), QuasiHttpError> {
        let data = PduCodec::encode_pdu(pdu)?;
        let max_message_size = self.context.transport().max_message_size();
        ensure!(data.len() <= max_message_size, QuasiHttpError::chunk_size_exceeded(data.len(), max_message_size));

        self.context.transport().send_message(self.context.connection(), data, cancellation).await?;
        Ok(())
    }

    /// Sends a Fin, even when the exchange was cancelled. Failures are only logged.
    pub(crate) async fn send_fin(&self) {
        if let Err(e) = self.send_with(TransferPdu::Fin, &CancellationToken::new()).await {
            debug!(cause = %e, "failed to send fin");
        }
    }

    /// Serves chunk-gets for `transfer` from now on.
    pub(crate) async fn set_outgoing(&self, transfer: OutgoingChunkTransfer) {
        *self.outgoing.lock().await = Some(transfer);
    }

    /// Next PDU addressed to whoever waits on this exchange.
    ///
    /// Chunk-gets are served on the spot and yield `None`.
    pub(crate) async fn receive(&self) -> Result<Option<TransferPdu>, QuasiHttpError> {
        let message = {
            let mut inbound = self.inbound.lock().await;
            inbound.next_message().await
        };
        let message = message.ok_or_else(|| QuasiHttpError::unexpected_eof("connection closed while awaiting a pdu"))?;

        match PduCodec::decode_pdu(&message)? {
            TransferPdu::Fin => {
                debug!("peer sent fin");
                Err(QuasiHttpError::PeerAborted)
            }
            TransferPdu::ChunkGet { direction, sequence_number, max_len } => {
                self.serve(direction, sequence_number, max_len).await.map_err(|e| e.in_phase(TransferPhase::BodyTransfer))?;
                Ok(None)
            }
            pdu => Ok(Some(pdu)),
        }
    }

    /// Receives until `accept` takes a PDU, discarding the ones it refuses.
    pub(crate) async fn receive_matching<R, F>(&self, mut accept: F) -> Result<R, QuasiHttpError>
    where
        F: FnMut(TransferPdu) -> Option<R>,
    {
        loop {
            let Some(pdu) = self.receive().await? else {
                continue;
            };

            let pdu_type = pdu.pdu_type();
            match accept(pdu) {
                Some(accepted) => return Ok(accepted),
                None => trace!(?pdu_type, "discard unexpected pdu"),
            }
        }
    }

    /// Answers a chunk-get for the outgoing body.
    ///
    /// The chunk is claimed under the lock and read outside it. Once the body has
    /// ended, every chunk-get is answered with an empty chunk-ret.
    async fn serve(&self, direction: BodyDirection, sequence_number: u32, max_len: u32) -> Result<(), QuasiHttpError> {
        let len = usize::try_from(max_len).unwrap_or(usize::MAX).clamp(1, self.max_data_len());
        let pending = {
            let mut outgoing = self.outgoing.lock().await;
            let Some(transfer) = outgoing.as_mut().filter(|transfer| transfer.direction == direction) else {
                trace!(?direction, sequence_number, "discard chunk get without outgoing body");
                return Ok(());
            };
            if transfer.finished {
                PendingChunk::Ready(Bytes::new())
            } else if sequence_number != transfer.next_seq {
                trace!(?direction, sequence_number, expected = transfer.next_seq, "discard stale chunk get");
                return Ok(());
            } else {
                transfer.next_seq = transfer.next_seq.wrapping_add(1);
                transfer.claim(len)
            }
        };

        let data = pending.read().await?;
        let sent = data.len();
        trace!(?direction, sequence_number, len = sent, "serve chunk get");
        self.send(TransferPdu::ChunkRet { direction, sequence_number, data }).await?;

        if let Some(transfer) = self.outgoing.lock().await.as_mut().filter(|transfer| transfer.direction == direction) {
            transfer.record_sent(sent);
        }
        Ok(())
    }

    /// Keeps serving chunk-gets until the outgoing body has been sent to its end.
    pub(crate) async fn finish_outgoing(&self) -> Result<(), QuasiHttpError> {
        loop {
            if self.outgoing.lock().await.as_ref().is_none_or(|transfer| transfer.finished) {
                return Ok(());
            }
            if let Some(pdu) = self.receive().await? {
                trace!(pdu_type = ?pdu.pdu_type(), "discard pdu while finishing outgoing body");
            }
        }
    }
}

impl<T: MessageTransport> fmt::Debug for MessageExchange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageExchange").field("context", &self.context).finish_non_exhaustive()
    }
}

#[async_trait]
impl<T: MessageTransport> AbortSignal for MessageExchange<T> {
    async fn signal_abort(&self) {
        self.send_fin().await
    }
}

/// A body being pulled by the peer through chunk-gets.
///
/// The transfer ends with an empty chunk-ret, whether the length is known or not.
/// A body of known length never sends more than its declared bytes.
pub(crate) struct OutgoingChunkTransfer {
    direction: BodyDirection,
    body: SharedBody,
    prefetched: Bytes,
    remaining: Option<u64>,
    next_seq: u32,
    finished: bool,
}

impl OutgoingChunkTransfer {
    fn new(direction: BodyDirection, body: SharedBody, prefetched: Bytes) -> Self {
        let remaining = match PayloadSize::from_content_length(body.content_length()) {
            PayloadSize::Length(declared) => Some(declared),
            PayloadSize::Unknown | PayloadSize::Empty => None,
        };
        Self { direction, body, prefetched, remaining, next_seq: 0, finished: false }
    }

    /// The next chunk of at most `len` bytes, to be read without holding the transfer.
    fn claim(&mut self, len: usize) -> PendingChunk {
        let len = match self.remaining {
            Some(remaining) => usize::try_from(remaining).map_or(len, |remaining| remaining.min(len)),
            None => len,
        };
        if len == 0 {
            return PendingChunk::Ready(Bytes::new());
        }
        if !self.prefetched.is_empty() {
            let len = len.min(self.prefetched.len());
            return PendingChunk::Ready(self.prefetched.split_to(len));
        }
        PendingChunk::Read { body: self.body.clone(), len }
    }

    fn record_sent(&mut self, sent: usize) {
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(sent as u64);
        }
        self.finished = sent == 0;
    }
}

enum PendingChunk {
    Ready(Bytes),
    Read { body: SharedBody, len: usize },
}

impl PendingChunk {
    async fn read(self) -> Result<Bytes, QuasiHttpError> {
        match self {
            PendingChunk::Ready(data) => Ok(data),
            PendingChunk::Read { body, len } => {
                let mut buf = vec![0u8; len];
                let read = read_up_to(&body, &mut buf).await?;
                buf.truncate(read);
                Ok(Bytes::from(buf))
            }
        }
    }
}

/// Reads up to `capacity + 1` bytes of `body`, growing the buffer as bytes arrive.
async fn read_ahead(body: &SharedBody, capacity: usize) -> Result<Bytes, QuasiHttpError> {
    let target = capacity.saturating_add(1);
    let mut data = BytesMut::new();
    let mut buf = vec![0u8; target.min(READ_BUFFER_SIZE)];
    while data.len() < target {
        let want = (target - data.len()).min(buf.len());
        let read = body.read_bytes(&mut buf[..want]).await?;
        if read == 0 {
            break;
        }
        data.extend_from_slice(&buf[..read]);
    }
    Ok(data.freeze())
}

/// How a body travels in the message-oriented protocol.
pub(crate) enum OutgoingBody {
    Absent,
    Inline(Bytes),
    Chunked(OutgoingChunkTransfer),
}

impl OutgoingBody {
    /// Inlines `body` when its bytes fit in `capacity`, otherwise prepares a chunk transfer.
    ///
    /// A body of unknown length is read ahead by up to `capacity + 1` bytes to decide;
    /// what was read ahead is sent first by the chunk transfer.
    pub(crate) async fn prepare(direction: BodyDirection, body: Option<&SharedBody>, capacity: usize) -> Result<Self, QuasiHttpError> {
        let Some(body) = body else {
            return Ok(OutgoingBody::Absent);
        };

        match PayloadSize::from_content_length(body.content_length()) {
            PayloadSize::Length(declared) if declared <= capacity as u64 => {
                let data = read_all_bytes(body, Some(capacity)).await?;
                ensure!(
                    data.len() as u64 == declared,
                    QuasiHttpError::content_length_violation(format!("body produced {} of {declared} bytes", data.len()))
                );
                Ok(OutgoingBody::Inline(data))
            }
            PayloadSize::Length(_) => Ok(OutgoingBody::Chunked(OutgoingChunkTransfer::new(direction, body.clone(), Bytes::new()))),
            PayloadSize::Unknown | PayloadSize::Empty => {
                let data = read_ahead(body, capacity).await?;
                if data.len() <= capacity {
                    Ok(OutgoingBody::Inline(data))
                } else {
                    Ok(OutgoingBody::Chunked(OutgoingChunkTransfer::new(direction, body.clone(), data)))
                }
            }
        }
    }

    /// Splits into the inline data of the lead PDU and the transfer to install, if any.
    pub(crate) fn into_parts(self) -> (Option<Bytes>, Option<OutgoingChunkTransfer>) {
        match self {
            OutgoingBody::Absent => (None, None),
            OutgoingBody::Inline(data) => (Some(data), None),
            OutgoingBody::Chunked(transfer) => (None, Some(transfer)),
        }
    }
}

/// A body received through chunk-get / chunk-ret round trips.
///
/// The body ends at the first empty chunk-ret. With a declared length, that empty
/// chunk-ret is pulled once the declared bytes are in, and receiving fewer or more
/// bytes than declared is a [`QuasiHttpError::ContentLengthViolation`].
pub(crate) struct IncomingChunkBody<T: MessageTransport> {
    exchange: Arc<MessageExchange<T>>,
    direction: BodyDirection,
    gate: BodyGate,
    content_length: i64,
    received: AtomicU64,
    next_seq: AtomicU32,
    finished: AtomicBool,
}

impl<T: MessageTransport> IncomingChunkBody<T> {
    fn new(exchange: Arc<MessageExchange<T>>, direction: BodyDirection, content_length: i64) -> Self {
        Self {
            exchange,
            direction,
            gate: BodyGate::new(),
            content_length,
            received: AtomicU64::new(0),
            next_seq: AtomicU32::new(0),
            finished: AtomicBool::new(false),
        }
    }
}

impl<T: MessageTransport> fmt::Debug for IncomingChunkBody<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingChunkBody")
            .field("direction", &self.direction)
            .field("content_length", &self.content_length)
            .field("received", &self.received.load(Ordering::Relaxed))
            .field("next_seq", &self.next_seq.load(Ordering::Relaxed))
            .field("gate", &self.gate)
            .finish()
    }
}

#[async_trait]
impl<T: MessageTransport> QuasiBody for IncomingChunkBody<T> {
    fn content_length(&self) -> i64 {
        self.content_length
    }

    async fn read_bytes(&self, buf: &mut [u8]) -> Result<usize, QuasiHttpError> {
        self.gate
            .read(async {
                if buf.is_empty() || self.finished.load(Ordering::Acquire) {
                    return Ok(0);
                }

                let sequence_number = self.next_seq.load(Ordering::Acquire);
                let max_chunk_size = self.exchange.context().options().max_chunk_size();
                let max_len = buf.len().min(max_chunk_size).min(self.exchange.max_data_len());
                let direction = self.direction;
                self.exchange
                    .send(TransferPdu::ChunkGet {
                        direction,
                        sequence_number,
                        max_len: u32::try_from(max_len).unwrap_or(u32::MAX),
                    })
                    .await?;

                let data = self
                    .exchange
                    .receive_matching(|pdu| match pdu {
                        TransferPdu::ChunkRet { direction: d, sequence_number: seq, data } if d == direction && seq == sequence_number => {
                            Some(data)
                        }
                        _ => None,
                    })
                    .await?;
                self.next_seq.store(sequence_number.wrapping_add(1), Ordering::Release);

                ensure!(
                    data.len() <= max_len,
                    QuasiHttpError::malformed_envelope(format!("chunk ret of {} bytes exceed the requested {max_len}", data.len()))
                );
                let declared = u64::try_from(self.content_length).ok();
                let received = self.received.load(Ordering::Acquire);
                if data.is_empty() {
                    trace!(?direction, received, "incoming body finished");
                    self.finished.store(true, Ordering::Release);
                    if let Some(declared) = declared {
                        ensure!(
                            received == declared,
                            QuasiHttpError::content_length_violation(format!("body ended after {received} of {declared} bytes"))
                        );
                    }
                    return Ok(0);
                }

                if let Some(declared) = declared {
                    ensure!(
                        received + data.len() as u64 <= declared,
                        QuasiHttpError::content_length_violation(format!(
                            "chunk ret of {} bytes after {received} of {declared} bytes",
                            data.len()
                        ))
                    );
                }
                self.received.fetch_add(data.len() as u64, Ordering::AcqRel);
                buf[..data.len()].copy_from_slice(&data);
                Ok(data.len())
            })
            .await
    }

    async fn end_read(&self, error: Option<QuasiHttpError>) {
        self.gate.end(error);
    }
}

/// The body announced by `lead_chunk`, taken from the inline data or pulled chunk by chunk.
pub(crate) fn incoming_body<T: MessageTransport>(
    exchange: &Arc<MessageExchange<T>>,
    direction: BodyDirection,
    lead_chunk: &LeadChunk,
    inline_data: Option<Bytes>,
) -> Result<Option<SharedBody>, QuasiHttpError> {
    if !lead_chunk.has_content() {
        return Ok(None);
    }

    let content_type = lead_chunk.content_type.clone();
    let payload_size = lead_chunk.payload_size();
    let body: SharedBody = match (inline_data, payload_size) {
        (Some(data), PayloadSize::Length(declared)) => {
            ensure!(
                data.len() as u64 == declared,
                QuasiHttpError::content_length_violation(format!("inline body of {} bytes, declared {declared}", data.len()))
            );
            Arc::new(ContentTypeBody::new(BytesBody::new(data), content_type))
        }
        (Some(data), _) => Arc::new(ContentTypeBody::new(BytesBody::new(data).with_unknown_length(), content_type)),
        (None, _) => {
            let chunks = IncomingChunkBody::new(exchange.clone(), direction, payload_size.content_length());
            Arc::new(ContentTypeBody::new(chunks, content_type))
        }
    };
    Ok(Some(body))
}
