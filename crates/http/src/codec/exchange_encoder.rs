use std::io;
use std::io::ErrorKind;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::body::ChunkEncoder;
use crate::codec::header::LeadChunkEncoder;
use crate::protocol::{LeadChunk, Message, QuasiHttpError};

/// Encodes one side of an exchange: a lead chunk, then its body as subsequent chunks.
///
/// A chunk encoder is installed when the lead chunk announces content and dropped
/// once the end of the body has been written, so the encoder can be reused for the
/// next lead chunk.
pub struct ExchangeEncoder {
    lead_chunk_encoder: LeadChunkEncoder,
    chunk_encoder: Option<ChunkEncoder>,
    max_chunk_size: usize,
}

impl ExchangeEncoder {
    pub fn new(max_chunk_size: usize) -> Self {
        Self { lead_chunk_encoder: LeadChunkEncoder::default(), chunk_encoder: None, max_chunk_size }
    }
}

impl<D: Buf> Encoder<Message<LeadChunk, D>> for ExchangeEncoder {
    type Error = QuasiHttpError;

    fn encode(&mut self, item: Message<LeadChunk, D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header(lead_chunk) => {
                if self.chunk_encoder.is_some() {
                    error!("expect payload item but receive lead chunk");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                }

                if lead_chunk.has_content() {
                    self.chunk_encoder = Some(ChunkEncoder::new(self.max_chunk_size, lead_chunk.payload_size()));
                }
                self.lead_chunk_encoder.encode(lead_chunk, dst)
            }

            Message::Payload(payload_item) => {
                let chunk_encoder = if let Some(encoder) = &mut self.chunk_encoder {
                    encoder
                } else {
                    error!("expect lead chunk but receive payload item");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                };

                let result = chunk_encoder.encode(payload_item, dst);

                if chunk_encoder.is_finish() {
                    self.chunk_encoder.take();
                }

                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::body::ChunkDecoder;
    use crate::codec::header::LeadChunkDecoder;
    use crate::protocol::{PayloadItem, PayloadSize};
    use bytes::Bytes;
    use tokio_util::codec::Decoder;

    #[test]
    fn lead_chunk_then_body() {
        let mut lead_chunk = LeadChunk { method: Some("POST".into()), request_target: Some("/upload".into()), ..LeadChunk::new() };
        lead_chunk.set_payload_size(PayloadSize::Length(11));

        let mut encoder = ExchangeEncoder::new(8);
        let mut dst = BytesMut::new();
        encoder.encode(Message::<_, Bytes>::Header(lead_chunk.clone()), &mut dst).unwrap();
        encoder.encode(Message::<LeadChunk, _>::Payload(PayloadItem::Chunk(Bytes::from_static(b"hello world"))), &mut dst).unwrap();
        encoder.encode(Message::<LeadChunk, Bytes>::Payload(PayloadItem::Eof), &mut dst).unwrap();

        let decoded = LeadChunkDecoder::default().decode(&mut dst).unwrap().unwrap();
        assert_eq!(decoded, lead_chunk);

        let mut decoder = ChunkDecoder::new(8192, decoded.payload_size());
        let mut body = Vec::new();
        while let Some(PayloadItem::Chunk(data)) = decoder.decode(&mut dst).unwrap() {
            body.extend_from_slice(&data);
        }
        assert_eq!(body, b"hello world");
        assert!(decoder.is_finish());
        assert!(dst.is_empty());
    }

    #[test]
    fn payload_without_lead_chunk() {
        let mut encoder = ExchangeEncoder::new(8);
        let mut dst = BytesMut::new();
        let result = encoder.encode(Message::<LeadChunk, _>::Payload(PayloadItem::Chunk(Bytes::from_static(b"x"))), &mut dst);
        assert!(matches!(result, Err(QuasiHttpError::Transport { .. })));
    }

    #[test]
    fn lead_chunk_without_content_needs_no_payload() {
        let mut encoder = ExchangeEncoder::new(8);
        let mut dst = BytesMut::new();
        encoder.encode(Message::<_, Bytes>::Header(LeadChunk::new()), &mut dst).unwrap();
        encoder.encode(Message::<_, Bytes>::Header(LeadChunk::new()), &mut dst).unwrap();
    }
}
