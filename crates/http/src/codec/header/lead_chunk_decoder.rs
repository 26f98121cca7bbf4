//! Decoder reading a length-prefixed [`LeadChunk`] from a byte stream.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::header::envelope::deserialize_envelope;
use crate::codec::header::lead_chunk_encoder::LEAD_CHUNK_PREFIX_LEN;
use crate::ensure;
use crate::protocol::{LeadChunk, MAX_LEAD_CHUNK_SIZE, QuasiHttpError};

/// Decodes one lead chunk, leaving any following body bytes in the buffer.
///
/// The declared length is validated before the envelope is buffered, so an oversized
/// prefix fails right away instead of waiting for bytes that will be rejected anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadChunkDecoder {
    max_size: usize,
}

impl LeadChunkDecoder {
    pub fn new(max_size: usize) -> Self {
        Self { max_size: max_size.min(MAX_LEAD_CHUNK_SIZE) }
    }
}

impl Default for LeadChunkDecoder {
    fn default() -> Self {
        Self::new(MAX_LEAD_CHUNK_SIZE)
    }
}

impl Decoder for LeadChunkDecoder {
    type Item = LeadChunk;
    type Error = QuasiHttpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LEAD_CHUNK_PREFIX_LEN {
            return Ok(None);
        }

        let declared = u16::from_be_bytes([src[0], src[1]]) as usize;
        ensure!(declared > 0, QuasiHttpError::malformed_envelope("lead chunk declares an empty envelope"));
        ensure!(declared <= self.max_size, QuasiHttpError::chunk_size_exceeded(declared, self.max_size));

        let frame_len = LEAD_CHUNK_PREFIX_LEN + declared;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(LEAD_CHUNK_PREFIX_LEN);
        let envelope = src.split_to(declared);
        let lead_chunk = deserialize_envelope(&envelope)?;
        trace!(envelope_len = declared, has_content = lead_chunk.has_content(), "decoded lead chunk");
        Ok(Some(lead_chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::header::LeadChunkEncoder;
    use crate::protocol::PayloadSize;
    use tokio_util::codec::Encoder;

    fn encoded(lead_chunk: LeadChunk) -> BytesMut {
        let mut dst = BytesMut::new();
        LeadChunkEncoder::default().encode(lead_chunk, &mut dst).unwrap();
        dst
    }

    #[test]
    fn decodes_and_keeps_trailing_bytes() {
        let mut lead_chunk = LeadChunk { status_code: 200, ..LeadChunk::new() };
        lead_chunk.set_payload_size(PayloadSize::Length(3));

        let mut src = encoded(lead_chunk.clone());
        src.extend_from_slice(b"rest");

        let decoded = LeadChunkDecoder::default().decode(&mut src).unwrap().unwrap();
        assert_eq!(decoded, lead_chunk);
        assert_eq!(&src[..], b"rest");
    }

    #[test]
    fn waits_for_the_whole_envelope() {
        let full = encoded(LeadChunk { method: Some("PUT".into()), ..LeadChunk::new() });
        let mut decoder = LeadChunkDecoder::default();

        let mut src = BytesMut::from(&full[..1]);
        assert!(decoder.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(&full[1..5]);
        assert!(decoder.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(&full[5..]);
        let decoded = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(decoded.method.as_deref(), Some("PUT"));
        assert!(src.is_empty());
    }

    #[test]
    fn rejects_oversized_prefix_before_buffering() {
        let mut src = BytesMut::from(&[0x01, 0x00][..]);
        let result = LeadChunkDecoder::new(128).decode(&mut src);
        assert!(matches!(result, Err(QuasiHttpError::ChunkSizeExceeded { declared: 256, limit: 128 })));
    }

    #[test]
    fn rejects_empty_envelope() {
        let mut src = BytesMut::from(&[0x00, 0x00][..]);
        let result = LeadChunkDecoder::default().decode(&mut src);
        assert!(matches!(result, Err(QuasiHttpError::MalformedEnvelope { .. })));
    }
}
