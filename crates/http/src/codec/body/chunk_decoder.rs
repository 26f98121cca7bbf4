//! Decoder for subsequent chunks.
//!
//! The declared length of every chunk is validated as soon as its 3-byte prefix is
//! available, before any of its data is buffered:
//!
//! - above the chunk size limit fails with [`QuasiHttpError::ChunkSizeExceeded`]
//! - above the remaining content-length budget, or an end of body before the budget
//!   is used up, fails with [`QuasiHttpError::ContentLengthViolation`]

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{LEAD_CHUNK_VERSION, PayloadItem, PayloadSize, QuasiHttpError};

const LENGTH_PREFIX_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDecoder {
    chunk_size_limit: usize,
    remaining: Option<u64>,
    finished: bool,
}

impl ChunkDecoder {
    pub fn new(chunk_size_limit: usize, payload_size: PayloadSize) -> Self {
        let remaining = match payload_size {
            PayloadSize::Length(length) => Some(length),
            PayloadSize::Unknown => None,
            PayloadSize::Empty => Some(0),
        };
        Self { chunk_size_limit, remaining, finished: false }
    }

    pub fn is_finish(&self) -> bool {
        self.finished
    }
}

impl Decoder for ChunkDecoder {
    type Item = PayloadItem;
    type Error = QuasiHttpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.finished {
            return Ok(Some(PayloadItem::Eof));
        }

        if src.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        let declared = u32::from_be_bytes([0, src[0], src[1], src[2]]) as usize;
        ensure!(declared > 0, QuasiHttpError::malformed_envelope("body chunk declares no version byte"));

        let size = declared - 1;
        ensure!(size <= self.chunk_size_limit, QuasiHttpError::chunk_size_exceeded(size, self.chunk_size_limit));
        if let Some(remaining) = self.remaining {
            ensure!(
                size as u64 <= remaining,
                QuasiHttpError::content_length_violation(format!("chunk of {size} bytes with only {remaining} left"))
            );
            ensure!(
                size > 0 || remaining == 0,
                QuasiHttpError::content_length_violation(format!("body ended with {remaining} bytes missing"))
            );
        }

        let frame_len = LENGTH_PREFIX_LEN + declared;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_LEN);
        let version = src.get_u8();
        ensure!(
            version == LEAD_CHUNK_VERSION,
            QuasiHttpError::malformed_envelope(format!("unsupported body chunk version {version}"))
        );

        if size == 0 {
            trace!("finished reading body chunks");
            self.finished = true;
            return Ok(Some(PayloadItem::Eof));
        }

        if let Some(remaining) = &mut self.remaining {
            *remaining -= size as u64;
        }
        trace!(size, "decoded body chunk");
        Ok(Some(PayloadItem::Chunk(src.split_to(size).freeze())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn decodes_chunks_until_eof() {
        let mut src = BytesMut::from(&b"\x00\x00\x06\x01hello\x00\x00\x03\x01!!\x00\x00\x01\x01tail"[..]);
        let mut decoder = ChunkDecoder::new(8192, PayloadSize::Unknown);

        let chunk = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::from_static(b"hello"));

        let chunk = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::from_static(b"!!"));

        assert!(decoder.decode(&mut src).unwrap().unwrap().is_eof());
        assert!(decoder.is_finish());
        assert_eq!(&src[..], b"tail");
    }

    #[test]
    fn waits_for_complete_chunk() {
        let mut decoder = ChunkDecoder::new(8192, PayloadSize::Unknown);
        let mut src = BytesMut::from(&b"\x00\x00"[..]);
        assert!(decoder.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(b"\x04\x01ab");
        assert!(decoder.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(b"c");
        let chunk = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::from_static(b"abc"));
    }

    #[test]
    fn rejects_oversized_chunk_from_prefix() {
        let mut decoder = ChunkDecoder::new(8192, PayloadSize::Unknown);
        let mut src = BytesMut::from(&b"\x00\x20\x02"[..]);
        let result = decoder.decode(&mut src);
        assert!(matches!(result, Err(QuasiHttpError::ChunkSizeExceeded { declared: 8193, limit: 8192 })));
    }

    #[test]
    fn enforces_content_length_budget() {
        let mut decoder = ChunkDecoder::new(8192, PayloadSize::Length(3));
        let mut src = BytesMut::from(&b"\x00\x00\x05"[..]);
        let result = decoder.decode(&mut src);
        assert!(matches!(result, Err(QuasiHttpError::ContentLengthViolation { .. })));

        let mut decoder = ChunkDecoder::new(8192, PayloadSize::Length(3));
        let mut src = BytesMut::from(&b"\x00\x00\x03\x01ab\x00\x00\x01\x01"[..]);
        assert!(decoder.decode(&mut src).unwrap().unwrap().is_chunk());
        let result = decoder.decode(&mut src);
        assert!(matches!(result, Err(QuasiHttpError::ContentLengthViolation { .. })));
    }

    #[test]
    fn rejects_bad_framing() {
        let mut decoder = ChunkDecoder::new(8192, PayloadSize::Unknown);
        let mut src = BytesMut::from(&b"\x00\x00\x00"[..]);
        assert!(matches!(decoder.decode(&mut src), Err(QuasiHttpError::MalformedEnvelope { .. })));

        let mut decoder = ChunkDecoder::new(8192, PayloadSize::Unknown);
        let mut src = BytesMut::from(&b"\x00\x00\x02\x07a"[..]);
        assert!(matches!(decoder.decode(&mut src), Err(QuasiHttpError::MalformedEnvelope { .. })));
    }
}
