//! Encoder for subsequent chunks, the body framing that follows a lead chunk.
//!
//! Each chunk is written as:
//!
//! ```text
//! [3-byte big-endian length][version byte][data]
//! ```
//!
//! The length counts the version byte, so a chunk of length 1 carries no data and
//! marks the end of the body. Data longer than the maximum chunk size is split over
//! several chunks, and empty data writes are skipped.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;
use tracing::{trace, warn};

use crate::ensure;
use crate::protocol::{LEAD_CHUNK_VERSION, MAX_BODY_CHUNK_SIZE, PayloadItem, PayloadSize, QuasiHttpError};

/// Bytes in front of every chunk's data: the 3-byte length and the version byte.
pub const BODY_CHUNK_HEADER_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkEncoder {
    max_chunk_size: usize,
    remaining: Option<u64>,
    eof: bool,
}

impl ChunkEncoder {
    /// Creates an encoder for a body of the given size.
    ///
    /// A known length is enforced: writing more data, or ending the body early,
    /// fails with [`QuasiHttpError::ContentLengthViolation`].
    pub fn new(max_chunk_size: usize, payload_size: PayloadSize) -> Self {
        let remaining = match payload_size {
            PayloadSize::Length(length) => Some(length),
            PayloadSize::Unknown => None,
            PayloadSize::Empty => Some(0),
        };
        Self { max_chunk_size: max_chunk_size.clamp(1, MAX_BODY_CHUNK_SIZE), remaining, eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkEncoder {
    type Error = QuasiHttpError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            warn!("encode payload_item but the body already ended");
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(mut data) => {
                let len = data.remaining();
                if len == 0 {
                    return Ok(());
                }

                if let Some(remaining) = self.remaining {
                    ensure!(
                        len as u64 <= remaining,
                        QuasiHttpError::content_length_violation(format!("{len} bytes written with only {remaining} left"))
                    );
                    self.remaining = Some(remaining - len as u64);
                }

                while data.has_remaining() {
                    let size = data.remaining().min(self.max_chunk_size);
                    dst.reserve(BODY_CHUNK_HEADER_LEN + size);
                    dst.put_uint((size + 1) as u64, 3);
                    dst.put_u8(LEAD_CHUNK_VERSION);
                    dst.put((&mut data).take(size));
                    trace!(size, "encoded body chunk");
                }
                Ok(())
            }
            PayloadItem::Eof => {
                if let Some(remaining) = self.remaining {
                    ensure!(
                        remaining == 0,
                        QuasiHttpError::content_length_violation(format!("body ended with {remaining} bytes missing"))
                    );
                }
                self.eof = true;
                dst.reserve(BODY_CHUNK_HEADER_LEN);
                dst.put_uint(1, 3);
                dst.put_u8(LEAD_CHUNK_VERSION);
                trace!("encoded end of body chunk");
                Ok(())
            }
        }
    }
}
