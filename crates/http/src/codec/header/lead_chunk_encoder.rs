//! Encoder writing a [`LeadChunk`] as a length-prefixed envelope.
//!
//! The wire form is a 2-byte big-endian length followed by the CSV envelope produced
//! by [`serialize_envelope`](super::envelope::serialize_envelope).

use bytes::{BufMut, BytesMut};
use tokio_util::codec::Encoder;
use tracing::{error, trace};

use crate::codec::header::envelope::serialize_envelope;
use crate::protocol::{LeadChunk, MAX_LEAD_CHUNK_SIZE, QuasiHttpError};

/// Size of the length prefix ahead of the envelope.
pub const LEAD_CHUNK_PREFIX_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadChunkEncoder {
    max_size: usize,
}

impl LeadChunkEncoder {
    /// Creates an encoder refusing envelopes above `max_size` bytes.
    ///
    /// The limit is capped by what the 2-byte prefix can express.
    pub fn new(max_size: usize) -> Self {
        Self { max_size: max_size.min(MAX_LEAD_CHUNK_SIZE) }
    }
}

impl Default for LeadChunkEncoder {
    fn default() -> Self {
        Self::new(MAX_LEAD_CHUNK_SIZE)
    }
}

impl Encoder<LeadChunk> for LeadChunkEncoder {
    type Error = QuasiHttpError;

    fn encode(&mut self, item: LeadChunk, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let envelope = serialize_envelope(&item)?;
        if envelope.len() > self.max_size {
            error!(envelope_len = envelope.len(), limit = self.max_size, "lead chunk too large");
            return Err(QuasiHttpError::chunk_size_exceeded(envelope.len(), self.max_size));
        }

        dst.reserve(LEAD_CHUNK_PREFIX_LEN + envelope.len());
        // checked against the prefix capacity above
        dst.put_u16(envelope.len() as u16);
        dst.put_slice(&envelope);
        trace!(envelope_len = envelope.len(), "encoded lead chunk");
        Ok(())
    }
}
