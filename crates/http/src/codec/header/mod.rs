//! Lead chunk processing: the envelope opening every request and response.
//!
//! # Components
//!
//! - [`LeadChunkEncoder`]: writes a [`LeadChunk`](crate::protocol::LeadChunk) with its 2-byte length prefix
//! - [`LeadChunkDecoder`]: reads it back, enforcing the size limit before buffering
//!
//! The envelope itself is a small CSV document, see [`envelope`].

mod csv;
pub(crate) mod envelope;
mod lead_chunk_decoder;
mod lead_chunk_encoder;

pub use lead_chunk_decoder::LeadChunkDecoder;
pub use lead_chunk_encoder::{LEAD_CHUNK_PREFIX_LEN, LeadChunkEncoder};
