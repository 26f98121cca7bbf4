//! Wire codecs of the quasi-http protocol
//!
//! This module turns the protocol types into bytes and back. Every codec implements
//! the `tokio_util::codec` [`Encoder`](tokio_util::codec::Encoder) and
//! [`Decoder`](tokio_util::codec::Decoder) traits, so they compose with `BytesMut`
//! buffers the same way on every transport.
//!
//! # Architecture
//!
//! - Byte-oriented transports:
//!   - [`LeadChunkEncoder`] / [`LeadChunkDecoder`]: the length-prefixed CSV envelope
//!     opening every request and response
//!   - [`ChunkEncoder`] / [`ChunkDecoder`]: the subsequent chunks carrying a body
//!   - [`ExchangeEncoder`]: a lead chunk followed by its body
//!
//! - Message-oriented transports:
//!   - [`PduCodec`]: one [`TransferPdu`] per transport message
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use quasi_http::codec::{LeadChunkDecoder, LeadChunkEncoder};
//! use quasi_http::protocol::LeadChunk;
//! use tokio_util::codec::{Decoder, Encoder};
//!
//! let lead_chunk = LeadChunk { method: Some("GET".into()), request_target: Some("/".into()), ..LeadChunk::new() };
//!
//! let mut buffer = BytesMut::new();
//! LeadChunkEncoder::default().encode(lead_chunk.clone(), &mut buffer).unwrap();
//!
//! let decoded = LeadChunkDecoder::default().decode(&mut buffer).unwrap();
//! assert_eq!(decoded, Some(lead_chunk));
//! ```

mod body;
mod exchange_encoder;
mod header;
mod pdu;

pub use body::{BODY_CHUNK_HEADER_LEN, ChunkDecoder, ChunkEncoder};
pub use exchange_encoder::ExchangeEncoder;
pub use header::{LEAD_CHUNK_PREFIX_LEN, LeadChunkDecoder, LeadChunkEncoder};
pub use pdu::{BodyDirection, PDU_HEADER_LEN, PduCodec, PduType, TransferPdu};
