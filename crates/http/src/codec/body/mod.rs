//! Subsequent chunk framing for request and response bodies.
//!
//! # Components
//!
//! - [`ChunkEncoder`]: splits payload items into length-prefixed chunks
//! - [`ChunkDecoder`]: reads them back, validating sizes before buffering
//!
//! Both enforce a declared content length when the body has one.

mod chunk_decoder;
mod chunk_encoder;

pub use chunk_decoder::ChunkDecoder;
pub use chunk_encoder::{BODY_CHUNK_HEADER_LEN, ChunkEncoder};
