//! Core quasi-http protocol abstractions.
//!
//! This module provides the data model shared by the codecs, the transfer protocols
//! and the application.
//!
//! # Architecture
//!
//! - **Messages** ([`message`]): [`Message`], [`PayloadItem`] and [`PayloadSize`], the
//!   items flowing through the codecs
//! - **Lead chunk** ([`lead_chunk`]): the envelope opening every request and response
//! - **Requests and responses**: [`QuasiRequest`] and [`QuasiResponse`]
//! - **Bodies** ([`body`]): the [`QuasiBody`](body::QuasiBody) contract and its decorators
//! - **Options** ([`options`]): [`ProcessingOptions`] and the protocol limits
//! - **Errors** ([`error`]): [`QuasiHttpError`] and its classification

pub mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

pub mod lead_chunk;
pub use lead_chunk::{FLAG_HAS_CONTENT, LEAD_CHUNK_VERSION, LeadChunk};

mod request;
pub use request::QuasiRequest;

mod response;
pub use response::QuasiResponse;

pub mod options;
pub use options::{
    DEFAULT_MAX_CHUNK_SIZE, DEFAULT_RESPONSE_BODY_BUFFERING_SIZE_LIMIT, MAX_BODY_CHUNK_SIZE, MAX_LEAD_CHUNK_SIZE,
    ProcessingOptions,
};

pub mod error;
pub use error::QuasiHttpError;
pub use error::ReasonCode;
pub use error::TransferPhase;

pub mod body;
