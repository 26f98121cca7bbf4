//! Body abstraction for requests and responses.
//!
//! A body is a lazy, pull-based byte source described by [`QuasiBody`]. Bodies are
//! shared through [`SharedBody`] between the engine and the consumer, so the engine
//! can end a body the consumer is blocked on when an exchange times out or is cancelled.
//!
//! # Components
//!
//! Sources:
//! - [`BytesBody`]: in-memory bytes
//! - [`StreamBody`]: any `tokio::io::AsyncRead`, released on end of read
//!
//! Decorators, applying the same contract on top of another body:
//! - [`ContentLengthBody`]: enforces a declared content length
//! - [`ContentTypeBody`]: overrides the content type
//! - [`ChunkEncodingBody`] / [`ChunkDecodingBody`]: subsequent-chunk framing
//! - [`EndOfReadBody`]: runs a completion callback once the body ends
//! - [`DeadlineBody`]: applies the exchange timeout and cancellation to every read
//!
//! All state-carrying bodies delegate the contract rules to [`BodyGate`].

mod body_gate;
mod bytes_body;
mod chunk_body;
mod content_length_body;
mod content_type_body;
mod deadline_body;
mod end_of_read_body;
mod stream_body;

pub use body_gate::BodyGate;
pub use bytes_body::BytesBody;
pub use chunk_body::{ChunkDecodingBody, ChunkEncodingBody};
pub use content_length_body::ContentLengthBody;
pub use content_type_body::ContentTypeBody;
pub use deadline_body::DeadlineBody;
pub use end_of_read_body::{EndOfReadBody, EndOfReadCallback};
pub use stream_body::StreamBody;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::ensure;
use crate::protocol::QuasiHttpError;

/// Size of the scratch buffer used when draining a body.
pub(crate) const READ_BUFFER_SIZE: usize = 8 * 1024;

/// A lazy byte source with content metadata and an idempotent end-of-read.
#[async_trait]
pub trait QuasiBody: Send + Sync + fmt::Debug {
    /// Number of bytes the body will produce, `-1` when unknown.
    fn content_length(&self) -> i64;

    fn content_type(&self) -> Option<&str> {
        None
    }

    /// Reads up to `buf.len()` bytes. `Ok(0)` means the end of the body was reached.
    ///
    /// # Errors
    ///
    /// - [`QuasiHttpError::PendingReadExists`] if another read is in flight
    /// - the terminal error if the body was ended with one
    /// - any error of the underlying source
    async fn read_bytes(&self, buf: &mut [u8]) -> Result<usize, QuasiHttpError>;

    /// Ends the body, releasing its resources. Only the first call has an effect;
    /// `None` is a normal end, `Some(error)` makes pending and later reads fail with it.
    async fn end_read(&self, error: Option<QuasiHttpError>);
}

/// A body shared between the engine and its consumer.
pub type SharedBody = Arc<dyn QuasiBody>;

#[async_trait]
impl<B: QuasiBody + ?Sized> QuasiBody for Arc<B> {
    fn content_length(&self) -> i64 {
        (**self).content_length()
    }

    fn content_type(&self) -> Option<&str> {
        (**self).content_type()
    }

    async fn read_bytes(&self, buf: &mut [u8]) -> Result<usize, QuasiHttpError> {
        (**self).read_bytes(buf).await
    }

    async fn end_read(&self, error: Option<QuasiHttpError>) {
        (**self).end_read(error).await
    }
}

/// Reads the body to its end into memory.
///
/// The body is not ended; the caller decides when to release it.
///
/// # Errors
///
/// Fails with [`QuasiHttpError::BufferingLimitExceeded`] as soon as the declared
/// content length or the bytes read exceed `limit`.
pub async fn read_all_bytes<B>(body: &B, limit: Option<usize>) -> Result<Bytes, QuasiHttpError>
where
    B: QuasiBody + ?Sized,
{
    let content_length = body.content_length();
    if let (Some(limit), Ok(declared)) = (limit, usize::try_from(content_length)) {
        ensure!(declared <= limit, QuasiHttpError::BufferingLimitExceeded { limit });
    }

    let mut data = BytesMut::with_capacity(usize::try_from(content_length).unwrap_or(0).min(READ_BUFFER_SIZE));
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = body.read_bytes(&mut buf).await?;
        if read == 0 {
            return Ok(data.freeze());
        }
        if let Some(limit) = limit {
            ensure!(data.len() + read <= limit, QuasiHttpError::BufferingLimitExceeded { limit });
        }
        data.extend_from_slice(&buf[..read]);
    }
}

/// Copies the body to its end into `writer`, returning the number of bytes copied.
///
/// Like [`read_all_bytes`], the body is not ended.
pub async fn transfer_body<B, W>(body: &B, writer: &mut W) -> Result<u64, QuasiHttpError>
where
    B: QuasiBody + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut transferred = 0u64;
    loop {
        let read = body.read_bytes(&mut buf).await?;
        if read == 0 {
            writer.flush().await?;
            return Ok(transferred);
        }
        writer.write_all(&buf[..read]).await?;
        transferred += read as u64;
    }
}

/// Reads until `buf` is full or the body ends, returning the number of bytes read.
pub(crate) async fn read_up_to<B>(body: &B, buf: &mut [u8]) -> Result<usize, QuasiHttpError>
where
    B: QuasiBody + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let read = body.read_bytes(&mut buf[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}
