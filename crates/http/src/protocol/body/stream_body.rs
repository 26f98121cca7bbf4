use std::fmt;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tracing::trace;

use crate::protocol::QuasiHttpError;
use crate::protocol::body::{BodyGate, QuasiBody};

/// A body reading from an [`AsyncRead`] source such as a file or a pipe.
///
/// The reader is dropped, and so released, by the first `end_read`.
pub struct StreamBody<R> {
    gate: BodyGate,
    content_length: i64,
    content_type: Option<String>,
    reader: Mutex<Option<R>>,
}

impl<R> StreamBody<R>
where
    R: AsyncRead + Send + Unpin,
{
    /// Creates a body of unknown length.
    pub fn new(reader: R) -> Self {
        Self { gate: BodyGate::new(), content_length: -1, content_type: None, reader: Mutex::new(Some(reader)) }
    }

    /// Declares the content length; pair with [`ContentLengthBody`](super::ContentLengthBody) to enforce it.
    pub fn with_content_length(mut self, content_length: i64) -> Self {
        self.content_length = content_length;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

impl<R> fmt::Debug for StreamBody<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBody")
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .field("gate", &self.gate)
            .finish()
    }
}

#[async_trait]
impl<R> QuasiBody for StreamBody<R>
where
    R: AsyncRead + Send + Unpin,
{
    fn content_length(&self) -> i64 {
        self.content_length
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    async fn read_bytes(&self, buf: &mut [u8]) -> Result<usize, QuasiHttpError> {
        self.gate
            .read(async {
                let mut reader = self.reader.lock().await;
                match reader.as_mut() {
                    Some(reader) => Ok(reader.read(buf).await?),
                    None => Ok(0),
                }
            })
            .await
    }

    async fn end_read(&self, error: Option<QuasiHttpError>) {
        if self.gate.end(error) {
            trace!("release stream body reader");
            self.reader.lock().await.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::body::read_all_bytes;

    #[tokio::test]
    async fn reads_from_async_read() {
        let body = StreamBody::new(&b"streamed bytes"[..]).with_content_type("application/octet-stream");
        assert_eq!(body.content_length(), -1);
        assert_eq!(body.content_type(), Some("application/octet-stream"));

        let bytes = read_all_bytes(&body, None).await.unwrap();
        assert_eq!(&bytes[..], b"streamed bytes");
    }

    #[tokio::test]
    async fn end_read_releases_reader() {
        let (reader, mut writer) = tokio::io::duplex(64);
        let body = StreamBody::new(reader);
        body.end_read(None).await;

        // the reading half is gone, so writes to the peer fail
        let result = tokio::io::AsyncWriteExt::write_all(&mut writer, b"late").await;
        assert!(result.is_err());

        let mut buf = [0u8; 4];
        assert_eq!(body.read_bytes(&mut buf).await.unwrap(), 0);
    }
}
