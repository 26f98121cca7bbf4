use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::ensure;
use crate::protocol::QuasiHttpError;
use crate::protocol::body::{BodyGate, QuasiBody};

/// Enforces a declared content length on top of another body.
///
/// Reads never go past the declared length; once it is reached, reads return `0`
/// without touching the inner body. An inner end of stream before the declared
/// length is a [`QuasiHttpError::ContentLengthViolation`].
#[derive(Debug)]
pub struct ContentLengthBody<B> {
    inner: B,
    gate: BodyGate,
    content_length: u64,
    remaining: AtomicU64,
}

impl<B: QuasiBody> ContentLengthBody<B> {
    pub fn new(inner: B, content_length: u64) -> Self {
        Self { inner, gate: BodyGate::new(), content_length, remaining: AtomicU64::new(content_length) }
    }

    pub fn into_inner(self) -> B {
        self.inner
    }
}

#[async_trait]
impl<B: QuasiBody> QuasiBody for ContentLengthBody<B> {
    fn content_length(&self) -> i64 {
        i64::try_from(self.content_length).unwrap_or(i64::MAX)
    }

    fn content_type(&self) -> Option<&str> {
        self.inner.content_type()
    }

    async fn read_bytes(&self, buf: &mut [u8]) -> Result<usize, QuasiHttpError> {
        self.gate
            .read(async {
                let remaining = self.remaining.load(Ordering::Acquire);
                if remaining == 0 || buf.is_empty() {
                    return Ok(0);
                }

                let len = usize::try_from(remaining).map_or(buf.len(), |remaining| remaining.min(buf.len()));
                let read = self.inner.read_bytes(&mut buf[..len]).await?;
                ensure!(
                    read > 0,
                    QuasiHttpError::content_length_violation(format!(
                        "body ended after {} of {} bytes",
                        self.content_length - remaining,
                        self.content_length
                    ))
                );

                self.remaining.fetch_sub(read as u64, Ordering::AcqRel);
                Ok(read)
            })
            .await
    }

    async fn end_read(&self, error: Option<QuasiHttpError>) {
        if self.gate.end(error.clone()) {
            self.inner.end_read(error).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::body::{BytesBody, read_all_bytes};

    #[tokio::test]
    async fn short_body_is_a_violation() {
        let body = ContentLengthBody::new(BytesBody::from("abc"), 5);
        let result = read_all_bytes(&body, None).await;
        assert!(matches!(result, Err(QuasiHttpError::ContentLengthViolation { .. })));
    }

    #[tokio::test]
    async fn exact_length_then_zero() {
        let body = ContentLengthBody::new(BytesBody::from("abcdef"), 4);
        let mut buf = [0u8; 16];

        assert_eq!(body.read_bytes(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf[..4], b"abcd");
        assert_eq!(body.read_bytes(&mut buf).await.unwrap(), 0);
        assert_eq!(body.read_bytes(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn end_read_reaches_inner_once() {
        let body = ContentLengthBody::new(BytesBody::from("abcdef"), 6);
        body.end_read(Some(QuasiHttpError::Cancelled)).await;
        body.end_read(None).await;

        let mut buf = [0u8; 4];
        assert!(matches!(body.read_bytes(&mut buf).await, Err(QuasiHttpError::Cancelled)));
        assert!(matches!(body.into_inner().read_bytes(&mut buf).await, Err(QuasiHttpError::Cancelled)));
    }
}
