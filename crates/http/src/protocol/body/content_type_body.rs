use async_trait::async_trait;

use crate::protocol::QuasiHttpError;
use crate::protocol::body::QuasiBody;

/// Overrides the content type reported by another body.
#[derive(Debug)]
pub struct ContentTypeBody<B> {
    inner: B,
    content_type: Option<String>,
}

impl<B: QuasiBody> ContentTypeBody<B> {
    /// `None` hides the inner content type.
    pub fn new(inner: B, content_type: Option<String>) -> Self {
        Self { inner, content_type }
    }
}

#[async_trait]
impl<B: QuasiBody> QuasiBody for ContentTypeBody<B> {
    fn content_length(&self) -> i64 {
        self.inner.content_length()
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    async fn read_bytes(&self, buf: &mut [u8]) -> Result<usize, QuasiHttpError> {
        self.inner.read_bytes(buf).await
    }

    async fn end_read(&self, error: Option<QuasiHttpError>) {
        self.inner.end_read(error).await
    }
}
