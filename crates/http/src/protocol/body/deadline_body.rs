use std::sync::Arc;

use async_trait::async_trait;

use crate::cancellation::ExchangeCoordinator;
use crate::protocol::QuasiHttpError;
use crate::protocol::body::QuasiBody;

/// Applies an exchange's deadline and cancellation to every read of a body.
///
/// Used for response bodies streamed to the caller: when the exchange times out or is
/// cancelled while the consumer reads, the wrapped body is ended with that error, so the
/// pending read and every later read fail right away.
#[derive(Debug)]
pub struct DeadlineBody<B> {
    inner: B,
    coordinator: Arc<ExchangeCoordinator>,
}

impl<B: QuasiBody> DeadlineBody<B> {
    pub fn new(inner: B, coordinator: Arc<ExchangeCoordinator>) -> Self {
        Self { inner, coordinator }
    }
}

#[async_trait]
impl<B: QuasiBody> QuasiBody for DeadlineBody<B> {
    fn content_length(&self) -> i64 {
        self.inner.content_length()
    }

    fn content_type(&self) -> Option<&str> {
        self.inner.content_type()
    }

    async fn read_bytes(&self, buf: &mut [u8]) -> Result<usize, QuasiHttpError> {
        match self.coordinator.run(self.inner.read_bytes(buf)).await {
            Err(e @ (QuasiHttpError::Timeout | QuasiHttpError::Cancelled)) => {
                self.inner.end_read(Some(e.clone())).await;
                Err(e)
            }
            result => result,
        }
    }

    async fn end_read(&self, error: Option<QuasiHttpError>) {
        self.inner.end_read(error).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ProcessingOptions;
    use crate::protocol::body::{BytesBody, StreamBody};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test(start_paused = true)]
    async fn timeout_ends_inner_body() {
        let options = ProcessingOptions::new().with_timeout_millis(20);
        let coordinator = Arc::new(ExchangeCoordinator::new(&options, CancellationToken::new()));

        // the writer is kept alive, so reads block until the deadline
        let (reader, _writer) = tokio::io::duplex(16);
        let body = DeadlineBody::new(Arc::new(StreamBody::new(reader)), coordinator);

        let mut buf = [0u8; 4];
        assert!(matches!(body.read_bytes(&mut buf).await, Err(QuasiHttpError::Timeout)));
        assert!(matches!(body.inner.read_bytes(&mut buf).await, Err(QuasiHttpError::Timeout)));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(matches!(body.read_bytes(&mut buf).await, Err(QuasiHttpError::Timeout)));
    }

    #[tokio::test]
    async fn cancellation_fails_next_read() {
        let token = CancellationToken::new();
        let coordinator = Arc::new(ExchangeCoordinator::new(&ProcessingOptions::new(), token.clone()));
        let body = DeadlineBody::new(BytesBody::from("abcdef"), coordinator);

        let mut buf = [0u8; 2];
        assert_eq!(body.read_bytes(&mut buf).await.unwrap(), 2);

        token.cancel();
        assert!(matches!(body.read_bytes(&mut buf).await, Err(QuasiHttpError::Cancelled)));
        assert!(matches!(body.inner.read_bytes(&mut buf).await, Err(QuasiHttpError::Cancelled)));
    }
}
