use std::fmt;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::protocol::QuasiHttpError;
use crate::protocol::body::QuasiBody;

pub type EndOfReadCallback = Box<dyn FnOnce(Option<QuasiHttpError>) -> BoxFuture<'static, ()> + Send>;

/// Runs a callback once the wrapped body is ended.
///
/// The client uses this to keep a connection open while a response body streams
/// from it, releasing the connection only when the consumer ends the body.
pub struct EndOfReadBody<B> {
    inner: B,
    callback: Mutex<Option<EndOfReadCallback>>,
}

impl<B: QuasiBody> EndOfReadBody<B> {
    pub fn new<F, Fut>(inner: B, callback: F) -> Self
    where
        F: FnOnce(Option<QuasiHttpError>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: EndOfReadCallback = Box::new(move |error| callback(error).boxed());
        Self { inner, callback: Mutex::new(Some(callback)) }
    }
}

impl<B: fmt::Debug> fmt::Debug for EndOfReadBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.callback.lock().map(|callback| callback.is_some()).unwrap_or(false);
        f.debug_struct("EndOfReadBody").field("inner", &self.inner).field("callback_pending", &pending).finish()
    }
}

#[async_trait]
impl<B: QuasiBody> QuasiBody for EndOfReadBody<B> {
    fn content_length(&self) -> i64 {
        self.inner.content_length()
    }

    fn content_type(&self) -> Option<&str> {
        self.inner.content_type()
    }

    async fn read_bytes(&self, buf: &mut [u8]) -> Result<usize, QuasiHttpError> {
        self.inner.read_bytes(buf).await
    }

    async fn end_read(&self, error: Option<QuasiHttpError>) {
        self.inner.end_read(error.clone()).await;

        let callback = self.callback.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(callback) = callback {
            callback(error).await;
        }
    }
}
