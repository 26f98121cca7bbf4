//! The application contract: what the server hands each request to.
//!
//! Implement [`QuasiApplication`] directly, or adapt an async closure with
//! [`make_application`]:
//!
//! ```
//! use quasi_http::handler::make_application;
//! use quasi_http::protocol::{QuasiRequest, QuasiResponse};
//! use std::convert::Infallible;
//!
//! let application = make_application(|request: QuasiRequest| async move {
//!     let response = QuasiResponse::with_status_code(200).with_status_message(request.target().to_string());
//!     Ok::<_, Infallible>(Some(response))
//! });
//! # let _ = application;
//! ```

use std::error::Error;
use std::future::Future;

use async_trait::async_trait;

use crate::protocol::{QuasiHttpError, QuasiRequest, QuasiResponse, TransferPhase};

#[async_trait]
pub trait QuasiApplication: Send + Sync + 'static {
    /// Produces the response to `request`.
    ///
    /// Returning `Ok(None)` fails the exchange with [`QuasiHttpError::NoResponseProduced`].
    async fn process_request(&self, request: QuasiRequest) -> Result<Option<QuasiResponse>, QuasiHttpError>;
}

#[derive(Debug)]
pub struct ApplicationFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut, Err> QuasiApplication for ApplicationFn<F>
where
    F: Fn(QuasiRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<QuasiResponse>, Err>> + Send,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    async fn process_request(&self, request: QuasiRequest) -> Result<Option<QuasiResponse>, QuasiHttpError> {
        (self.f)(request).await.map_err(|e| into_quasi_error(e.into()))
    }
}

pub fn make_application<F, Fut, Err>(f: F) -> ApplicationFn<F>
where
    F: Fn(QuasiRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<QuasiResponse>, Err>> + Send,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    ApplicationFn { f }
}

fn into_quasi_error(e: Box<dyn Error + Send + Sync>) -> QuasiHttpError {
    match e.downcast::<QuasiHttpError>() {
        Ok(e) => *e,
        Err(e) => QuasiHttpError::application(e),
    }
}

/// Runs the application, turning a missing response into an error.
pub(crate) async fn invoke_application<A>(application: &A, request: QuasiRequest) -> Result<QuasiResponse, QuasiHttpError>
where
    A: QuasiApplication + ?Sized,
{
    match application.process_request(request).await {
        Ok(Some(response)) => Ok(response),
        Ok(None) => Err(QuasiHttpError::NoResponseProduced),
        Err(e) => Err(e.in_phase(TransferPhase::Application)),
    }
}
