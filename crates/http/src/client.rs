//! Send side drivers: allocate a connection, run the transfer protocol and hand the
//! response back, buffered or streaming.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::cancellation::ExchangeCoordinator;
use crate::connection::{ConnectionLease, ExchangeContext, ExchangeState, MessageExchange, message_send, stream_send};
use crate::protocol::body::{BytesBody, DeadlineBody, EndOfReadBody, QuasiBody, read_all_bytes};
use crate::protocol::{ProcessingOptions, QuasiHttpError, QuasiRequest, QuasiResponse, TransferPhase};
use crate::transport::{MessageClientTransport, StreamClientTransport, Transport, message_channel};

/// Client for byte-stream transports.
///
/// ```
/// # async fn demo() -> Result<(), quasi_http::protocol::QuasiHttpError> {
/// use std::sync::Arc;
/// use quasi_http::StandardQuasiHttpClient;
/// use quasi_http::protocol::{ProcessingOptions, QuasiRequest};
/// use quasi_http::transport::memory::{MemoryNetwork, MemoryStreamTransport};
///
/// let network = MemoryNetwork::new();
/// let client = StandardQuasiHttpClient::new(Arc::new(MemoryStreamTransport::new(network)))
///     .with_default_options(ProcessingOptions::new().with_timeout_millis(5_000));
///
/// // nothing listens on "server", so no connection can be allocated
/// let result = client.send("server", QuasiRequest::new("GET", "/"), None).await;
/// assert!(matches!(result, Err(quasi_http::protocol::QuasiHttpError::NoConnection { .. })));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct StandardQuasiHttpClient<T> {
    transport: Arc<T>,
    default_options: ProcessingOptions,
}

impl<T> StandardQuasiHttpClient<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport, default_options: ProcessingOptions::default() }
    }

    pub fn with_default_options(mut self, default_options: ProcessingOptions) -> Self {
        self.default_options = default_options;
        self
    }

    pub fn default_options(&self) -> &ProcessingOptions {
        &self.default_options
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }
}

impl<T> Clone for StandardQuasiHttpClient<T> {
    fn clone(&self) -> Self {
        Self { transport: self.transport.clone(), default_options: self.default_options.clone() }
    }
}

impl<T: StreamClientTransport> StandardQuasiHttpClient<T> {
    /// Sends `request` to `remote` and returns the response.
    ///
    /// `options` are merged over the client defaults.
    pub async fn send(
        &self,
        remote: &T::Endpoint,
        request: QuasiRequest,
        options: Option<&ProcessingOptions>,
    ) -> Result<QuasiResponse, QuasiHttpError> {
        self.send_with_cancellation(remote, request, options, CancellationToken::new()).await
    }

    /// Like [`send`](Self::send), aborting the exchange when `cancellation` fires.
    ///
    /// Cancelling after the response was returned only affects a streaming response body.
    pub async fn send_with_cancellation(
        &self,
        remote: &T::Endpoint,
        request: QuasiRequest,
        options: Option<&ProcessingOptions>,
        cancellation: CancellationToken,
    ) -> Result<QuasiResponse, QuasiHttpError> {
        let options = merge_options(options, &self.default_options);
        let coordinator = Arc::new(ExchangeCoordinator::new(&options, cancellation));

        let allocated = coordinator.run(async { self.transport.allocate_connection(remote, &options).await.map_err(QuasiHttpError::from) }).await;
        let connection = connection_or_fail(allocated, &request).await?;

        let context = ExchangeContext::new(self.transport.clone(), Arc::new(connection), options.clone());
        let lease = Arc::new(ConnectionLease::new(context));
        if let Some(body) = request.body() {
            lease.attach_body(body.clone()).await;
        }

        let mut state = ExchangeState::Idle;
        let result = coordinator.run(stream_send::send_request(&lease, &request, &mut state)).await;
        complete(result, &options, &coordinator, lease, &mut state).await
    }
}

/// Client for message-oriented transports.
#[derive(Debug)]
pub struct MessageQuasiHttpClient<T> {
    transport: Arc<T>,
    default_options: ProcessingOptions,
}

impl<T> MessageQuasiHttpClient<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport, default_options: ProcessingOptions::default() }
    }

    pub fn with_default_options(mut self, default_options: ProcessingOptions) -> Self {
        self.default_options = default_options;
        self
    }

    pub fn default_options(&self) -> &ProcessingOptions {
        &self.default_options
    }
}

impl<T> Clone for MessageQuasiHttpClient<T> {
    fn clone(&self) -> Self {
        Self { transport: self.transport.clone(), default_options: self.default_options.clone() }
    }
}

impl<T: MessageClientTransport> MessageQuasiHttpClient<T> {
    pub async fn send(
        &self,
        remote: &T::Endpoint,
        request: QuasiRequest,
        options: Option<&ProcessingOptions>,
    ) -> Result<QuasiResponse, QuasiHttpError> {
        self.send_with_cancellation(remote, request, options, CancellationToken::new()).await
    }

    /// Sends `request` over a fresh message connection to `remote`.
    ///
    /// When the exchange is aborted locally, a Fin is sent to the peer before the
    /// connection is released.
    pub async fn send_with_cancellation(
        &self,
        remote: &T::Endpoint,
        request: QuasiRequest,
        options: Option<&ProcessingOptions>,
        cancellation: CancellationToken,
    ) -> Result<QuasiResponse, QuasiHttpError> {
        let options = merge_options(options, &self.default_options);
        let coordinator = Arc::new(ExchangeCoordinator::new(&options, cancellation));

        let (inbox, inbound) = message_channel();
        let allocated = coordinator
            .run(async { self.transport.allocate_connection(remote, inbox, &options).await.map_err(QuasiHttpError::from) })
            .await;
        let connection = connection_or_fail(allocated, &request).await?;

        let context = ExchangeContext::new(self.transport.clone(), Arc::new(connection), options.clone());
        let exchange = Arc::new(MessageExchange::new(context.clone(), inbound, coordinator.cancellation().child_token()));
        let lease = Arc::new(ConnectionLease::new(context).with_abort_signal(exchange.clone()));
        if let Some(body) = request.body() {
            lease.attach_body(body.clone()).await;
        }

        let mut state = ExchangeState::Idle;
        let result = coordinator.run(message_send::send_request(&lease, &exchange, &request, &mut state)).await;
        complete(result, &options, &coordinator, lease, &mut state).await
    }
}

fn merge_options(options: Option<&ProcessingOptions>, defaults: &ProcessingOptions) -> ProcessingOptions {
    match options {
        Some(options) => options.merge(defaults),
        None => defaults.clone(),
    }
}

async fn connection_or_fail<C>(allocated: Result<Option<C>, QuasiHttpError>, request: &QuasiRequest) -> Result<C, QuasiHttpError> {
    let error = match allocated {
        Ok(Some(connection)) => return Ok(connection),
        Ok(None) => QuasiHttpError::no_connection("transport allocated no connection"),
        Err(e) => e,
    };

    error!(cause = %error, "failed to allocate connection");
    if let Some(body) = request.body() {
        body.end_read(Some(error.clone())).await;
    }
    Err(error)
}

/// Finishes a sent exchange: prepares the response body, or aborts on failure.
async fn complete<T: Transport>(
    result: Result<QuasiResponse, QuasiHttpError>,
    options: &ProcessingOptions,
    coordinator: &Arc<ExchangeCoordinator>,
    lease: Arc<ConnectionLease<T>>,
    state: &mut ExchangeState,
) -> Result<QuasiResponse, QuasiHttpError> {
    let result = match result {
        Ok(response) => finish_response(response, options, coordinator, lease.clone()).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(response) => {
            if !state.is_terminal() && lease.is_released() {
                state.advance(ExchangeState::Completed);
            }
            Ok(response)
        }
        Err(e) => {
            state.advance(ExchangeState::Aborted);
            if coordinator.try_abort() {
                error!(cause = %e, "exchange aborted");
                lease.release(Some(e.clone())).await;
            }
            Err(e)
        }
    }
}

/// Buffers the response body and releases the connection, or wraps the body so the
/// connection is released when the consumer ends it.
async fn finish_response<T: Transport>(
    mut response: QuasiResponse,
    options: &ProcessingOptions,
    coordinator: &Arc<ExchangeCoordinator>,
    lease: Arc<ConnectionLease<T>>,
) -> Result<QuasiResponse, QuasiHttpError> {
    let Some(body) = response.take_body() else {
        lease.release(None).await;
        return Ok(response);
    };

    if options.response_buffering_enabled() {
        let limit = options.response_body_buffering_size_limit();
        let data = coordinator.run(read_all_bytes(&body, Some(limit))).await.map_err(|e| e.in_phase(TransferPhase::BodyTransfer))?;
        debug!(len = data.len(), "response body buffered");

        let mut buffered = BytesBody::new(data);
        if let Some(content_type) = body.content_type() {
            buffered = buffered.with_content_type(content_type);
        }
        lease.release(None).await;
        response.set_body(Some(Arc::new(buffered)));
        return Ok(response);
    }

    let body = EndOfReadBody::new(body, move |error| async move { lease.release(error).await });
    response.set_body(Some(Arc::new(DeadlineBody::new(body, coordinator.clone()))));
    Ok(response)
}
