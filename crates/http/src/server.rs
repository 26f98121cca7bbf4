//! Receive side driver: runs one exchange per accepted connection.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::cancellation::ExchangeCoordinator;
use crate::connection::{ConnectionLease, ExchangeContext, ExchangeState, MessageExchange, message_receive, stream_receive};
use crate::handler::QuasiApplication;
use crate::protocol::{ProcessingOptions, QuasiHttpError};
use crate::transport::{MessageInbound, MessageTransport, StreamTransport, Transport};

/// Serves requests arriving on accepted connections with a [`QuasiApplication`].
///
/// The server does not accept connections itself; the transport owner hands each
/// accepted connection to [`accept_stream_connection`](Self::accept_stream_connection)
/// or [`accept_message_connection`](Self::accept_message_connection), usually from a
/// task of its own. The whole exchange, application included, runs under the timeout
/// of the default options.
#[derive(Debug)]
pub struct StandardQuasiHttpServer<A> {
    application: Arc<A>,
    default_options: ProcessingOptions,
}

impl<A> Clone for StandardQuasiHttpServer<A> {
    fn clone(&self) -> Self {
        Self { application: self.application.clone(), default_options: self.default_options.clone() }
    }
}

impl<A: QuasiApplication> StandardQuasiHttpServer<A> {
    pub fn new(application: A) -> Self {
        Self::with_shared_application(Arc::new(application))
    }

    pub fn with_shared_application(application: Arc<A>) -> Self {
        Self { application, default_options: ProcessingOptions::default() }
    }

    pub fn with_default_options(mut self, default_options: ProcessingOptions) -> Self {
        self.default_options = default_options;
        self
    }

    pub fn default_options(&self) -> &ProcessingOptions {
        &self.default_options
    }

    pub async fn accept_stream_connection<T: StreamTransport>(&self, transport: Arc<T>, connection: T::Connection) -> Result<(), QuasiHttpError> {
        self.accept_stream_connection_with_cancellation(transport, connection, CancellationToken::new()).await
    }

    /// Processes one exchange on a byte-stream connection, then releases it.
    pub async fn accept_stream_connection_with_cancellation<T: StreamTransport>(
        &self,
        transport: Arc<T>,
        connection: T::Connection,
        cancellation: CancellationToken,
    ) -> Result<(), QuasiHttpError> {
        let options = self.default_options.clone();
        let coordinator = ExchangeCoordinator::new(&options, cancellation);
        let lease = ConnectionLease::new(ExchangeContext::new(transport, Arc::new(connection), options));

        let mut state = ExchangeState::Idle;
        let result = coordinator.run(stream_receive::receive_request(&lease, self.application.as_ref(), &mut state)).await;
        complete(result, &coordinator, &lease, &mut state).await
    }

    pub async fn accept_message_connection<T: MessageTransport>(
        &self,
        transport: Arc<T>,
        connection: T::Connection,
        inbound: MessageInbound,
    ) -> Result<(), QuasiHttpError> {
        self.accept_message_connection_with_cancellation(transport, connection, inbound, CancellationToken::new()).await
    }

    /// Processes one exchange on a message connection whose inbound messages arrive on
    /// `inbound`, then releases it. A Fin is sent to the peer when the exchange aborts.
    pub async fn accept_message_connection_with_cancellation<T: MessageTransport>(
        &self,
        transport: Arc<T>,
        connection: T::Connection,
        inbound: MessageInbound,
        cancellation: CancellationToken,
    ) -> Result<(), QuasiHttpError> {
        let options = self.default_options.clone();
        let coordinator = ExchangeCoordinator::new(&options, cancellation);
        let context = ExchangeContext::new(transport, Arc::new(connection), options);
        let exchange = Arc::new(MessageExchange::new(context.clone(), inbound, coordinator.cancellation().child_token()));
        let lease = ConnectionLease::new(context).with_abort_signal(exchange.clone());

        let mut state = ExchangeState::Idle;
        let result =
            coordinator.run(message_receive::receive_request(&lease, &exchange, self.application.as_ref(), &mut state)).await;
        complete(result, &coordinator, &lease, &mut state).await
    }
}

async fn complete<T: Transport>(
    result: Result<(), QuasiHttpError>,
    coordinator: &ExchangeCoordinator,
    lease: &ConnectionLease<T>,
    state: &mut ExchangeState,
) -> Result<(), QuasiHttpError> {
    match result {
        Ok(()) => {
            lease.release(None).await;
            debug!("exchange completed");
            Ok(())
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
