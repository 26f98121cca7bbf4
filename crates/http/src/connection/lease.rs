use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cancellation::CancellationIndicator;
use crate::connection::ExchangeContext;
use crate::protocol::QuasiHttpError;
use crate::protocol::body::SharedBody;
use crate::transport::Transport;

/// Tells the peer that this side gave up on the exchange.
#[async_trait]
pub(crate) trait AbortSignal: Send + Sync {
    async fn signal_abort(&self);
}

/// Exclusive hold on a connection for the duration of one exchange.
///
/// Bodies exposed from the connection or sent over it are attached to the lease.
/// [`release`](Self::release) ends all of them and then releases the connection,
/// once, whichever of completion, abort or end of a streamed body gets there first.
pub(crate) struct ConnectionLease<T: Transport> {
    context: ExchangeContext<T>,
    released: CancellationIndicator,
    bodies: Mutex<Vec<SharedBody>>,
    abort_signal: Option<Arc<dyn AbortSignal>>,
}

impl<T: Transport> ConnectionLease<T> {
    pub(crate) fn new(context: ExchangeContext<T>) -> Self {
        Self { context, released: CancellationIndicator::new(), bodies: Mutex::new(Vec::new()), abort_signal: None }
    }

    /// Signals the peer before the connection is released with an error.
    pub(crate) fn with_abort_signal(mut self, abort_signal: Arc<dyn AbortSignal>) -> Self {
        self.abort_signal = Some(abort_signal);
        self
    }

    pub(crate) fn context(&self) -> &ExchangeContext<T> {
        &self.context
    }

    /// Ends `body` together with the connection.
    ///
    /// A body attached after the release is ended right away.
    pub(crate) async fn attach_body(&self, body: SharedBody) {
        if !self.released.is_resolved() {
            self.bodies.lock().unwrap_or_else(PoisonError::into_inner).push(body);
            return;
        }
        body.end_read(None).await;
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released.is_resolved()
    }

    /// Ends every attached body with `error` and releases the connection.
    ///
    /// Only the first call acts. Release failures are logged and swallowed so they
    /// never mask the error the exchange ended with.
    pub(crate) async fn release(&self, error: Option<QuasiHttpError>) {
        if !self.released.try_resolve() {
            return;
        }

        let bodies = std::mem::take(&mut *self.bodies.lock().unwrap_or_else(PoisonError::into_inner));
        for body in bodies {
            body.end_read(error.clone()).await;
        }

        if let (Some(e), Some(abort_signal)) = (&error, &self.abort_signal)
            && !matches!(e.root(), QuasiHttpError::PeerAborted)
        {
            abort_signal.signal_abort().await;
        }

        match self.context.release_connection().await {
            Ok(()) => debug!(aborted = error.is_some(), "connection released"),
            Err(e) => warn!(cause = %e, "failed to release connection"),
        }
    }
}

impl<T: Transport> fmt::Debug for ConnectionLease<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("context", &self.context)
            .field("released", &self.released.is_resolved())
            .finish_non_exhaustive()
    }
}
