use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::protocol::ProcessingOptions;
use crate::transport::Transport;

/// Read-only view of what one exchange runs on: the transport, the connection and
/// the options already merged over the defaults.
///
/// Every transfer protocol and every body exposed from a connection holds a clone;
/// cloning only bumps reference counts.
pub(crate) struct ExchangeContext<T: Transport> {
    transport: Arc<T>,
    connection: Arc<T::Connection>,
    options: ProcessingOptions,
}

impl<T: Transport> ExchangeContext<T> {
    pub(crate) fn new(transport: Arc<T>, connection: Arc<T::Connection>, options: ProcessingOptions) -> Self {
        Self { transport, connection, options }
    }

    #[inline]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    #[inline]
    pub(crate) fn connection(&self) -> &T::Connection {
        &self.connection
    }

    #[inline]
    pub(crate) fn options(&self) -> &ProcessingOptions {
        &self.options
    }

    pub(crate) async fn release_connection(&self) -> std::io::Result<()> {
        self.transport.release_connection(&self.connection).await
    }
}

impl<T: Transport> Clone for ExchangeContext<T> {
    fn clone(&self) -> Self {
        Self { transport: self.transport.clone(), connection: self.connection.clone(), options: self.options.clone() }
    }
}

impl<T: Transport> fmt::Debug for ExchangeContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeContext").field("options", &self.options).finish_non_exhaustive()
    }
}

/// Progress of one exchange, as seen by the side driving it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ExchangeState {
    Idle,
    HeaderSent,
    HeaderExpected,
    BodyInFlight,
    Completed,
    Aborted,
}

impl ExchangeState {
    pub(crate) fn advance(&mut self, next: ExchangeState) {
        trace!(from = ?self, to = ?next, "exchange state transition");
        *self = next;
    }

    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self, ExchangeState::Completed | ExchangeState::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_to_next_state() {
        let mut state = ExchangeState::Idle;
        state.advance(ExchangeState::HeaderSent);
        assert_eq!(state, ExchangeState::HeaderSent);
        assert!(!state.is_terminal());

        state.advance(ExchangeState::Aborted);
        assert!(state.is_terminal());
    }
}
