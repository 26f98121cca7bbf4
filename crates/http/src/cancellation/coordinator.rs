use std::future::{Future, pending};

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cancellation::CancellationIndicator;
use crate::protocol::{ProcessingOptions, QuasiHttpError};

/// Races `work` against a deadline and an external cancellation.
///
/// Exactly one of the three outcomes is returned; the losing futures are dropped.
/// Cancellation is checked first, then the deadline, so an already cancelled token or
/// an already passed deadline win over work that happens to be ready.
///
/// # Errors
///
/// [`QuasiHttpError::Cancelled`] or [`QuasiHttpError::Timeout`] when those win,
/// otherwise whatever `work` returns.
pub async fn race_until<T, F>(work: F, deadline: Option<Instant>, cancellation: &CancellationToken) -> Result<T, QuasiHttpError>
where
    F: Future<Output = Result<T, QuasiHttpError>>,
{
    let timer = async move {
        match deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancellation.cancelled() => {
            debug!("operation cancelled");
            Err(QuasiHttpError::Cancelled)
        }
        _ = timer => {
            debug!("operation timed out");
            Err(QuasiHttpError::Timeout)
        }
        result = work => result,
    }
}

/// Timeout and cancellation state of one logical exchange.
///
/// The deadline is fixed when the exchange starts, so every step raced through
/// [`run`](Self::run), including reads of a streamed response body, shares the same budget.
#[derive(Debug)]
pub struct ExchangeCoordinator {
    deadline: Option<Instant>,
    cancellation: CancellationToken,
    aborted: CancellationIndicator,
}

impl ExchangeCoordinator {
    pub fn new(options: &ProcessingOptions, cancellation: CancellationToken) -> Self {
        let deadline = options.timeout().map(|timeout| Instant::now() + timeout);
        Self { deadline, cancellation, aborted: CancellationIndicator::new() }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Runs one step of the exchange under the deadline and the cancellation.
    pub async fn run<T, F>(&self, work: F) -> Result<T, QuasiHttpError>
    where
        F: Future<Output = Result<T, QuasiHttpError>>,
    {
        race_until(work, self.deadline, &self.cancellation).await
    }

    /// Claims the right to abort the exchange. Returns true only once.
    pub fn try_abort(&self) -> bool {
        self.aborted.try_resolve()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_resolved()
    }
}
