use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::ensure;
use crate::protocol::QuasiHttpError;

/// Shared read/end-of-read bookkeeping for body implementations.
///
/// The gate enforces the body contract independently of where the bytes come from:
///
/// - the terminal state is set by the first [`end`](BodyGate::end) call only
/// - a second concurrent read fails with [`QuasiHttpError::PendingReadExists`]
/// - a read in flight when the body ends observes the terminal state instead of its own outcome
/// - reads after the end observe the terminal state: `Ok(0)` for a normal end, the error otherwise
#[derive(Debug, Default)]
pub struct BodyGate {
    state: Mutex<GateState>,
    ended: CancellationToken,
}

#[derive(Debug, Default)]
struct GateState {
    reading: bool,
    terminal: Option<Terminal>,
}

#[derive(Debug, Clone)]
enum Terminal {
    EndOfRead,
    Failed(QuasiHttpError),
}

impl Terminal {
    fn outcome(&self) -> Result<usize, QuasiHttpError> {
        match self {
            Terminal::EndOfRead => Ok(0),
            Terminal::Failed(e) => Err(e.clone()),
        }
    }
}

/// Clears the reading flag however the read finishes, including when its future is dropped.
struct PendingRead<'a>(&'a BodyGate);

impl Drop for PendingRead<'_> {
    fn drop(&mut self) {
        self.0.lock().reading = false;
    }
}

impl BodyGate {
    pub fn new() -> Self {
        Default::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `read` under the gate rules.
    pub async fn read<F>(&self, read: F) -> Result<usize, QuasiHttpError>
    where
        F: Future<Output = Result<usize, QuasiHttpError>>,
    {
        {
            let mut state = self.lock();
            if let Some(terminal) = &state.terminal {
                return terminal.outcome();
            }
            ensure!(!state.reading, QuasiHttpError::PendingReadExists);
            state.reading = true;
        }

        let result = {
            let _pending = PendingRead(self);
            tokio::select! {
                biased;
                _ = self.ended.cancelled() => None,
                result = read => Some(result),
            }
        };

        let state = self.lock();
        match (&state.terminal, result) {
            (Some(terminal), _) => terminal.outcome(),
            (None, Some(result)) => result,
            (None, None) => Ok(0),
        }
    }

    /// Records the terminal state. Returns true only for the call that won,
    /// which is then responsible for releasing the body's resources.
    pub fn end(&self, error: Option<QuasiHttpError>) -> bool {
        {
            let mut state = self.lock();
            if state.terminal.is_some() {
                trace!("body already ended, ignore end of read");
                return false;
            }
            state.terminal = Some(match error {
                Some(e) => Terminal::Failed(e),
                None => Terminal::EndOfRead,
            });
        }
        self.ended.cancel();
        true
    }
}
