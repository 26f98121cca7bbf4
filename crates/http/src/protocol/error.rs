use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Coarse classification of a [`QuasiHttpError`], so callers can tell retryable
/// conditions apart from protocol violations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ReasonCode {
    General,
    Timeout,
    Cancelled,
}

/// The step of an exchange during which an error was detected.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TransferPhase {
    HeaderSend,
    HeaderReceive,
    BodyTransfer,
    Application,
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferPhase::HeaderSend => "header send",
            TransferPhase::HeaderReceive => "header receive",
            TransferPhase::BodyTransfer => "body transfer",
            TransferPhase::Application => "application processing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error)]
pub enum QuasiHttpError {
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope { reason: String },

    #[error("chunk size {declared} exceed the limit {limit}")]
    ChunkSizeExceeded { declared: usize, limit: usize },

    #[error("content length violation: {reason}")]
    ContentLengthViolation { reason: String },

    #[error("body size exceed the buffering limit {limit}")]
    BufferingLimitExceeded { limit: usize },

    #[error("no response produced")]
    NoResponseProduced,

    #[error("no connection: {reason}")]
    NoConnection { reason: String },

    #[error("operation timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("transport error: {source}")]
    Transport {
        #[source]
        source: Arc<io::Error>,
    },

    #[error("a read is already pending on this body")]
    PendingReadExists,

    #[error("peer aborted the exchange")]
    PeerAborted,

    #[error("application error: {reason}")]
    Application { reason: String },

    #[error("{phase} failed: {source}")]
    Phase {
        phase: TransferPhase,
        #[source]
        source: Box<QuasiHttpError>,
    },
}

impl QuasiHttpError {
    pub fn malformed_envelope<S: ToString>(str: S) -> Self {
        Self::MalformedEnvelope { reason: str.to_string() }
    }

    pub fn chunk_size_exceeded(declared: usize, limit: usize) -> Self {
        Self::ChunkSizeExceeded { declared, limit }
    }

    pub fn content_length_violation<S: ToString>(str: S) -> Self {
        Self::ContentLengthViolation { reason: str.to_string() }
    }

    pub fn no_connection<S: ToString>(str: S) -> Self {
        Self::NoConnection { reason: str.to_string() }
    }

    pub fn application<S: ToString>(str: S) -> Self {
        Self::Application { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Transport { source: Arc::new(e.into()) }
    }

    /// The connection ended in the middle of a frame or a body.
    pub fn unexpected_eof<S: ToString>(str: S) -> Self {
        Self::io(io::Error::new(io::ErrorKind::UnexpectedEof, str.to_string()))
    }

    /// Wraps the error with the phase it was detected in.
    ///
    /// Timeouts, cancellations and errors already carrying a phase are returned as is,
    /// so an error is wrapped at most once.
    pub fn in_phase(self, phase: TransferPhase) -> Self {
        match self {
            e @ (Self::Timeout | Self::Cancelled | Self::Phase { .. }) => e,
            e => Self::Phase { phase, source: Box::new(e) },
        }
    }

    /// The error without its phase wrapper.
    pub fn root(&self) -> &QuasiHttpError {
        match self {
            Self::Phase { source, .. } => source.root(),
            e => e,
        }
    }

    pub fn phase(&self) -> Option<TransferPhase> {
        match self {
            Self::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    pub fn reason_code(&self) -> ReasonCode {
        match self.root() {
            Self::Timeout => ReasonCode::Timeout,
            Self::Cancelled => ReasonCode::Cancelled,
            _ => ReasonCode::General,
        }
    }

    #[inline]
    pub fn is_timeout(&self) -> bool {
        self.reason_code() == ReasonCode::Timeout
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.reason_code() == ReasonCode::Cancelled
    }
}

impl From<io::Error> for QuasiHttpError {
    fn from(e: io::Error) -> Self {
        Self::io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_wraps_once() {
        let error = QuasiHttpError::malformed_envelope("bad csv")
            .in_phase(TransferPhase::HeaderReceive)
            .in_phase(TransferPhase::BodyTransfer);

        assert_eq!(error.phase(), Some(TransferPhase::HeaderReceive));
        assert!(matches!(error.root(), QuasiHttpError::MalformedEnvelope { .. }));
        assert_eq!(error.reason_code(), ReasonCode::General);
        assert_eq!(error.to_string(), "header receive failed: malformed envelope: bad csv");
    }

    #[test]
    fn timeout_and_cancel_are_never_wrapped() {
        let timeout = QuasiHttpError::Timeout.in_phase(TransferPhase::BodyTransfer);
        assert!(matches!(timeout, QuasiHttpError::Timeout));
        assert!(timeout.is_timeout());

        let cancelled = QuasiHttpError::Cancelled.in_phase(TransferPhase::HeaderSend);
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.phase(), None);
    }

    #[test]
    fn io_errors_map_to_transport() {
        let error: QuasiHttpError = io::Error::from(io::ErrorKind::BrokenPipe).into();
        assert!(matches!(error, QuasiHttpError::Transport { .. }));
        assert_eq!(error.reason_code(), ReasonCode::General);
    }
}
