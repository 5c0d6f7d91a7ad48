//! Client-side error taxonomy.
//!
//! Three families of failure are kept apart because callers handle them
//! differently:
//!
//! - [`ClientError::BadArguments`] is a local mistake.  Nothing was sent; the
//!   session is still usable.
//! - [`ClientError::Aborted`] means the response stream no longer matches
//!   what we sent.  The session must be torn down and re-initialized.
//! - [`ClientError::Server`] is an application-level verdict from the server
//!   (key not found, cache full).  The session remains healthy.

use hsmlink_core::kind::Kind;
use hsmlink_core::{status, WireError};
use thiserror::Error;

use crate::transport::TransportError;

/// Why a response was rejected as a protocol violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Response magic is not the native value.
    MagicMismatch { actual: u16 },
    /// Response kind differs from the outstanding request's kind.
    KindMismatch { expected: Kind, actual: Kind },
    /// Response sequence differs from the outstanding request's sequence.
    CorrelationMismatch { expected: u16, actual: u16 },
    /// Response payload is not the size the operation requires.
    BadResponseSize { expected: usize, actual: usize },
    /// Exported key is larger than the caller's buffer.
    BufferTooSmall { needed: usize, capacity: usize },
    /// Response carried a data shape the operation does not allow.
    UnexpectedType,
    /// Response carried an embedded status outside the operation's contract.
    UnexpectedStatus(i32),
    /// Frame failed structural validation.
    MalformedFrame,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::MagicMismatch { actual } => {
                write!(f, "unrecognized magic 0x{actual:04X}")
            }
            AbortReason::KindMismatch { expected, actual } => {
                write!(f, "kind mismatch: expected {expected:?}, got {actual:?}")
            }
            AbortReason::CorrelationMismatch { expected, actual } => {
                write!(f, "sequence mismatch: expected {expected}, got {actual}")
            }
            AbortReason::BadResponseSize { expected, actual } => {
                write!(f, "response is {actual} bytes, operation requires {expected}")
            }
            AbortReason::BufferTooSmall { needed, capacity } => {
                write!(f, "key needs {needed} bytes, buffer holds {capacity}")
            }
            AbortReason::UnexpectedType => {
                write!(f, "response carried an unexpected data shape")
            }
            AbortReason::UnexpectedStatus(rc) => {
                write!(f, "response carried out-of-contract status {rc}")
            }
            AbortReason::MalformedFrame => write!(f, "malformed frame"),
        }
    }
}

/// Application-level status embedded in a server response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    /// Server rejected the request arguments.
    BadArgs,
    /// Named key does not exist in this tenant's view.
    NotFound,
    /// Server-side cache is full.
    NoSpace,
    /// No handler registered for the callback slot.
    NoHandler,
    /// Any other non-zero status.
    Other(i32),
}

impl ServerStatus {
    pub fn from_code(rc: i32) -> Self {
        match rc {
            status::BADARGS => ServerStatus::BadArgs,
            status::NOTFOUND => ServerStatus::NotFound,
            status::NOSPACE => ServerStatus::NoSpace,
            status::NOHANDLER => ServerStatus::NoHandler,
            other => ServerStatus::Other(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            ServerStatus::BadArgs => status::BADARGS,
            ServerStatus::NotFound => status::NOTFOUND,
            ServerStatus::NoSpace => status::NOSPACE,
            ServerStatus::NoHandler => status::NOHANDLER,
            ServerStatus::Other(rc) => rc,
        }
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStatus::BadArgs => write!(f, "bad arguments ({})", self.code()),
            ServerStatus::NotFound => write!(f, "not found ({})", self.code()),
            ServerStatus::NoSpace => write!(f, "no space ({})", self.code()),
            ServerStatus::NoHandler => write!(f, "no handler ({})", self.code()),
            ServerStatus::Other(rc) => write!(f, "status {rc}"),
        }
    }
}

/// Errors surfaced by every client operation.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Caller passed arguments that can never succeed.  Nothing was sent.
    #[error("bad arguments: {0}")]
    BadArguments(&'static str),

    /// The transport could not complete the step right now.  Retry later;
    /// no state was consumed.
    #[error("not ready, retry")]
    NotReady,

    /// Protocol violation.  The session is stale until re-initialized.
    #[error("exchange aborted: {0}")]
    Aborted(AbortReason),

    /// The server completed the exchange but reported a failure status.
    #[error("server returned {0}")]
    Server(ServerStatus),

    /// Poll budget exhausted while the server stayed not-ready.
    #[error("gave up after {0} polls")]
    Timeout(u32),

    /// Payload could not be encoded or decoded.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Transport failed in a way that is not a retry condition.
    #[error("transport error: {0}")]
    Transport(TransportError),
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotReady => ClientError::NotReady,
            other => ClientError::Transport(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_not_ready_maps_to_retry_condition() {
        let err: ClientError = TransportError::NotReady.into();
        assert!(matches!(err, ClientError::NotReady));
    }

    #[test]
    fn test_transport_closed_is_not_a_retry_condition() {
        let err: ClientError = TransportError::Closed.into();
        assert!(matches!(err, ClientError::Transport(TransportError::Closed)));
    }

    #[test]
    fn test_server_status_code_mapping_is_bidirectional() {
        for rc in [status::BADARGS, status::NOTFOUND, status::NOSPACE, status::NOHANDLER, -999] {
            assert_eq!(ServerStatus::from_code(rc).code(), rc);
        }
    }
}
