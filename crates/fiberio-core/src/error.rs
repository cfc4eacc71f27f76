//! Error taxonomy for the runtime.
//!
//! `WouldBlock` deliberately has no variant here: it never escapes the
//! backend layer, where it only ever drives another iteration of a
//! yield loop (see `fiberio-backends`).

use core::fmt;

/// Result type used throughout the runtime.
pub type RtResult<T> = Result<T, RtError>;

/// Errors surfaced to user frames.
#[derive(Debug)]
pub enum RtError {
    /// Peer-driven orderly or abortive termination. Callers typically
    /// treat this as end-of-stream rather than a hard failure.
    Closed,

    /// A per-operation deadline was exceeded. Only synthesized by the
    /// busy-loop backend (see `fiberio-backends::busy`).
    Timeout,

    /// The socket is not in listening mode for an operation that requires it.
    NotListening,

    /// The handle does not refer to a socket.
    NotASocket,

    /// The requested operation is not supported by this backend or platform.
    OperationNotSupported,

    /// Per-process open file descriptor limit reached (`EMFILE`).
    ProcessFdQuotaExceeded,

    /// System-wide open file descriptor limit reached (`ENFILE`).
    SystemFdQuotaExceeded,

    /// The backend's submission queue or in-flight job table is full.
    QueueFull,

    /// Unclassified OS failure; the original `std::io::Error` is preserved.
    Unexpected(std::io::Error),
}

impl RtError {
    /// Classify a raw `errno` as observed after a non-blocking syscall.
    ///
    /// Returns `None` for `EAGAIN`/`EWOULDBLOCK`/`EINTR` — those never
    /// enter the taxonomy and must be handled by retrying at the call site.
    pub fn from_errno(errno: i32) -> Option<RtError> {
        match errno {
            libc::EAGAIN | libc::EINTR => None,
            #[cfg(not(target_os = "linux"))]
            _ if errno == libc::EWOULDBLOCK => None,
            libc::ECONNRESET | libc::ECONNABORTED | libc::EPIPE => Some(RtError::Closed),
            libc::ENOTSOCK => Some(RtError::NotASocket),
            libc::EOPNOTSUPP => Some(RtError::OperationNotSupported),
            libc::EMFILE => Some(RtError::ProcessFdQuotaExceeded),
            libc::ENFILE => Some(RtError::SystemFdQuotaExceeded),
            other => Some(RtError::Unexpected(std::io::Error::from_raw_os_error(other))),
        }
    }

    /// True for the `Closed` variant — used by `recv_all`/`send_all` to
    /// decide whether to return a short count instead of propagating.
    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, RtError::Closed)
    }
}

impl fmt::Display for RtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtError::Closed => write!(f, "connection closed by peer"),
            RtError::Timeout => write!(f, "operation timed out"),
            RtError::NotListening => write!(f, "socket is not listening"),
            RtError::NotASocket => write!(f, "handle is not a socket"),
            RtError::OperationNotSupported => write!(f, "operation not supported"),
            RtError::ProcessFdQuotaExceeded => write!(f, "per-process fd quota exceeded"),
            RtError::SystemFdQuotaExceeded => write!(f, "system-wide fd quota exceeded"),
            RtError::QueueFull => write!(f, "AIO submission queue full"),
            RtError::Unexpected(e) => write!(f, "unexpected OS error: {}", e),
        }
    }
}

impl std::error::Error for RtError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RtError::Unexpected(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RtError {
    fn from(e: std::io::Error) -> Self {
        match e.raw_os_error().and_then(RtError::from_errno) {
            Some(classified) => classified,
            None => RtError::Unexpected(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn would_block_is_not_classified() {
        assert!(RtError::from_errno(libc::EAGAIN).is_none());
        assert!(RtError::from_errno(libc::EINTR).is_none());
    }

    #[test]
    fn reset_classifies_as_closed() {
        assert!(matches!(RtError::from_errno(libc::ECONNRESET), Some(RtError::Closed)));
        assert!(matches!(RtError::from_errno(libc::EPIPE), Some(RtError::Closed)));
    }

    #[test]
    fn unmapped_errno_is_unexpected() {
        let err = RtError::from_errno(libc::ENOENT).unwrap();
        assert!(matches!(err, RtError::Unexpected(_)));
    }

    #[test]
    fn display_preserves_cause() {
        let err = RtError::Unexpected(std::io::Error::from_raw_os_error(libc::ENOENT));
        assert!(format!("{}", err).contains("No such file or directory"));
    }

    #[test]
    fn is_closed_predicate() {
        assert!(RtError::Closed.is_closed());
        assert!(!RtError::Timeout.is_closed());
    }
}
