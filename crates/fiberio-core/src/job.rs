//! AIO job descriptors submitted to a backend.

use crate::id::TaskId;
use std::time::Instant;

/// A raw socket address, sized for the largest address family this
/// runtime supports (`sockaddr_un` is the largest of `in`/`in6`/`un`).
/// Carried by value rather than as a pointer into the caller's stack,
/// since the job may outlive several suspensions of the frame that
/// queued it.
#[derive(Clone, Copy)]
pub struct RawSockAddr {
    pub storage: libc::sockaddr_storage,
    pub len: libc::socklen_t,
}

impl std::fmt::Debug for RawSockAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawSockAddr {{ family: {}, len: {} }}", self.storage.ss_family, self.len)
    }
}

/// The operation a submitted [`AioJob`] asks the backend to perform.
///
/// Buffers travel by raw pointer/length rather than by slice because the
/// job outlives the borrow that created it across a suspend point; the
/// frame that owns the buffer is parked (not dropped) until the backend
/// reaps a completion for this job, so the pointer stays valid.
#[derive(Debug)]
pub enum AioOp {
    /// Accept a connection on a listening socket.
    Accept { listen_fd: i32 },
    /// Connect a socket to the peer address carried alongside it.
    Connect { fd: i32, addr: RawSockAddr },
    /// Receive into a buffer.
    Recv { fd: i32, buf: *mut u8, len: usize },
    /// Send from a buffer.
    Send { fd: i32, buf: *const u8, len: usize },
    /// Close a file descriptor.
    Close { fd: i32 },
    /// Open a path.
    Open { path: std::ffi::CString, flags: i32, mode: u32 },
    /// Read at an offset.
    Read { fd: i32, buf: *mut u8, len: usize, offset: i64 },
    /// Write at an offset.
    Write { fd: i32, buf: *const u8, len: usize, offset: i64 },
    /// Fire a completion after `delay_ms` milliseconds of wall-clock time.
    Timer { delay_ms: u64 },
}

// Safety: buffer pointers inside `AioOp` are only ever touched by the
// backend thread that owns the job between submit and reap; the frame that
// supplied the buffer is suspended for the duration and does not alias it.
unsafe impl Send for AioOp {}

impl AioOp {
    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            AioOp::Accept { .. } => "accept",
            AioOp::Connect { .. } => "connect",
            AioOp::Recv { .. } => "recv",
            AioOp::Send { .. } => "send",
            AioOp::Close { .. } => "close",
            AioOp::Open { .. } => "open",
            AioOp::Read { .. } => "read",
            AioOp::Write { .. } => "write",
            AioOp::Timer { .. } => "timer",
        }
    }

    /// The file descriptor this op acts on, if any. `Open` has none yet
    /// (the fd is the *result*, not an input) and `Timer` has none at all.
    pub fn fd(&self) -> Option<i32> {
        match self {
            AioOp::Accept { listen_fd } => Some(*listen_fd),
            AioOp::Connect { fd, .. } => Some(*fd),
            AioOp::Recv { fd, .. } => Some(*fd),
            AioOp::Send { fd, .. } => Some(*fd),
            AioOp::Close { fd } => Some(*fd),
            AioOp::Open { .. } => None,
            AioOp::Read { fd, .. } => Some(*fd),
            AioOp::Write { fd, .. } => Some(*fd),
            AioOp::Timer { .. } => None,
        }
    }
}

/// A job in flight at a backend: the operation plus the bookkeeping the
/// scheduler needs to wake the right frame when it completes.
#[derive(Debug)]
pub struct AioJob {
    /// Frame waiting on this job's completion.
    pub waiter: TaskId,
    /// The operation to perform.
    pub op: AioOp,
    /// When the job was handed to the backend; used by the busy-loop
    /// backend to synthesize [`crate::error::RtError::Timeout`] once a
    /// per-operation deadline elapses.
    pub submitted_at: Instant,
}

impl AioJob {
    pub fn new(waiter: TaskId, op: AioOp, submitted_at: Instant) -> Self {
        Self { waiter, op, submitted_at }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags() {
        assert_eq!(AioOp::Accept { listen_fd: 3 }.kind(), "accept");
        assert_eq!(AioOp::Timer { delay_ms: 10 }.kind(), "timer");
    }
}
