//! The pluggable AIO backend seam.
//!
//! Three implementations live in `fiberio-backends`: a busy-loop backend
//! that polls non-blocking syscalls directly, a readiness-based reactor
//! over `epoll`, and a kernel completion-queue backend over `io_uring`.
//! The scheduler only ever talks to this trait, so swapping backends is a
//! matter of picking a different constructor.

use crate::completion::Completion;
use crate::error::RtResult;
use crate::id::TaskId;
use crate::job::{AioOp, RawSockAddr};

/// Bitset of operations a backend can perform without falling back to a
/// non-blocking syscall plus yield loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const ACCEPT: Capabilities = Capabilities(1 << 0);
    pub const CONNECT: Capabilities = Capabilities(1 << 1);
    pub const RECV: Capabilities = Capabilities(1 << 2);
    pub const SEND: Capabilities = Capabilities(1 << 3);
    pub const CLOSE: Capabilities = Capabilities(1 << 4);
    pub const OPEN: Capabilities = Capabilities(1 << 5);
    pub const READ: Capabilities = Capabilities(1 << 6);
    pub const WRITE: Capabilities = Capabilities(1 << 7);
    pub const TIMER: Capabilities = Capabilities(1 << 8);

    pub const NONE: Capabilities = Capabilities(0);
    pub const ALL: Capabilities = Capabilities(0x1FF);

    #[inline]
    pub const fn contains(self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn union(self, other: Capabilities) -> Capabilities {
        Capabilities(self.0 | other.0)
    }

    /// Whether the operation named by `op` is natively supported; used by
    /// callers deciding between a native submit and a fallback yield loop.
    pub fn supports(self, op: &AioOp) -> bool {
        let bit = match op {
            AioOp::Accept { .. } => Capabilities::ACCEPT,
            AioOp::Connect { .. } => Capabilities::CONNECT,
            AioOp::Recv { .. } => Capabilities::RECV,
            AioOp::Send { .. } => Capabilities::SEND,
            AioOp::Close { .. } => Capabilities::CLOSE,
            AioOp::Open { .. } => Capabilities::OPEN,
            AioOp::Read { .. } => Capabilities::READ,
            AioOp::Write { .. } => Capabilities::WRITE,
            AioOp::Timer { .. } => Capabilities::TIMER,
        };
        self.contains(bit)
    }
}

/// A pluggable asynchronous I/O completion engine.
///
/// Implementations are single-threaded: `submit`/`reap`/`probe` are all
/// called from the one thread driving the runtime's scheduler loop, so the
/// trait carries no `Send`/`Sync` bound of its own — a backend is free to
/// use interior mutability without atomics where it doesn't need them.
pub trait AioBackend {
    /// Queue `op` on behalf of `waiter`. Returns [`crate::error::RtError::QueueFull`]
    /// if the backend's in-flight job table has no room.
    fn queue(&mut self, waiter: TaskId, op: AioOp) -> RtResult<()>;

    /// Flush any buffered submissions to the kernel. A no-op for backends
    /// that submit eagerly (busy-loop, readiness); meaningful for io_uring,
    /// which batches submission-queue entries.
    fn submit(&mut self) -> RtResult<()>;

    /// Drain up to `max` ready completions into `out`, returning the count
    /// appended. Never blocks past what the concrete backend's drive model
    /// allows (busy-loop: returns immediately; readiness: blocks in epoll_wait
    /// up to a bounded timeout; io_uring: blocks in io_uring_enter up to a
    /// bounded timeout).
    fn reap(&mut self, out: &mut Vec<Completion>, max: usize) -> RtResult<usize>;

    /// Best-effort cancellation of a job still owned by `waiter`. Backends
    /// that cannot cancel in-flight kernel work (io_uring accept, for
    /// instance) may leave the job outstanding and simply stop tracking
    /// its waiter; the next reap for it is then discarded.
    fn cancel(&mut self, waiter: TaskId);

    /// Number of jobs currently in flight.
    fn inflight(&self) -> usize;

    /// Declared capacity for in-flight jobs.
    fn capacity(&self) -> usize;

    /// Which operations this backend performs natively.
    fn capabilities(&self) -> Capabilities;

    /// Release any OS resources (epoll fd, io_uring instance, ...).
    fn shutdown(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_union_and_contains() {
        let caps = Capabilities::RECV.union(Capabilities::SEND);
        assert!(caps.contains(Capabilities::RECV));
        assert!(caps.contains(Capabilities::SEND));
        assert!(!caps.contains(Capabilities::ACCEPT));
    }

    #[test]
    fn supports_maps_op_to_bit() {
        let caps = Capabilities::ACCEPT;
        assert!(caps.supports(&AioOp::Accept { listen_fd: 3 }));
        let storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        let addr = RawSockAddr { storage, len: std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t };
        assert!(!caps.supports(&AioOp::Connect { fd: 3, addr }));
    }

    #[test]
    fn none_supports_nothing() {
        assert!(!Capabilities::NONE.supports(&AioOp::Timer { delay_ms: 1 }));
    }
}
