//! Readiness-based AIO backend over `epoll` (Linux).
//!
//! Registers one interest per in-flight job and performs the actual
//! syscall only once `epoll_wait` reports the descriptor ready, the same
//! split `mio`'s `Selector` makes between "wait for readiness" and "do the
//! I/O yourself" (`examples/tokio-rs-mio/src/sys/unix/selector/epoll.rs`).
//! Unlike `mio`, registration here is level-triggered rather than
//! edge-triggered: each job registers exactly once and is deregistered the
//! moment it resolves, so there is no dropped-wakeup risk to manage with
//! `EPOLLET`, and level-triggered semantics mean a spurious or partial
//! readiness notification simply results in another `epoll_wait` round
//! rather than a missed event.
//!
//! Advertises `accept`/`connect`/`recv`/`send`/`timer` (the last via a
//! `timerfd` registered like any other readiness source). `open`/`read`/
//! `write`/`close` are not advertised — `epoll` does not usefully support
//! regular files, so the I/O surface falls back to a direct syscall for
//! those instead of routing them through this backend.

use fiberio_core::backend::{AioBackend, Capabilities};
use fiberio_core::completion::{Completion, CompletionResult};
use fiberio_core::error::{RtError, RtResult};
use fiberio_core::id::TaskId;
use fiberio_core::job::AioOp;
use fiberio_core::rttrace;
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::time::Duration;

struct PendingJob {
    waiter: TaskId,
    op: AioOp,
    /// Set for the synthetic `timerfd` created to back a `Timer` op; not a
    /// real socket/file, so it must be closed (not just deregistered) once
    /// it fires.
    owns_fd: bool,
}

/// epoll-backed readiness reactor.
pub struct ReadinessBackend {
    epfd: RawFd,
    pending: HashMap<RawFd, PendingJob>,
    capacity: usize,
}

impl ReadinessBackend {
    pub fn new(capacity: usize) -> std::io::Result<Self> {
        let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epfd < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(Self { epfd, pending: HashMap::new(), capacity })
    }

    fn register(&mut self, fd: RawFd, interest: i32, job: PendingJob) -> RtResult<()> {
        let mut event = libc::epoll_event { events: interest as u32, u64: fd as u64 };
        let ret = unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_ADD, fd, &mut event) };
        if ret != 0 {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
            return Err(RtError::from_errno(errno).unwrap_or(RtError::Unexpected(std::io::Error::from_raw_os_error(errno))));
        }
        self.pending.insert(fd, job);
        Ok(())
    }

    fn deregister(&mut self, fd: RawFd) {
        unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
    }

    fn make_timerfd(delay_ms: u64) -> std::io::Result<RawFd> {
        let fd = unsafe { libc::timerfd_create(libc::CLOCK_MONOTONIC, libc::TFD_NONBLOCK | libc::TFD_CLOEXEC) };
        if fd < 0 {
            return Err(std::io::Error::last_os_error());
        }
        let spec = libc::itimerspec {
            it_interval: libc::timespec { tv_sec: 0, tv_nsec: 0 },
            it_value: libc::timespec {
                tv_sec: (delay_ms / 1000) as libc::time_t,
                tv_nsec: ((delay_ms % 1000) * 1_000_000) as libc::c_long,
            },
        };
        let ret = unsafe { libc::timerfd_settime(fd, 0, &spec, std::ptr::null_mut()) };
        if ret != 0 {
            let err = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }
        Ok(fd)
    }
}

impl AioBackend for ReadinessBackend {
    fn queue(&mut self, waiter: TaskId, op: AioOp) -> RtResult<()> {
        if self.pending.len() >= self.capacity {
            return Err(RtError::QueueFull);
        }
        rttrace!("readiness: queue {} for task {}", op.kind(), waiter);

        match &op {
            AioOp::Accept { listen_fd } => {
                let fd = *listen_fd;
                self.register(fd, libc::EPOLLIN, PendingJob { waiter, op, owns_fd: false })
            }
            AioOp::Recv { fd, .. } => {
                let fd = *fd;
                self.register(fd, libc::EPOLLIN, PendingJob { waiter, op, owns_fd: false })
            }
            AioOp::Connect { fd, addr } => {
                let fd = *fd;
                // Kick off the non-blocking connect. `0` (connected
                // synchronously, common for loopback) and `EINPROGRESS`
                // both resolve the same way: register EPOLLOUT and let the
                // next `epoll_wait` pass confirm success via SO_ERROR.
                let ret = unsafe { libc::connect(fd, &addr.storage as *const _ as *const libc::sockaddr, addr.len) };
                if ret != 0 {
                    let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
                    if errno != libc::EINPROGRESS {
                        return Err(RtError::from_errno(errno).unwrap_or(RtError::Unexpected(std::io::Error::from_raw_os_error(errno))));
                    }
                }
                self.register(fd, libc::EPOLLOUT, PendingJob { waiter, op, owns_fd: false })
            }
            AioOp::Send { fd, .. } => {
                let fd = *fd;
                self.register(fd, libc::EPOLLOUT, PendingJob { waiter, op, owns_fd: false })
            }
            AioOp::Timer { delay_ms } => {
                let delay_ms = *delay_ms;
                let fd = Self::make_timerfd(delay_ms).map_err(RtError::from)?;
                self.register(fd, libc::EPOLLIN, PendingJob { waiter, op, owns_fd: true })
            }
            AioOp::Close { .. } | AioOp::Open { .. } | AioOp::Read { .. } | AioOp::Write { .. } => {
                Err(RtError::OperationNotSupported)
            }
        }
    }

    fn submit(&mut self) -> RtResult<()> {
        // epoll_ctl registration happens eagerly in `queue`; nothing to flush.
        Ok(())
    }

    fn reap(&mut self, out: &mut Vec<Completion>, max: usize) -> RtResult<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }

        let capacity = max.max(1);
        let mut events: Vec<libc::epoll_event> = Vec::with_capacity(capacity);
        loop {
            events.clear();
            let n = unsafe {
                libc::epoll_wait(self.epfd, events.as_mut_ptr(), capacity as i32, timeout_ms(Duration::from_millis(500)))
            };
            if n < 0 {
                let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
                if errno == libc::EINTR {
                    continue;
                }
                return Err(RtError::from_errno(errno).unwrap_or(RtError::Unexpected(std::io::Error::from_raw_os_error(errno))));
            }
            // Safety: `epoll_wait` just initialized the first `n` slots.
            unsafe { events.set_len(n as usize) };

            let mut produced = 0;
            for event in &events {
                let fd = event.u64 as RawFd;
                let Some(job) = self.pending.get_mut(&fd) else { continue };

                let outcome = match &mut job.op {
                    AioOp::Accept { listen_fd } => try_accept(*listen_fd),
                    AioOp::Connect { fd, .. } => try_connect_result(*fd),
                    AioOp::Recv { fd, buf, len } => try_recv(*fd, *buf, *len),
                    AioOp::Send { fd, buf, len } => try_send(*fd, *buf, *len),
                    AioOp::Timer { .. } => {
                        let mut buf = [0u8; 8];
                        unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, 8) };
                        Some(CompletionResult::None)
                    }
                    _ => unreachable!("unsupported ops are rejected in queue()"),
                };

                if let Some(result) = outcome {
                    let job = self.pending.remove(&fd).unwrap();
                    self.deregister(fd);
                    if job.owns_fd {
                        unsafe { libc::close(fd) };
                    }
                    out.push(Completion::new(job.waiter, result));
                    produced += 1;
                }
            }

            if produced > 0 {
                return Ok(produced);
            }
            // Spurious wakeup (or nothing yet resolved) — loop again.
        }
    }

    fn cancel(&mut self, waiter: TaskId) {
        let stale: Vec<RawFd> = self.pending.iter().filter(|(_, j)| j.waiter == waiter).map(|(fd, _)| *fd).collect();
        for fd in stale {
            if let Some(job) = self.pending.remove(&fd) {
                self.deregister(fd);
                if job.owns_fd {
                    unsafe { libc::close(fd) };
                }
            }
        }
    }

    fn inflight(&self) -> usize {
        self.pending.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ACCEPT.union(Capabilities::CONNECT).union(Capabilities::RECV).union(Capabilities::SEND).union(Capabilities::TIMER)
    }

    fn shutdown(&mut self) {
        let fds: Vec<RawFd> = self.pending.keys().copied().collect();
        for fd in fds {
            if let Some(job) = self.pending.remove(&fd) {
                self.deregister(fd);
                if job.owns_fd {
                    unsafe { libc::close(fd) };
                }
            }
        }
        unsafe { libc::close(self.epfd) };
    }
}

impl Drop for ReadinessBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn timeout_ms(d: Duration) -> libc::c_int {
    d.as_millis().min(i32::MAX as u128) as libc::c_int
}

fn errno_result(ret: libc::ssize_t) -> Option<CompletionResult> {
    if ret >= 0 {
        return Some(CompletionResult::Value(ret as i64));
    }
    let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
    if errno == libc::EAGAIN || errno == libc::EWOULDBLOCK || errno == libc::EINTR {
        None
    } else {
        Some(CompletionResult::Error { errno })
    }
}

fn try_accept(listen_fd: i32) -> Option<CompletionResult> {
    let ret = unsafe { libc::accept4(listen_fd, std::ptr::null_mut(), std::ptr::null_mut(), libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC) };
    if ret >= 0 {
        return Some(CompletionResult::Fd(ret));
    }
    let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
    if errno == libc::EAGAIN || errno == libc::EWOULDBLOCK || errno == libc::EINTR {
        None
    } else {
        Some(CompletionResult::Error { errno })
    }
}

fn try_connect_result(fd: i32) -> Option<CompletionResult> {
    let mut err: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    let ret = unsafe { libc::getsockopt(fd, libc::SOL_SOCKET, libc::SO_ERROR, &mut err as *mut _ as *mut libc::c_void, &mut len) };
    if ret != 0 {
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
        return Some(CompletionResult::Error { errno });
    }
    if err == 0 {
        Some(CompletionResult::None)
    } else {
        Some(CompletionResult::Error { errno: err })
    }
}

fn try_recv(fd: i32, buf: *mut u8, len: usize) -> Option<CompletionResult> {
    errno_result(unsafe { libc::recv(fd, buf as *mut libc::c_void, len, 0) })
}

fn try_send(fd: i32, buf: *const u8, len: usize) -> Option<CompletionResult> {
    errno_result(unsafe { libc::send(fd, buf as *const libc::c_void, len, libc::MSG_NOSIGNAL) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_exclude_file_ops() {
        let be = ReadinessBackend::new(64).unwrap();
        let caps = be.capabilities();
        assert!(caps.contains(Capabilities::RECV));
        assert!(!caps.contains(Capabilities::OPEN));
        assert!(!caps.contains(Capabilities::READ));
    }

    #[test]
    fn timer_completes() {
        let mut be = ReadinessBackend::new(64).unwrap();
        be.queue(TaskId::new(0), AioOp::Timer { delay_ms: 5 }).unwrap();
        let mut out = Vec::new();
        let n = be.reap(&mut out, 8).unwrap();
        assert_eq!(n, 1);
        assert!(matches!(out[0].result, CompletionResult::None));
    }

    #[test]
    fn unsupported_op_rejected() {
        let mut be = ReadinessBackend::new(64).unwrap();
        let err = be.queue(TaskId::new(0), AioOp::Read { fd: 0, buf: std::ptr::null_mut(), len: 0, offset: 0 }).unwrap_err();
        assert!(matches!(err, RtError::OperationNotSupported));
    }

    #[test]
    fn reap_on_empty_backend_returns_zero_immediately() {
        let mut be = ReadinessBackend::new(64).unwrap();
        let mut out = Vec::new();
        assert_eq!(be.reap(&mut out, 8).unwrap(), 0);
    }
}
