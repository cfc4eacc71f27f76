//! Busy-loop AIO backend.
//!
//! The portable fallback: no kernel readiness mechanism or completion
//! queue, just a list of pending jobs polled with non-blocking syscalls
//! every pass. Works on any POSIX target `fiberio-runtime` supports, at
//! the cost of burning a core while jobs are in flight. The idle backoff
//! (a short sleep when nothing is runnable, rather than spinning at full
//! tilt) mirrors a worker park loop pattern common to busy-polling
//! schedulers.
//!
//! This is the only backend that honors a per-operation timeout — the
//! other two backends never synthesize one, relying on their own
//! completion mechanisms instead. `close` here never times out even when
//! one is configured, because `close(2)` always completes on its first poll.

use fiberio_core::completion::{Completion, CompletionResult};
use fiberio_core::error::RtResult;
use fiberio_core::id::TaskId;
use fiberio_core::job::{AioJob, AioOp};
use fiberio_core::{rttrace, rtwarn};
use std::time::{Duration, Instant};

/// One job plus the extra state `connect(2)` needs across polls: the
/// first call either completes immediately or returns `EINPROGRESS`, after
/// which completion is observed via `getsockopt(SO_ERROR)` rather than by
/// calling `connect` again.
struct Entry {
    job: AioJob,
    connecting: bool,
}

/// Busy-polling [`fiberio_core::AioBackend`]. Keeps an unbounded list of
/// pending jobs — there is no kernel-imposed slot count to enforce here,
/// so unlike the readiness and uring backends this one never fails a
/// `queue` call with `QueueFull`; any admission cap is the scheduler's
/// concern (`size_aio_jobs_max`), not this backend's.
pub struct BusyBackend {
    entries: Vec<Entry>,
    op_timeout: Option<Duration>,
    idle_backoff: Duration,
}

impl BusyBackend {
    /// `op_timeout` is the busy-loop-only per-operation deadline
    /// (`ms_operation_max`); `None` disables it.
    pub fn new(op_timeout: Option<Duration>) -> Self {
        Self {
            entries: Vec::new(),
            op_timeout,
            idle_backoff: Duration::from_micros(200),
        }
    }

    /// Try to make progress on one entry. Returns `Some(result)` once the
    /// job is resolved (success, error, or timeout); `None` means "still
    /// pending, try again next pass".
    fn poll_entry(entry: &mut Entry, op_timeout: Option<Duration>) -> Option<CompletionResult> {
        if let Some(timeout) = op_timeout {
            if !matches!(entry.job.op, AioOp::Close { .. }) && entry.job.submitted_at.elapsed() >= timeout {
                return Some(CompletionResult::Timeout);
            }
        }

        match &mut entry.job.op {
            AioOp::Accept { listen_fd } => poll_accept(*listen_fd),
            AioOp::Connect { fd, addr } => poll_connect(*fd, addr, &mut entry.connecting),
            AioOp::Recv { fd, buf, len } => poll_recv(*fd, *buf, *len),
            AioOp::Send { fd, buf, len } => poll_send(*fd, *buf, *len),
            AioOp::Close { fd } => Some(poll_close(*fd)),
            AioOp::Open { path, flags, mode } => Some(poll_open(path, *flags, *mode)),
            AioOp::Read { fd, buf, len, offset } => poll_read(*fd, *buf, *len, *offset),
            AioOp::Write { fd, buf, len, offset } => poll_write(*fd, *buf, *len, *offset),
            AioOp::Timer { delay_ms } => poll_timer(entry.job.submitted_at, *delay_ms),
        }
    }
}

impl fiberio_core::backend::AioBackend for BusyBackend {
    fn queue(&mut self, waiter: TaskId, op: AioOp) -> RtResult<()> {
        rttrace!("busy: queue {} for task {}", op.kind(), waiter);
        self.entries.push(Entry { job: AioJob::new(waiter, op, Instant::now()), connecting: false });
        Ok(())
    }

    fn submit(&mut self) -> RtResult<()> {
        // Jobs are already timestamped at `queue` time; nothing to flush.
        Ok(())
    }

    fn reap(&mut self, out: &mut Vec<Completion>, max: usize) -> RtResult<usize> {
        if self.entries.is_empty() {
            return Ok(0);
        }

        let start_len = out.len();
        loop {
            let mut i = 0;
            while i < self.entries.len() {
                if out.len() - start_len >= max {
                    return Ok(out.len() - start_len);
                }
                if let Some(result) = Self::poll_entry(&mut self.entries[i], self.op_timeout) {
                    let entry = self.entries.swap_remove(i);
                    if matches!(result, CompletionResult::Timeout) {
                        rtwarn!("busy: task {} timed out on {}", entry.job.waiter, entry.job.op.kind());
                    }
                    out.push(Completion::new(entry.job.waiter, result));
                } else {
                    i += 1;
                }
            }

            if out.len() > start_len {
                return Ok(out.len() - start_len);
            }
            std::thread::sleep(self.idle_backoff);
        }
    }

    fn cancel(&mut self, waiter: TaskId) {
        self.entries.retain(|e| e.job.waiter != waiter);
    }

    fn inflight(&self) -> usize {
        self.entries.len()
    }

    fn capacity(&self) -> usize {
        usize::MAX
    }

    fn capabilities(&self) -> fiberio_core::backend::Capabilities {
        // The busy loop handles every operation kind itself, just slowly.
        fiberio_core::backend::Capabilities::ALL
    }

    fn shutdown(&mut self) {
        self.entries.clear();
    }
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

fn poll_accept(listen_fd: i32) -> Option<CompletionResult> {
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

fn poll_connect(fd: i32, addr: &fiberio_core::job::RawSockAddr, connecting: &mut bool) -> Option<CompletionResult> {
    if !*connecting {
        let ret = unsafe { libc::connect(fd, &addr.storage as *const _ as *const libc::sockaddr, addr.len) };
        if ret == 0 {
            return Some(CompletionResult::None);
        }
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
        if errno == libc::EINPROGRESS {
            *connecting = true;
            return None;
        }
        return Some(CompletionResult::Error { errno });
    }

    let mut err: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    let ret = unsafe {
        libc::getsockopt(fd, libc::SOL_SOCKET, libc::SO_ERROR, &mut err as *mut _ as *mut libc::c_void, &mut len)
    };
    if ret != 0 {
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
        return Some(CompletionResult::Error { errno });
    }
    if err == 0 {
        Some(CompletionResult::None)
    } else if err == libc::EINPROGRESS {
        None
    } else {
        Some(CompletionResult::Error { errno: err })
    }
}

fn poll_recv(fd: i32, buf: *mut u8, len: usize) -> Option<CompletionResult> {
    let ret = unsafe { libc::recv(fd, buf as *mut libc::c_void, len, 0) };
    errno_result(ret)
}

fn poll_send(fd: i32, buf: *const u8, len: usize) -> Option<CompletionResult> {
    let ret = unsafe { libc::send(fd, buf as *const libc::c_void, len, libc::MSG_NOSIGNAL) };
    errno_result(ret)
}

fn poll_close(fd: i32) -> CompletionResult {
    let ret = unsafe { libc::close(fd) };
    if ret == 0 {
        CompletionResult::None
    } else {
        CompletionResult::Error { errno: std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO) }
    }
}

fn poll_open(path: &std::ffi::CString, flags: i32, mode: u32) -> CompletionResult {
    let ret = unsafe { libc::open(path.as_ptr(), flags, mode as libc::mode_t) };
    if ret >= 0 {
        CompletionResult::Fd(ret)
    } else {
        CompletionResult::Error { errno: std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO) }
    }
}

fn poll_read(fd: i32, buf: *mut u8, len: usize, offset: i64) -> Option<CompletionResult> {
    let ret = unsafe { libc::pread(fd, buf as *mut libc::c_void, len, offset) };
    errno_result(ret)
}

fn poll_write(fd: i32, buf: *const u8, len: usize, offset: i64) -> Option<CompletionResult> {
    let ret = unsafe { libc::pwrite(fd, buf as *const libc::c_void, len, offset) };
    errno_result(ret)
}

fn poll_timer(submitted_at: Instant, delay_ms: u64) -> Option<CompletionResult> {
    if submitted_at.elapsed() >= Duration::from_millis(delay_ms) {
        Some(CompletionResult::None)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiberio_core::backend::{AioBackend, Capabilities};

    fn backend() -> BusyBackend {
        BusyBackend::new(None)
    }

    #[test]
    fn timer_completes_after_delay() {
        let mut be = backend();
        be.queue(TaskId::new(0), AioOp::Timer { delay_ms: 10 }).unwrap();
        let mut out = Vec::new();
        let got = be.reap(&mut out, 8).unwrap();
        assert_eq!(got, 1);
        assert!(matches!(out[0].result, CompletionResult::None));
    }

    #[test]
    fn reap_on_empty_backend_returns_zero_immediately() {
        let mut be = backend();
        let mut out = Vec::new();
        assert_eq!(be.reap(&mut out, 8).unwrap(), 0);
    }

    #[test]
    fn queue_grows_unbounded() {
        let mut be = BusyBackend::new(None);
        for i in 0..64 {
            be.queue(TaskId::new(i), AioOp::Timer { delay_ms: 10_000 }).unwrap();
        }
        assert_eq!(be.inflight(), 64);
        assert_eq!(be.capacity(), usize::MAX);
    }

    #[test]
    fn operation_timeout_is_synthesized() {
        let mut be = BusyBackend::new(Some(Duration::from_millis(1)));
        be.queue(TaskId::new(0), AioOp::Timer { delay_ms: 10_000 }).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let mut out = Vec::new();
        be.reap(&mut out, 8).unwrap();
        assert!(matches!(out[0].result, CompletionResult::Timeout));
    }

    #[test]
    fn close_never_times_out() {
        // A valid, already-closed fd: close(2) still completes
        // synchronously on the first poll regardless of op_timeout.
        let (r, _w) = unsafe {
            let mut fds = [0i32; 2];
            libc::pipe(fds.as_mut_ptr());
            (fds[0], fds[1])
        };
        let mut be = BusyBackend::new(Some(Duration::from_nanos(1)));
        be.queue(TaskId::new(0), AioOp::Close { fd: r }).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        let mut out = Vec::new();
        be.reap(&mut out, 8).unwrap();
        assert!(matches!(out[0].result, CompletionResult::None));
    }

    #[test]
    fn capabilities_are_universal() {
        assert_eq!(backend().capabilities(), Capabilities::ALL);
    }

    #[test]
    fn cancel_removes_matching_entry() {
        let mut be = backend();
        be.queue(TaskId::new(3), AioOp::Timer { delay_ms: 10_000 }).unwrap();
        assert_eq!(be.inflight(), 1);
        be.cancel(TaskId::new(3));
        assert_eq!(be.inflight(), 0);
    }
}
