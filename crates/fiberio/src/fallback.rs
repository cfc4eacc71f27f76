//! The non-blocking-syscall-plus-yield loop every I/O method falls back to
//! when the selected backend doesn't advertise the operation's capability
//! (`epoll` has no use for regular files; a future backend might lack
//! timers). Mirrors the shape of the busy-loop backend's own poll loop,
//! just driven by `yield_now` instead of a backend `reap` call.

use fiberio_core::error::RtResult;

/// Repeatedly call `attempt` until it resolves (`Some`), yielding the
/// current frame between tries so other frames make progress. `attempt`
/// returns `Ok(None)` for `WouldBlock`/`EINTR`.
pub(crate) fn yield_until<T>(mut attempt: impl FnMut() -> RtResult<Option<T>>) -> RtResult<T> {
    loop {
        if let Some(value) = attempt()? {
            return Ok(value);
        }
        fiberio_runtime::yield_now();
    }
}

/// Classify the errno behind the last failed syscall: `None` for
/// `WouldBlock`/`EINTR` (retry), `Some(Err(..))` for anything else.
pub(crate) fn classify_wouldblock<T>() -> RtResult<Option<T>> {
    let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
    match fiberio_core::error::RtError::from_errno(errno) {
        None => Ok(None),
        Some(e) => Err(e),
    }
}
