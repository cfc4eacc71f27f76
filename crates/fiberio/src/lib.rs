//! # fiberio
//!
//! A small cooperative runtime for stackful coroutines ("frames") with
//! pluggable AIO backends (busy-loop, `epoll` readiness, `io_uring`). This
//! crate is the user-facing surface: [`Runtime`] drives the scheduler from
//! `fiberio-runtime`, and [`Socket`]/[`File`]/[`timer::delay`] build typed
//! operations on top of [`fiberio_runtime::io_await`].
//!
//! A frame calls these methods directly, with no handle threaded through —
//! `yield_now`/`io_await` already resolve "the scheduler driving this
//! thread" via thread-local state, and the I/O surface piggybacks on the
//! same resolution.

mod addr;
mod fallback;
mod file;
mod runtime;
mod socket;
mod timer;

pub use fiberio_core::error::{RtError, RtResult};
pub use fiberio_runtime::{is_in_frame, yield_now, RuntimeConfig, TaskHandle};

pub use file::File;
pub use runtime::{run_pool, Runtime};
pub use socket::{Endpoint, Socket};
pub use timer::delay as sleep;

/// Spawn a frame on the scheduler driving the current thread. Equivalent
/// to `Runtime::spawn`, callable without holding a `&Runtime` since the
/// scheduler is already resolved thread-locally.
pub fn spawn<F>(f: F, stack_size: usize) -> RtResult<TaskHandle>
where
    F: FnOnce() + Send + 'static,
{
    fiberio_runtime::spawn(f, stack_size)
}

/// Request the scheduler driving the current thread to stop once its
/// runnable and waiting frames drain.
pub fn stop() {
    fiberio_runtime::stop_current();
}
