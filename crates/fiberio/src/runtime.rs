//! The `Runtime` facade: construction, backend selection, and the
//! scheduler entry point. Pairs [`RuntimeConfig`] with a backend chosen by
//! [`fiberio_backends::select`] and drives [`Scheduler::run`].
//!
//! `entry` takes a single `FnOnce` rather than a start function plus a
//! separate opaque data argument — a Rust closure already captures
//! whatever state an entry needs.
//!
//! `Socket`/`File`/`Timer` methods do not thread an explicit `&Runtime`
//! parameter either, for the same reason `yield_now()` doesn't: the
//! scheduler driving the current thread is already resolved through the
//! thread-local state `fiberio_runtime` sets up for `io_await`, so
//! threading a handle through every I/O call would be redundant plumbing
//! rather than a real dependency.

use fiberio_backends::select::BackendKind;
use fiberio_core::error::{RtError, RtResult};
use fiberio_core::rtinfo;
use fiberio_runtime::{RuntimeConfig, Scheduler, TaskHandle};
use std::time::Duration;

/// A constructed runtime: owns the task table and the selected backend,
/// driven exactly once via [`Runtime::entry`].
pub struct Runtime {
    scheduler: Scheduler,
    backend_kind: BackendKind,
    config: RuntimeConfig,
}

impl Runtime {
    /// Construct a runtime from `config`. `config.backend` selects a
    /// concrete backend (`"busy"`, `"readiness"`, `"uring"`); empty means
    /// platform-driven auto-selection (see [`fiberio_backends::select`]).
    pub fn new(config: RuntimeConfig) -> RtResult<Self> {
        config.validate().map_err(|e| RtError::Unexpected(std::io::Error::other(e.to_string())))?;

        let op_timeout = if config.op_timeout_ms == 0 { None } else { Some(Duration::from_millis(config.op_timeout_ms)) };
        let (backend_kind, backend) = fiberio_backends::select(&config.backend, config.aio_jobs_max, op_timeout)?;
        rtinfo!("runtime: selected {} backend", backend_kind.as_str());

        let scheduler = Scheduler::new(config.clone(), backend)?;
        Ok(Self { scheduler, backend_kind, config })
    }

    /// Convenience constructor reading `RT_*` environment overrides.
    pub fn from_env() -> RtResult<Self> {
        Self::new(RuntimeConfig::from_env())
    }

    /// Which concrete backend this runtime selected.
    pub fn backend_kind(&self) -> BackendKind {
        self.backend_kind
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Spawn `start` as the first frame and run the scheduler loop until
    /// [`Runtime::stop`] has been called (from within a frame) and no
    /// runnable or waiting frames remain.
    pub fn entry<F>(&mut self, start: F) -> RtResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.scheduler.run(start)
    }

    /// Spawn an additional frame from within a running frame. Delegates to
    /// [`fiberio_runtime::spawn`], which resolves the current scheduler the
    /// same way `io_await`/`yield_now` do; panics if called before `entry`
    /// or from outside any frame.
    pub fn spawn<F>(&self, f: F, stack_size: usize) -> RtResult<TaskHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        fiberio_runtime::spawn(f, stack_size)
    }

    /// Request a clean shutdown: `entry`'s loop exits once currently live
    /// frames finish. Callable from within any frame running on this
    /// runtime.
    pub fn stop(&self) {
        fiberio_runtime::stop_current();
    }
}

/// Run `num_workers` independent runtimes, each on its own OS thread, per
/// the "auto" threading mode described in the concurrency model: separate
/// task pools and backends, no shared state, cross-thread hand-off left to
/// the caller. `worker` is invoked once per thread with its zero-based
/// index and must build and drive its own `Runtime`.
pub fn run_pool<F>(num_workers: usize, worker: F)
where
    F: Fn(usize) + Send + Sync + Clone + 'static,
{
    if num_workers <= 1 {
        worker(0);
        return;
    }

    let handles: Vec<_> = (1..num_workers)
        .map(|i| {
            let w = worker.clone();
            std::thread::spawn(move || w(i))
        })
        .collect();

    worker(0);

    for handle in handles {
        let _ = handle.join();
    }
}
