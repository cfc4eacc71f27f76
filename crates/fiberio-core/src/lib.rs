//! # fiberio-core
//!
//! Platform-agnostic core types for the fiberio runtime.
//!
//! This crate contains no scheduling logic and no syscalls. It defines the
//! "lingua franca" shared by the scheduler (`fiberio-runtime`), the AIO
//! backends (`fiberio-backends`), and the public facade (`fiberio`):
//!
//! - `id` — the `TaskId` that identifies a task slot
//! - `state` — the `TaskState` enum and its legal transitions
//! - `completion` / `job` — the completion record and AIO job types
//! - `ring` — the SPSC bounded ring used between submission and reaping
//! - `backend` — the `AioBackend` trait and its capability bitset
//! - `error` — the `RtError` taxonomy
//! - `env` — environment-variable parsing helpers
//! - `rtlog` — kernel-style leveled logging macros

#![allow(dead_code)]

pub mod backend;
pub mod completion;
pub mod env;
pub mod error;
pub mod id;
pub mod job;
pub mod ring;
pub mod rtlog;
pub mod state;

pub use backend::{AioBackend, Capabilities};
pub use completion::{Completion, CompletionResult};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};
pub use error::{RtError, RtResult};
pub use id::TaskId;
pub use job::{AioJob, AioOp};
pub use ring::{SpscRing, SpscRingError};
pub use rtlog::{rterror, rtinfo, rttrace, rtwarn, LogLevel};
pub use state::TaskState;

/// Crate-wide constants: cache-line size, slot sentinels, default caps.
pub mod constants {
    /// Sentinel value for "no task" in a `u32`-encoded `TaskId`.
    pub const TASK_NONE: u32 = u32::MAX;

    /// Cache line size used to align the SPSC ring's indices.
    pub const CACHE_LINE_SIZE: usize = 64;

    /// Default maximum number of concurrent tasks.
    pub const DEFAULT_MAX_TASKS: usize = 65536;

    /// Default per-frame stack size.
    pub const DEFAULT_STACK_SIZE: usize = 16 * 1024;

    /// Guard page size appended after every frame stack.
    pub const GUARD_SIZE: usize = 4096;

    /// Default in-flight AIO job cap.
    pub const DEFAULT_AIO_JOBS_MAX: usize = 1024;

    /// Default completions drained per `reap()` call.
    pub const DEFAULT_AIO_REAP_MAX: usize = 256;
}
