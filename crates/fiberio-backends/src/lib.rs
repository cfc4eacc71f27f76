//! # fiberio-backends
//!
//! The three [`fiberio_core::AioBackend`] implementations the runtime
//! chooses between at construction: a busy-loop fallback that polls
//! non-blocking syscalls directly, a readiness-based reactor over `epoll`,
//! and a kernel completion-queue backend over `io_uring`.
//!
//! None of these know about the scheduler or frames — they only see
//! [`fiberio_core::TaskId`] as an opaque routing tag. The scheduler
//! (`fiberio-runtime`) drives whichever one [`select::select`] picks.

#![allow(dead_code)]

pub mod busy;
pub mod readiness;
pub mod select;
pub mod uring;

pub use busy::BusyBackend;
pub use readiness::ReadinessBackend;
pub use select::{select, BackendKind};
pub use uring::UringBackend;
