//! # fiberio-runtime
//!
//! The scheduler, task table, and stackful frame substrate described in the
//! runtime's core design. This crate knows nothing about sockets, files, or
//! timers as OS objects — it only knows how to hand an [`fiberio_core::AioOp`]
//! to a backend and wake the frame that was waiting on it. The I/O surface
//! (`fiberio` crate) builds typed operations on top of [`scheduler::io_await`].

#![allow(dead_code)]

pub mod config;
pub mod frame;
pub mod memory;
pub mod scheduler;
pub mod tls;

mod arch;

pub use config::RuntimeConfig;
pub use scheduler::{current_capabilities, io_await, is_in_frame, spawn, stop_current, yield_now, Scheduler, TaskHandle};
