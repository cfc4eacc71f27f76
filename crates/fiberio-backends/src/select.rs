//! Backend construction and the `auto` kernel-driven fallback chain.
//!
//! An empty `RuntimeConfig::backend` string means "let the runtime pick",
//! per the developer-affordance note: `auto` must always be able to fall
//! back to a backend the running kernel actually supports, so the chain
//! tries `io_uring` first, then `epoll`, and finally the busy-loop backend,
//! which has no kernel dependency at all and therefore never fails to
//! construct.

use crate::{BusyBackend, ReadinessBackend, UringBackend};
use fiberio_core::backend::AioBackend;
use fiberio_core::error::{RtError, RtResult};
use fiberio_core::rtinfo;
use std::time::Duration;

/// Which concrete backend a [`select`] call resolved to; reported back to
/// the caller for logging even though the returned value is a trait object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Busy,
    Readiness,
    Uring,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Busy => "busy",
            BackendKind::Readiness => "readiness",
            BackendKind::Uring => "uring",
        }
    }
}

/// Construct the backend named by `name` ("busy", "readiness", "uring", or
/// `""` for auto-select), sized for up to `capacity` in-flight jobs and,
/// for the busy-loop backend, bounded by `op_timeout` per operation.
///
/// An explicitly named "readiness" or "uring" backend is valid, spec-legal
/// input regardless of whether the running kernel actually supports it —
/// `RuntimeConfig::validate` accepts either name unconditionally. If
/// construction fails (e.g. `epoll_create1` under fd pressure, or
/// `io_uring` unsupported), that failure is returned as an `RtError`
/// rather than panicking; only `auto` falls back silently to a backend the
/// kernel does support.
pub fn select(name: &str, capacity: usize, op_timeout: Option<Duration>) -> RtResult<(BackendKind, Box<dyn AioBackend>)> {
    match name {
        "busy" => Ok((BackendKind::Busy, Box::new(BusyBackend::new(op_timeout)))),
        "readiness" => {
            let backend = ReadinessBackend::new(capacity).map_err(RtError::from)?;
            Ok((BackendKind::Readiness, Box::new(backend)))
        }
        "uring" => {
            let backend = UringBackend::new(capacity as u32).map_err(RtError::from)?;
            Ok((BackendKind::Uring, Box::new(backend)))
        }
        _ => Ok(auto_select(capacity, op_timeout)),
    }
}

fn auto_select(capacity: usize, op_timeout: Option<Duration>) -> (BackendKind, Box<dyn AioBackend>) {
    if crate::uring::is_available() {
        if let Ok(backend) = UringBackend::new(capacity as u32) {
            rtinfo!("auto-selected uring backend");
            return (BackendKind::Uring, Box::new(backend));
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Ok(backend) = ReadinessBackend::new(capacity) {
            rtinfo!("auto-selected readiness backend");
            return (BackendKind::Readiness, Box::new(backend));
        }
    }
    rtinfo!("auto-selected busy backend (no kernel-assisted backend available)");
    (BackendKind::Busy, Box::new(BusyBackend::new(op_timeout)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_select_always_succeeds() {
        let (_, backend) = select("", 64, None).unwrap();
        assert!(backend.capacity() >= 64 || backend.capacity() > 0);
    }

    #[test]
    fn explicit_busy_is_always_available() {
        let (kind, _) = select("busy", 16, Some(Duration::from_millis(10))).unwrap();
        assert_eq!(kind, BackendKind::Busy);
    }
}
