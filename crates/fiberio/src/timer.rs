//! Sleeping a frame without blocking the thread.

use crate::fallback::yield_until;
use fiberio_core::backend::Capabilities;
use fiberio_core::error::RtResult;
use fiberio_core::job::AioOp;
use fiberio_runtime::{current_capabilities, io_await};
use std::time::{Duration, Instant};

/// Suspend the current frame for `duration`. Every shipped backend
/// advertises [`Capabilities::TIMER`]; the yield-loop branch exists so a
/// future backend can omit it without breaking callers.
pub fn delay(duration: Duration) -> RtResult<()> {
    if current_capabilities().contains(Capabilities::TIMER) {
        let delay_ms = duration.as_millis().min(u128::from(u64::MAX)) as u64;
        io_await(AioOp::Timer { delay_ms })?;
        return Ok(());
    }

    let deadline = Instant::now() + duration;
    yield_until(|| {
        if Instant::now() >= deadline {
            Ok(Some(()))
        } else {
            Ok(None)
        }
    })
}
