//! Thread-local "current task" context.
//!
//! Each OS thread drives at most one [`crate::Scheduler`] in `single` mode,
//! or one of several independent runtimes in `auto` mode — either way,
//! exactly one frame is ever running on a given thread at a time. This
//! module gives I/O code a way to find "the frame that's currently running
//! here" without threading a handle through every call.

use fiberio_core::id::TaskId;
use std::cell::Cell;

thread_local! {
    static CURRENT_TASK: Cell<u32> = const { Cell::new(fiberio_core::constants::TASK_NONE) };
    static FRAME_BASE: Cell<*mut u8> = const { Cell::new(std::ptr::null_mut()) };
}

/// Record which frame is now running on this thread, along with a pointer
/// to its frame-local state (used by the arch layer to locate saved
/// registers without a second lookup through the task table).
#[inline]
pub fn set_current(id: TaskId, base: *mut u8) {
    CURRENT_TASK.with(|cell| cell.set(id.as_u32()));
    FRAME_BASE.with(|cell| cell.set(base));
}

/// Clear the current frame (the scheduler loop is between frames).
#[inline]
pub fn clear_current() {
    CURRENT_TASK.with(|cell| cell.set(fiberio_core::constants::TASK_NONE));
    FRAME_BASE.with(|cell| cell.set(std::ptr::null_mut()));
}

/// The frame currently running on this thread, if any.
#[inline]
pub fn current() -> TaskId {
    TaskId::new(CURRENT_TASK.with(|cell| cell.get()))
}

/// Pointer to the currently running frame's base, if any.
#[inline]
pub fn current_base() -> *mut u8 {
    FRAME_BASE.with(|cell| cell.get())
}

/// Whether a frame is currently running on this thread.
#[inline]
pub fn is_in_frame() -> bool {
    current().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear() {
        clear_current();
        assert!(!is_in_frame());
        assert!(current_base().is_null());
    }

    #[test]
    fn set_and_clear_roundtrip() {
        let marker: u8 = 0;
        set_current(TaskId::new(7), &marker as *const u8 as *mut u8);
        assert!(is_in_frame());
        assert_eq!(current(), TaskId::new(7));
        clear_current();
        assert!(!is_in_frame());
    }
}
