//! The frame substrate: stackful coroutines built on [`crate::arch`] context
//! switching and [`crate::memory::FrameStack`] stack allocation.
//!
//! A frame's lifecycle has no separate handle type: a frame *is* a task
//! slot's stack plus saved registers (see [`crate::scheduler::TaskSlot`]).
//! This module only owns the two points where raw control transfer
//! happens — the trampoline that starts a frame running, and the landing
//! point reached when one finishes.

use crate::arch;
use crate::scheduler;
use crate::tls;
use fiberio_core::state::TaskState;

/// Called by [`arch::entry_trampoline`] with the argument stashed in
/// `r13`/`x0` by `init_context`: a pointer to a doubly-boxed closure. This
/// indirection (`Box<Box<dyn FnOnce() + Send>>`) exists because a trait
/// object is a fat pointer and can't be losslessly round-tripped through a
/// single `usize`; the outer `Box` is thin and can.
pub(crate) extern "C" fn run_entry(arg: usize) {
    let boxed: Box<Box<dyn FnOnce() + Send>> = unsafe { Box::from_raw(arg as *mut _) };
    (*boxed)();
}

/// Reached via the `call {finished}` in [`arch::entry_trampoline`] once a
/// frame's entry closure returns. Marks the owning slot `Dead` and
/// switches back to the scheduler's context. This call never returns to
/// its caller in the conventional sense — the switch lands execution back
/// at the scheduler's side of the original switch into this frame — so
/// anything after it here is unreachable.
pub(crate) extern "C" fn frame_finished() {
    let sched_ptr = scheduler::current_scheduler_ptr();
    if sched_ptr.is_null() {
        // No scheduler context to return to; nothing safe to do but park.
        loop {
            std::hint::spin_loop();
        }
    }

    let sched = unsafe { &mut *sched_ptr };
    let id = tls::current();

    if let Some(slot) = sched.slot_mut(id) {
        slot.state = TaskState::Dead;
        let frame_regs: *mut arch::SavedRegs = &mut slot.regs;
        let sched_regs = sched.scheduler_regs_ptr();
        unsafe {
            arch::context_switch(frame_regs, sched_regs);
        }
    }

    unreachable!("frame_finished: context_switch did not hand control back to the scheduler");
}
