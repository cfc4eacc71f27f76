//! x86_64 context switching via inline assembly (System V AMD64 ABI).
//!
//! Only the callee-saved registers need to survive a voluntary switch:
//! `rsp`, `rip` (captured as a return address), `rbx`, `rbp`, `r12`-`r15`.
//! Caller-saved registers are already spilled by the compiler around any
//! call, which is exactly what a voluntary switch is from the caller's
//! point of view.

use std::arch::naked_asm;

/// Callee-saved register snapshot for one frame or for the scheduler's
/// own context on the thread driving it.
#[repr(C)]
#[derive(Debug, Default)]
pub struct SavedRegs {
    pub rsp: u64,
    pub rip: u64,
    pub rbx: u64,
    pub rbp: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
}

/// Lay out `regs` so that switching to it jumps into `trampoline` with the
/// stack pointed at `stack_top`, and `entry`/`arg` preserved in `r12`/`r13`
/// for the trampoline to pick up.
///
/// # Safety
///
/// `stack_top` must be the top of a valid, exclusively owned stack
/// allocation at least large enough for `trampoline` to run.
#[inline]
pub unsafe fn init_context(regs: &mut SavedRegs, stack_top: *mut u8, entry: usize, arg: usize) {
    // System V requires rsp % 16 == 0 at a `call` instruction; our
    // trampoline is reached via `jmp` rather than `call`, so we pre-adjust
    // by 8 to land 16-byte aligned once the trampoline's own `call` fires.
    let aligned_sp = ((stack_top as usize) & !0xF) - 8;

    regs.rsp = aligned_sp as u64;
    regs.rip = entry_trampoline as usize as u64;
    regs.rbx = 0;
    regs.rbp = 0;
    regs.r12 = entry as u64;
    regs.r13 = arg as u64;
    regs.r14 = 0;
    regs.r15 = 0;
}

/// Entered via [`context_switch`] the first time a frame runs. Calls the
/// entry function stashed in `r12`/`r13` by `init_context`, then falls
/// through to `crate::frame::frame_finished` when it returns.
#[unsafe(naked)]
pub unsafe extern "C" fn entry_trampoline() {
    naked_asm!(
        "mov rdi, r13",
        "call r12",
        "call {finished}",
        "ud2",
        finished = sym crate::frame::frame_finished,
    );
}

/// Save the caller's callee-saved registers to `old`, then load and jump
/// to the registers at `new`. Returns (by jumping to the saved return
/// address) the next time something switches back into `old`.
#[unsafe(naked)]
pub unsafe extern "C" fn context_switch(_old: *mut SavedRegs, _new: *const SavedRegs) {
    naked_asm!(
        "mov [rdi + 0x00], rsp",
        "lea rax, [rip + 1f]",
        "mov [rdi + 0x08], rax",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], rbp",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], r13",
        "mov [rdi + 0x30], r14",
        "mov [rdi + 0x38], r15",
        "mov rsp, [rsi + 0x00]",
        "mov rax, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov rbp, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov r13, [rsi + 0x28]",
        "mov r14, [rsi + 0x30]",
        "mov r15, [rsi + 0x38]",
        "jmp rax",
        "1:",
        "ret",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_regs_layout_matches_asm_offsets() {
        assert_eq!(std::mem::offset_of!(SavedRegs, rsp), 0x00);
        assert_eq!(std::mem::offset_of!(SavedRegs, rip), 0x08);
        assert_eq!(std::mem::offset_of!(SavedRegs, rbx), 0x10);
        assert_eq!(std::mem::offset_of!(SavedRegs, rbp), 0x18);
        assert_eq!(std::mem::offset_of!(SavedRegs, r12), 0x20);
        assert_eq!(std::mem::offset_of!(SavedRegs, r13), 0x28);
        assert_eq!(std::mem::offset_of!(SavedRegs, r14), 0x30);
        assert_eq!(std::mem::offset_of!(SavedRegs, r15), 0x38);
    }
}
