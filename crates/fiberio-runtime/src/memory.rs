//! Per-frame stack allocation.
//!
//! Each frame gets its own `mmap` region: one `PROT_NONE` guard page
//! followed by the usable stack. Stacks on every arch this runtime targets
//! grow down from `top()` towards `base`, so the guard page sits at the
//! *low* end of the mapping — the end an overrun actually reaches.
//! Overrunning the stack faults with `SIGSEGV` inside the guard page
//! rather than corrupting whatever happens to be mapped just before this
//! allocation. A plain `mmap`/`munmap` pair per frame, rather than one
//! giant upfront-reserved region activated/deactivated via `mprotect` —
//! there's no fixed slot table size to reserve against up front, since
//! task slots here are allocated and recycled one at a time rather than
//! addressed by a shared base + stride.

use fiberio_core::constants::GUARD_SIZE;
use std::io;

/// A single frame's stack: a leading guard page followed by `len` usable
/// bytes.
pub struct FrameStack {
    base: *mut u8,
    len: usize,
    mapped_len: usize,
}

// Safety: the mapping is exclusively owned by the `FrameStack` that holds
// it; moving a `FrameStack` across threads is safe, only concurrent access
// to the same instance is not (and nothing here offers shared access).
unsafe impl Send for FrameStack {}

impl FrameStack {
    /// Allocate a new stack of at least `requested_len` usable bytes,
    /// rounded up to the page size, with a trailing guard page.
    pub fn new(requested_len: usize) -> io::Result<Self> {
        let page_size = page_size();
        let usable_len = round_up(requested_len.max(page_size), page_size);
        let mapped_len = usable_len + GUARD_SIZE;

        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                mapped_len,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let base = base as *mut u8;

        // Usable region is the upper `usable_len` bytes; the leading
        // `GUARD_SIZE` bytes stay `PROT_NONE` from the initial mmap.
        let usable_base = unsafe { base.add(GUARD_SIZE) };
        let ret = unsafe {
            libc::mprotect(usable_base as *mut libc::c_void, usable_len, libc::PROT_READ | libc::PROT_WRITE)
        };
        if ret != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::munmap(base as *mut libc::c_void, mapped_len) };
            return Err(err);
        }

        Ok(Self { base, len: usable_len, mapped_len })
    }

    /// Highest valid stack address (stacks grow down on every arch this
    /// runtime targets). Callers must additionally align this down to the
    /// ABI's required boundary before using it as an initial `rsp`.
    #[inline]
    pub fn top(&self) -> *mut u8 {
        unsafe { self.base.add(self.mapped_len) }
    }

    /// Usable stack size in bytes (excludes the guard page).
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }
}

impl Drop for FrameStack {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.mapped_len);
        }
    }
}

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

fn round_up(value: usize, multiple: usize) -> usize {
    (value + multiple - 1) / multiple * multiple
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_and_frees() {
        let stack = FrameStack::new(16 * 1024).unwrap();
        assert!(stack.len() >= 16 * 1024);
        assert!(!stack.top().is_null());
    }

    #[test]
    fn rounds_up_to_page_size() {
        let stack = FrameStack::new(1).unwrap();
        assert_eq!(stack.len() % page_size(), 0);
    }

    #[test]
    fn many_stacks_do_not_alias() {
        let a = FrameStack::new(4096).unwrap();
        let b = FrameStack::new(4096).unwrap();
        assert_ne!(a.base, b.base);
    }
}
