//! Architecture-specific context switching.
//!
//! Every target exposes the same four items: [`SavedRegs`] (the callee-saved
//! register set preserved across a voluntary switch), `init_context`,
//! `context_switch`, and `entry_trampoline`. The scheduler and frame layers
//! are written entirely against this surface and never reference register
//! names directly.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        mod x86_64;
        pub use self::x86_64::*;
    } else if #[cfg(target_arch = "aarch64")] {
        mod aarch64;
        pub use self::aarch64::*;
    } else {
        compile_error!("fiberio-runtime: unsupported target architecture");
    }
}
