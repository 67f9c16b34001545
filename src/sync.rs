//! # Critical Sections
//!
//! Guard for the global kernel cell in [`crate::kernel`]. The kernel
//! itself is strictly single-context (bodies are dispatched serially
//! from the main loop), but on bare-metal targets the tick interrupt is
//! live while the global cell is set up, so short mutations run with
//! interrupts masked. Hosts have nothing to mask and just call through.

/// Run `f` with interrupts disabled (bare-metal ARM) or directly (host).
/// Keep the closure short; the scheduler dispatch path never goes through
/// here.
#[cfg(all(target_arch = "arm", target_os = "none"))]
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    cortex_m::interrupt::free(|_| f())
}

/// Run `f` with interrupts disabled (bare-metal ARM) or directly (host).
/// Keep the closure short; the scheduler dispatch path never goes through
/// here.
#[cfg(not(all(target_arch = "arm", target_os = "none")))]
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}
