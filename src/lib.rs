//! # coros: a cooperative, stackless tasking kernel
//!
//! A tasking kernel for small single-core embedded targets: no
//! preemption, no per-task stacks, one shared execution stack. Tasks are
//! coroutines (plain functions the scheduler re-enters at a recorded
//! resume point), ordered by priority and paced by a 16-bit millisecond
//! tick the platform supplies.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     Application Tasks                     │
//! │        fn(&mut Scheduler, TaskId), state-machine body     │
//! ├───────────────────────────────────────────────────────────┤
//! │    Global instance (kernel.rs)  ·  init() · run() · …     │
//! ├──────────────┬──────────────────────┬─────────────────────┤
//! │  Scheduler   │  Synchronization     │  Built-ins          │
//! │  scheduler.rs│  sem.rs   fifo.rs    │  load.rs (idle +    │
//! │  ─ step()    │  ─ sem_wait/signal   │   load-measure)     │
//! │  ─ run()     │  ─ fifo_read/write   │  diag.rs (dump)     │
//! ├──────────────┴──────────────────────┴─────────────────────┤
//! │   Task model (task.rs) · dispatch order (list.rs)         │
//! │   TaskId · Task record · resume protocol · priority sort  │
//! ├───────────────────────────────────────────────────────────┤
//! │   arena.rs (generational storage) · time.rs (u16 ticks)   │
//! ├───────────────────────────────────────────────────────────┤
//! │   Platform: tick source (fn() -> u16) · optional console  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Model
//!
//! - **Cooperative**: a body runs until it returns; nothing interrupts
//!   it. Suspension means recording a resume point and returning.
//! - **Stackless**: no context switching, no saved registers. What must
//!   survive a suspension lives in the task record and its user data.
//! - **Priority-driven**: after every executed task the dispatcher
//!   restarts from the head of a priority-sorted list, so a
//!   higher-priority ready task always runs before a lower one. A
//!   round-robin policy is available as an alternative.
//! - **Blocking via semaphores**: counting semaphores park tasks in a
//!   LIFO waiter list; the bounded FIFO mailbox composes two of them
//!   into blocking producer/consumer transport.
//!
//! ## Limitations, by design
//!
//! - Sleeps must stay below 0x8000 ticks (the 16-bit wrap window).
//! - Semaphore release is LIFO; starvation under contention is possible.
//! - No priority inheritance, no deadlines, no timeouts on waits.
//! - `sleep_ticks` is zeroed before every body invocation: a body that
//!   returns without suspending runs again on the next pass.
//!
//! ## Memory model
//!
//! `core` + `alloc` only. Records, waiter lists, and FIFO buffers are
//! heap-allocated at creation time; the dispatch path allocates nothing.
//! Embedded binaries bring a `#[global_allocator]`; hosts get one from
//! `std`.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arena;
pub mod config;
pub mod diag;
pub mod fifo;
pub mod kernel;
pub mod list;
pub mod load;
pub mod scheduler;
pub mod sem;
pub mod sync;
pub mod task;
pub mod time;

pub use fifo::FifoId;
pub use scheduler::{Policy, Scheduler};
pub use sem::{Progress, SemId};
pub use task::{Task, TaskBody, TaskId, TaskState};
pub use time::{ms_to_ticks, Tick, TickSource};

use core::fmt;

/// Error channel of every fallible kernel operation. All variants are
/// recoverable and local to the failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Heap exhaustion during object creation.
    AllocationFailed,
    /// Stale or foreign task handle.
    TaskNotFound,
    /// Reserved priority, out-of-range FIFO geometry, mismatched slot
    /// length, deleting a built-in task, or double kernel init.
    RangeError,
    /// Operation on a destroyed or never-created object, or on the
    /// global kernel before `kernel::init`.
    Uninitialized,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KernelError::AllocationFailed => "allocation failed",
            KernelError::TaskNotFound => "task not found",
            KernelError::RangeError => "parameter out of range",
            KernelError::Uninitialized => "object not initialized",
        })
    }
}
