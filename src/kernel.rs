//! # Global Kernel Instance
//!
//! Firmware-facing layer: one process-wide [`Scheduler`] behind a static
//! cell, plus free functions mirroring its API so application code does
//! not thread a kernel reference everywhere. [`init`] creates the
//! instance (installing the idle and load-measure tasks) and refuses to
//! run twice; every other entry point reports `Uninitialized` until it
//! has run.
//!
//! Task bodies receive `&mut Scheduler` directly from the dispatcher and
//! never come back through this module; these wrappers are for setup
//! code, ISR-adjacent glue, and diagnostics.
//!
//! Hosted code and tests can skip this module entirely and own a
//! [`Scheduler`] instance instead.

use alloc::boxed::Box;
use core::any::Any;
use core::cell::UnsafeCell;
use core::fmt;

use crate::fifo::FifoId;
use crate::scheduler::{Policy, Scheduler};
use crate::sem::SemId;
use crate::sync::critical_section;
use crate::task::{TaskBody, TaskId};
use crate::time::TickSource;
use crate::KernelError;

// ---------------------------------------------------------------------------
// The global cell
// ---------------------------------------------------------------------------

struct KernelCell(UnsafeCell<Option<Scheduler>>);

// Safety: the cell is only touched from the single main execution context
// (init/setup code and the dispatch loop); interrupts are masked for the
// short init/query accesses via critical_section.
unsafe impl Sync for KernelCell {}

static KERNEL: KernelCell = KernelCell(UnsafeCell::new(None));

/// Run `f` on the global scheduler. `Uninitialized` before [`init`].
pub fn with<R>(f: impl FnOnce(&mut Scheduler) -> R) -> Result<R, KernelError> {
    critical_section(|| {
        // Safety: single main context, interrupts masked (see KernelCell).
        let slot = unsafe { &mut *KERNEL.0.get() };
        match slot.as_mut() {
            Some(k) => Ok(f(k)),
            None => Err(KernelError::Uninitialized),
        }
    })
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Create the global kernel with the default priority policy. Installs
/// the idle and load-measure tasks. A second call is refused with
/// `RangeError`; there is exactly one kernel per process.
pub fn init(clock: TickSource) -> Result<(), KernelError> {
    init_with_policy(clock, Policy::Priority)
}

/// [`init`] with an explicit dispatch policy.
pub fn init_with_policy(clock: TickSource, policy: Policy) -> Result<(), KernelError> {
    critical_section(|| {
        // Safety: single main context, interrupts masked (see KernelCell).
        let slot = unsafe { &mut *KERNEL.0.get() };
        if slot.is_some() {
            return Err(KernelError::RangeError);
        }
        *slot = Some(Scheduler::with_policy(clock, policy));
        Ok(())
    })
}

/// Run the global scheduler's dispatch loop. Never returns.
///
/// The loop runs outside any critical section so the platform tick keeps
/// advancing while bodies execute.
pub fn run() -> ! {
    let k: *mut Scheduler = loop {
        let found = critical_section(|| {
            // Safety: single main context, interrupts masked.
            let slot = unsafe { &mut *KERNEL.0.get() };
            slot.as_mut().map(|k| k as *mut Scheduler)
        });
        if let Some(k) = found {
            break k;
        }
        // run() before init(): nothing to dispatch, keep checking
    };
    loop {
        // Safety: the pointer targets the static cell, which is only
        // mutated through init (refused from now on); dispatch stays on
        // this single context.
        unsafe { (*k).step() };
    }
}

// ---------------------------------------------------------------------------
// Task API
// ---------------------------------------------------------------------------

/// Create an application task. See [`Scheduler::create_task`].
pub fn create_task(
    prio: u8,
    user_data: Option<Box<dyn Any>>,
    body: TaskBody,
) -> Result<TaskId, KernelError> {
    with(|k| k.create_task(prio, user_data, body))?
}

/// Delete a task. See [`Scheduler::delete_task`].
pub fn delete_task(id: TaskId) -> Result<(), KernelError> {
    with(|k| k.delete_task(id))?
}

/// Suspend a task. See [`Scheduler::suspend_task`].
pub fn suspend_task(id: TaskId) -> Result<(), KernelError> {
    with(|k| k.suspend_task(id))?
}

/// Resume a suspended task. See [`Scheduler::resume_task`].
pub fn resume_task(id: TaskId) -> Result<(), KernelError> {
    with(|k| k.resume_task(id))?
}

/// Re-prioritize a task. See [`Scheduler::set_task_prio`].
pub fn set_task_prio(id: TaskId, prio: u8) -> Result<(), KernelError> {
    with(|k| k.set_task_prio(id, prio))?
}

/// Last published CPU-load estimate in percent.
pub fn cpu_load_pct() -> Result<u8, KernelError> {
    with(|k| k.cpu_load_pct())
}

// ---------------------------------------------------------------------------
// Synchronization objects
// ---------------------------------------------------------------------------

/// Create a semaphore. See [`Scheduler::sem_create`].
pub fn sem_create(initial: i8) -> Result<SemId, KernelError> {
    with(|k| k.sem_create(initial))?
}

/// Destroy a semaphore. See [`Scheduler::sem_destroy`].
pub fn sem_destroy(sem: SemId) -> Result<(), KernelError> {
    with(|k| k.sem_destroy(sem))?
}

/// Signal a semaphore. See [`Scheduler::sem_signal`]. (`sem_wait` is a
/// suspension and exists only on [`Scheduler`], reached from inside a
/// task body.)
pub fn sem_signal(sem: SemId) -> Result<(), KernelError> {
    with(|k| k.sem_signal(sem))?
}

/// Create a FIFO mailbox. See [`Scheduler::fifo_create`].
pub fn fifo_create(slot_size: u8, slot_count: u8) -> Result<FifoId, KernelError> {
    with(|k| k.fifo_create(slot_size, slot_count))?
}

/// Destroy a FIFO mailbox. See [`Scheduler::fifo_destroy`].
pub fn fifo_destroy(fifo: FifoId) -> Result<(), KernelError> {
    with(|k| k.fifo_destroy(fifo))?
}

/// Non-blocking write. See [`Scheduler::fifo_try_write`].
pub fn fifo_try_write(fifo: FifoId, data: &[u8]) -> Result<u8, KernelError> {
    with(|k| k.fifo_try_write(fifo, data))?
}

/// Non-blocking read. See [`Scheduler::fifo_try_read`].
pub fn fifo_try_read(fifo: FifoId, out: &mut [u8]) -> Result<u8, KernelError> {
    with(|k| k.fifo_try_read(fifo, out))?
}

/// Filled-slot count of a mailbox.
pub fn fifo_used_slots(fifo: FifoId) -> Result<u8, KernelError> {
    with(|k| k.fifo_used_slots(fifo))?
}

/// Does the mailbox hold no filled slots?
pub fn fifo_is_empty(fifo: FifoId) -> Result<bool, KernelError> {
    with(|k| k.fifo_is_empty(fifo))?
}

/// Does the mailbox hold no free slots?
pub fn fifo_is_full(fifo: FifoId) -> Result<bool, KernelError> {
    with(|k| k.fifo_is_full(fifo))?
}

/// Capacity of a mailbox in slots.
pub fn fifo_max_slots(fifo: FifoId) -> Result<u8, KernelError> {
    with(|k| k.fifo_max_slots(fifo))?
}

/// Slot size of a mailbox in bytes.
pub fn fifo_slot_size(fifo: FifoId) -> Result<u8, KernelError> {
    with(|k| k.fifo_slot_size(fifo))?
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Dump the task list through `w`. See [`Scheduler::dump_task_list`].
/// Sink write errors are swallowed, matching the fire-and-forget console
/// printing this exists for.
pub fn dump_task_list(w: &mut dyn fmt::Write) -> Result<(), KernelError> {
    with(|k| {
        let _ = k.dump_task_list(w);
    })
}
