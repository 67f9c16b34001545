//! # Task Record and Re-entry Protocol
//!
//! A task is a stackless coroutine: a plain function that the scheduler
//! calls over and over, plus a record holding everything that must survive
//! between calls. There is no per-task stack: when a task suspends, its
//! body simply returns, and the next invocation re-enters the body at the
//! arm named by the record's resume point.
//!
//! ## Writing a body
//!
//! A body is a `fn(&mut Scheduler, TaskId)` structured as a resumable
//! state machine over [`Scheduler::resume_point`]:
//!
//! ```ignore
//! fn worker(k: &mut Scheduler, id: TaskId) {
//!     loop {
//!         match k.resume_point(id) {
//!             0 => {
//!                 // ... one step of work ...
//!                 k.sleep(id, ms_to_ticks(500), 1);
//!                 return;
//!             }
//!             1 => {
//!                 // runs ≥500 ms after the arm above
//!                 match k.sem_wait(id, gate, 2) {
//!                     Ok(Progress::Blocked) => return,
//!                     _ => k.set_resume_point(id, 2),
//!                 }
//!             }
//!             _ => {
//!                 k.end(id);
//!                 return;
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! The four suspension primitives (`yield_now`, `sleep`, `end`, and
//! `sem_wait`) only take effect when the body returns, so they must be
//! invoked directly in the body frame, never from a helper the body calls.
//! State that must survive a suspension goes in the task's user data
//! ([`Scheduler::user_data_mut`]); locals die at every return.
//!
//! ## State machine
//!
//! ```text
//!   ┌──────────┐   sem_wait (count < 0)   ┌─────────┐
//!   │  Ready   │ ───────────────────────► │ Blocked │
//!   └──────────┘ ◄─────────────────────── └─────────┘
//!        ▲▼            sem_signal
//!   suspend_task / resume_task
//!   ┌───────────┐
//!   │ Suspended │   (out of dispatch until resumed)
//!   └───────────┘
//! ```

use alloc::boxed::Box;
use core::any::Any;
use core::fmt;

use crate::arena::Handle;
use crate::scheduler::Scheduler;
use crate::time::Tick;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Scheduler-visible state of a task. Only `Ready` tasks are eligible for
/// dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Eligible to run once its sleep expires.
    Ready,
    /// Removed from dispatch until `resume_task`.
    Suspended,
    /// Waiting in exactly one semaphore's waiter list.
    Blocked,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskState::Ready => "ready",
            TaskState::Suspended => "suspended",
            TaskState::Blocked => "blocked",
        })
    }
}

/// Handle to a task. Stale handles (deleted task, recycled slot) are
/// rejected with `KernelError::TaskNotFound` by every kernel operation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TaskId(pub(crate) Handle);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0.index(), self.0.gen())
    }
}

/// The function implementing a task. Receives the kernel context and the
/// task's own handle; everything a body may touch is reachable through
/// these two.
pub type TaskBody = fn(&mut Scheduler, TaskId);

// ---------------------------------------------------------------------------
// Task record
// ---------------------------------------------------------------------------

/// Per-task record. Owned by the scheduler's task table; semaphore waiter
/// lists refer to it only by [`TaskId`].
pub struct Task {
    /// Tick at which the task last ran.
    pub(crate) last_activation: Tick,

    /// Ticks after `last_activation` during which the task declines to
    /// run. Zeroed by the scheduler immediately before each invocation;
    /// a body that wants a delay must reassert it on every run.
    pub(crate) sleep_ticks: Tick,

    /// Dispatch state.
    pub(crate) state: TaskState,

    /// Priority. 1..=254 for application tasks; 0 and 255 are reserved
    /// for the idle and load-measure tasks.
    pub(crate) prio: u8,

    /// Opaque token naming the body arm to re-enter. 0 means start of
    /// function.
    pub(crate) resume_point: u16,

    /// Set by `end`; tells the dispatcher to destroy the record once the
    /// body has returned.
    pub(crate) finished: bool,

    /// Set when a semaphore releases this task. The next `sem_wait`
    /// consumes it and completes immediately: the count decremented at
    /// block time is carried across the suspension, so the re-executed
    /// wait must not decrement again.
    pub(crate) resumed: bool,

    /// Private per-task state, downcast via `Scheduler::user_data_mut`.
    pub(crate) user_data: Option<Box<dyn Any>>,

    /// The body callback.
    pub(crate) body: TaskBody,
}

impl Task {
    /// Fresh record: `Ready`, resume point 0, no pending sleep.
    pub(crate) fn new(
        prio: u8,
        user_data: Option<Box<dyn Any>>,
        body: TaskBody,
        now: Tick,
    ) -> Self {
        Self {
            last_activation: now,
            sleep_ticks: 0,
            state: TaskState::Ready,
            prio,
            resume_point: 0,
            finished: false,
            resumed: false,
            user_data,
            body,
        }
    }

    /// Eligible to run at `now`?
    #[inline]
    pub(crate) fn is_due(&self, now: Tick) -> bool {
        self.state == TaskState::Ready
            && crate::time::is_due(now, self.last_activation, self.sleep_ticks)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
