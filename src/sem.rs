//! # Counting Semaphore
//!
//! A scheduling primitive, not a mutual-exclusion primitive: there is no
//! parallelism to exclude. `wait` may block the calling task, `signal`
//! releases the most recently blocked one (LIFO: waiters are pushed and
//! popped at the same end of the list, matching the original head-of-list
//! release; starvation under contention is an accepted limitation, and
//! there is no priority inheritance).
//!
//! `wait` is the fourth suspension primitive: a blocked task's body must
//! return, and on re-entry the same `sem_wait` call completes immediately:
//! the count claimed at block time is carried across the suspension by
//! the task's `resumed` flag, so nothing is decremented twice.

use alloc::vec::Vec;
use core::fmt;

use crate::arena::Handle;
use crate::scheduler::Scheduler;
use crate::task::{TaskId, TaskState};
use crate::KernelError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Handle to a semaphore. Stale after `sem_destroy`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SemId(pub(crate) Handle);

impl fmt::Display for SemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0.index(), self.0.gen())
    }
}

/// Outcome of a potentially blocking operation.
///
/// On `Blocked` the body must `return`; the scheduler re-enters it at the
/// resume point given to the call, and the re-executed call reports
/// `Complete`.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The operation finished; fall through to the next statement.
    Complete,
    /// The task is now blocked; the body must return immediately.
    Blocked,
}

impl Progress {
    #[inline]
    pub fn is_blocked(self) -> bool {
        self == Progress::Blocked
    }
}

/// Counting semaphore with a LIFO stack of blocked tasks. The stack holds
/// handles, not records; the task table stays authoritative for
/// lifecycle.
pub(crate) struct Semaphore {
    pub(crate) count: i8,
    pub(crate) waiters: Vec<TaskId>,
}

impl Semaphore {
    pub(crate) fn new(initial: i8) -> Self {
        Self {
            count: initial,
            waiters: Vec::new(),
        }
    }

    /// Remove a specific waiter (wait cancelled by suspend/delete),
    /// handing back the count it claimed. `true` if it was here.
    pub(crate) fn withdraw(&mut self, id: TaskId) -> bool {
        if let Some(pos) = self.waiters.iter().position(|&w| w == id) {
            self.waiters.remove(pos);
            self.count = self.count.saturating_add(1);
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Kernel operations
// ---------------------------------------------------------------------------

impl Scheduler {
    /// Create a semaphore with the given initial count.
    pub fn sem_create(&mut self, initial: i8) -> Result<SemId, KernelError> {
        self.sems
            .try_insert(Semaphore::new(initial))
            .map(SemId)
            .map_err(|_| KernelError::AllocationFailed)
    }

    /// Destroy a semaphore, dropping its waiter list. Tasks still blocked
    /// on it are not touched: they stay `Blocked` until the application
    /// suspends, resumes, or deletes them.
    pub fn sem_destroy(&mut self, sem: SemId) -> Result<(), KernelError> {
        self.sems
            .remove(sem.0)
            .map(|_| ())
            .ok_or(KernelError::Uninitialized)
    }

    /// Wait on a semaphore. Must be invoked directly in the body of the
    /// task named by `id`, with `resume` naming the arm containing this
    /// very call.
    ///
    /// Decrements the count; if the result is negative the task blocks
    /// (`Progress::Blocked`, the body must return). Otherwise the count
    /// was available and the call reports `Progress::Complete`.
    pub fn sem_wait(
        &mut self,
        id: TaskId,
        sem: SemId,
        resume: u16,
    ) -> Result<Progress, KernelError> {
        let task = self.tasks.get_mut(id.0).ok_or(KernelError::TaskNotFound)?;
        // a wait resumed after sem_signal already owns its count
        if task.resumed {
            task.resumed = false;
            return Ok(Progress::Complete);
        }
        let s = self.sems.get_mut(sem.0).ok_or(KernelError::Uninitialized)?;
        s.count = s.count.saturating_sub(1);
        if s.count < 0 {
            if s.waiters.try_reserve(1).is_err() {
                s.count = s.count.saturating_add(1);
                return Err(KernelError::AllocationFailed);
            }
            s.waiters.push(id);
            task.state = TaskState::Blocked;
            task.resume_point = resume;
            Ok(Progress::Blocked)
        } else {
            Ok(Progress::Complete)
        }
    }

    /// Signal a semaphore: increment the count and release the most
    /// recently blocked waiter, if any. Not a suspension: the signaller
    /// keeps running; a higher-priority released task runs once the
    /// signaller reaches its own suspension point.
    pub fn sem_signal(&mut self, sem: SemId) -> Result<(), KernelError> {
        let s = self.sems.get_mut(sem.0).ok_or(KernelError::Uninitialized)?;
        s.count = s.count.saturating_add(1);
        if let Some(wid) = s.waiters.pop() {
            if let Some(t) = self.tasks.get_mut(wid.0) {
                t.state = TaskState::Ready;
                t.resumed = true;
            }
        }
        Ok(())
    }

    /// Current count. Negative values equal minus the number of waiters.
    pub fn sem_count(&self, sem: SemId) -> Result<i8, KernelError> {
        self.sems
            .get(sem.0)
            .map(|s| s.count)
            .ok_or(KernelError::Uninitialized)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
