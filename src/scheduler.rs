//! # Scheduler
//!
//! The kernel context: task table, dispatch list, semaphore and FIFO
//! arenas, tick source, and CPU-load state. One instance is the whole
//! kernel; [`crate::kernel`] wraps a global one for firmware use, while
//! hosts and tests drive an instance directly.
//!
//! ## Dispatch
//!
//! [`Scheduler::run`] is an endless loop over [`Scheduler::step`]. Each
//! step examines the task under the cursor; a task runs when it is
//! `Ready` and at least `sleep_ticks` have passed since its last
//! activation (wrap-safe 16-bit comparison). Before the body is invoked,
//! `sleep_ticks` is reset to 0: **a body that returns without calling a
//! suspension primitive is re-scheduled on the very next pass with no
//! delay**; every delay must be reasserted on every run.
//!
//! After a task runs, the cursor returns to the head of the list
//! (priority policy): a higher-priority ready task always runs before a
//! lower one, and equal-priority tasks interleave in list order when none
//! is sleeping. Under [`Policy::RoundRobin`] the cursor advances instead,
//! giving a plain carousel with the same eligibility test.
//!
//! The dispatch path never mutates the list. Creation, deletion,
//! priority changes, suspend/resume, and the reaping of a finished task
//! all happen outside the cursor walk.

use alloc::boxed::Box;
use core::any::Any;

use crate::arena::Arena;
use crate::config::{
    APP_PRIO_MAX, APP_PRIO_MIN, IDLE_TASK_PRIO, LOAD_TASK_PRIO, MAX_SLEEP_TICKS,
};
use crate::fifo::Fifo;
use crate::list::TaskList;
use crate::load;
use crate::sem::Semaphore;
use crate::task::{Task, TaskBody, TaskId, TaskState};
use crate::time::{Tick, TickSource};
use crate::KernelError;

// ---------------------------------------------------------------------------
// Scheduling policy
// ---------------------------------------------------------------------------

/// Cursor discipline of the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Restart from the head after every executed task. Strict priority
    /// preference; the default.
    Priority,
    /// Keep walking after an executed task. The CPU-load estimate is
    /// meaningless in this mode but everything still operates.
    RoundRobin,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// The kernel context. Owns every task, semaphore, and FIFO.
pub struct Scheduler {
    clock: TickSource,
    policy: Policy,
    pub(crate) tasks: Arena<Task>,
    pub(crate) list: TaskList,
    cursor: usize,
    pub(crate) sems: Arena<Semaphore>,
    pub(crate) fifos: Arena<Fifo>,
    idle_task: TaskId,
    load_task: TaskId,
    /// Decremented by the idle task, reloaded by the load-measure task.
    pub(crate) load_counter: u8,
    /// Last published load reading.
    pub(crate) cpu_load_pct: u8,
}

impl Scheduler {
    /// Build a kernel with the default priority policy. Installs the two
    /// built-in tasks (idle at priority 0, load-measure at 255), so the
    /// task list is never empty afterwards.
    pub fn new(clock: TickSource) -> Self {
        Self::with_policy(clock, Policy::Priority)
    }

    /// Build a kernel with an explicit dispatch policy.
    pub fn with_policy(clock: TickSource, policy: Policy) -> Self {
        let now = clock();
        let mut tasks = Arena::new();
        let mut list = TaskList::new();
        let builtin = |tasks: &mut Arena<Task>, list: &mut TaskList, prio, body: TaskBody| {
            let id = TaskId(tasks.insert(Task::new(prio, None, body, now)));
            if list.insert(id).is_err() {
                panic!("task list allocation failed at boot");
            }
            id
        };
        let idle_task = builtin(&mut tasks, &mut list, IDLE_TASK_PRIO, load::idle_body);
        let load_task = builtin(&mut tasks, &mut list, LOAD_TASK_PRIO, load::load_measure_body);
        list.sort_by_prio_desc(&tasks);
        Self {
            clock,
            policy,
            tasks,
            list,
            cursor: 0,
            sems: Arena::new(),
            fifos: Arena::new(),
            idle_task,
            load_task,
            load_counter: crate::config::LOAD_COUNTER_RELOAD,
            cpu_load_pct: 0,
        }
    }

    /// Current tick from the platform source.
    #[inline]
    pub fn now(&self) -> Tick {
        (self.clock)()
    }

    // -----------------------------------------------------------------------
    // Task lifecycle
    // -----------------------------------------------------------------------

    /// Create a task and insert it into the dispatch list.
    ///
    /// The record is prepended and the list re-sorted; with the stable
    /// sort this places the new task ahead of existing tasks of equal
    /// priority. Priorities 0 and 255 are reserved for the built-in
    /// tasks.
    pub fn create_task(
        &mut self,
        prio: u8,
        user_data: Option<Box<dyn Any>>,
        body: TaskBody,
    ) -> Result<TaskId, KernelError> {
        if !(APP_PRIO_MIN..=APP_PRIO_MAX).contains(&prio) {
            return Err(KernelError::RangeError);
        }
        let now = (self.clock)();
        let id = TaskId(
            self.tasks
                .try_insert(Task::new(prio, user_data, body, now))
                .map_err(|_| KernelError::AllocationFailed)?,
        );
        if self.list.insert(id).is_err() {
            self.tasks.remove(id.0);
            return Err(KernelError::AllocationFailed);
        }
        self.list.sort_by_prio_desc(&self.tasks);
        Ok(id)
    }

    /// Remove a task from the list and free its record. A task blocked on
    /// a semaphore is first withdrawn from the waiter list, returning the
    /// count it claimed. Deleting the built-in tasks is refused.
    pub fn delete_task(&mut self, id: TaskId) -> Result<(), KernelError> {
        if id == self.idle_task || id == self.load_task {
            return Err(KernelError::RangeError);
        }
        if !self.tasks.contains(id.0) {
            return Err(KernelError::TaskNotFound);
        }
        self.cancel_wait(id);
        self.tasks.remove(id.0);
        self.list.remove(id);
        Ok(())
    }

    /// Take a task out of dispatch until [`Scheduler::resume_task`]. A
    /// blocked task is withdrawn from its waiter list first, cancelling
    /// the wait.
    pub fn suspend_task(&mut self, id: TaskId) -> Result<(), KernelError> {
        self.cancel_wait(id);
        match self.tasks.get_mut(id.0) {
            Some(t) => {
                t.state = TaskState::Suspended;
                Ok(())
            }
            None => Err(KernelError::TaskNotFound),
        }
    }

    /// Put a suspended task back into dispatch. A task that is not
    /// suspended is left untouched.
    pub fn resume_task(&mut self, id: TaskId) -> Result<(), KernelError> {
        match self.tasks.get_mut(id.0) {
            Some(t) => {
                if t.state == TaskState::Suspended {
                    t.state = TaskState::Ready;
                }
                Ok(())
            }
            None => Err(KernelError::TaskNotFound),
        }
    }

    /// Change a task's priority and re-sort the list. Reserved values are
    /// refused.
    pub fn set_task_prio(&mut self, id: TaskId, prio: u8) -> Result<(), KernelError> {
        if !(APP_PRIO_MIN..=APP_PRIO_MAX).contains(&prio) {
            return Err(KernelError::RangeError);
        }
        match self.tasks.get_mut(id.0) {
            Some(t) => t.prio = prio,
            None => return Err(KernelError::TaskNotFound),
        }
        self.list.sort_by_prio_desc(&self.tasks);
        Ok(())
    }

    /// Number of tasks in the list, built-ins included.
    #[inline]
    pub fn task_count(&self) -> usize {
        self.list.len()
    }

    /// Dispatch state of a task.
    pub fn task_state(&self, id: TaskId) -> Result<TaskState, KernelError> {
        self.tasks
            .get(id.0)
            .map(|t| t.state)
            .ok_or(KernelError::TaskNotFound)
    }

    /// Priority of a task.
    pub fn task_prio(&self, id: TaskId) -> Result<u8, KernelError> {
        self.tasks
            .get(id.0)
            .map(|t| t.prio)
            .ok_or(KernelError::TaskNotFound)
    }

    /// Handle of the built-in idle task.
    #[inline]
    pub fn idle_task(&self) -> TaskId {
        self.idle_task
    }

    /// Handle of the built-in load-measure task.
    #[inline]
    pub fn load_task(&self) -> TaskId {
        self.load_task
    }

    // -----------------------------------------------------------------------
    // Re-entry protocol
    // -----------------------------------------------------------------------

    /// The arm of the body to (re-)enter; 0 at the start of life.
    #[inline]
    pub fn resume_point(&self, id: TaskId) -> u16 {
        self.tasks.get(id.0).map_or(0, |t| t.resume_point)
    }

    /// Record the next arm without suspending. Used for transitions that
    /// stay inside one invocation of the body.
    pub fn set_resume_point(&mut self, id: TaskId, resume: u16) {
        if let Some(t) = self.tasks.get_mut(id.0) {
            t.resume_point = resume;
        }
    }

    /// Suspension primitive: give the CPU back, stay eligible. The body
    /// must `return` right after. Equivalent to a sleep of 0.
    pub fn yield_now(&mut self, id: TaskId, resume: u16) {
        self.sleep(id, 0, resume);
    }

    /// Suspension primitive: decline to run for `ticks` ticks, then
    /// re-enter the body at `resume`. The body must `return` right after.
    ///
    /// Sleeps of 0x8000 ticks or more cannot be represented in the 16-bit
    /// comparison; debug builds assert.
    pub fn sleep(&mut self, id: TaskId, ticks: Tick, resume: u16) {
        debug_assert!(ticks < MAX_SLEEP_TICKS, "sleep_ticks must stay below 0x8000");
        if let Some(t) = self.tasks.get_mut(id.0) {
            t.sleep_ticks = ticks;
            t.resume_point = resume;
        }
    }

    /// Suspension primitive: terminal. The record is destroyed after the
    /// body returns; the handle goes stale at that point.
    pub fn end(&mut self, id: TaskId) {
        if let Some(t) = self.tasks.get_mut(id.0) {
            t.resume_point = 0;
            t.finished = true;
        }
    }

    /// Borrow the task's private state, downcast to `T`. `None` for a
    /// stale handle, absent data, or a type mismatch.
    pub fn user_data_mut<T: 'static>(&mut self, id: TaskId) -> Option<&mut T> {
        self.tasks
            .get_mut(id.0)?
            .user_data
            .as_mut()?
            .downcast_mut::<T>()
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// One iteration of the dispatch loop. Returns the task that ran, if
    /// one did.
    ///
    /// `sleep_ticks` is zeroed before control transfers into the body;
    /// see the module documentation for the consequences.
    pub fn step(&mut self) -> Option<TaskId> {
        debug_assert!(self.list.root().is_some(), "task list empty at dispatch");
        if self.cursor >= self.list.len() {
            self.cursor = 0;
        }
        let id = self.list.get(self.cursor)?;
        let now = (self.clock)();

        let body = match self.tasks.get_mut(id.0) {
            Some(t) if t.is_due(now) => {
                t.last_activation = now;
                t.sleep_ticks = 0;
                t.body
            }
            _ => {
                // not eligible: check the next task, ring-wrapping
                self.cursor += 1;
                if self.cursor >= self.list.len() {
                    self.cursor = 0;
                }
                return None;
            }
        };

        body(self, id);

        // reap a task whose body ran past its final suspension point
        if self.tasks.get(id.0).is_some_and(|t| t.finished) {
            self.tasks.remove(id.0);
            self.list.remove(id);
        }

        self.cursor = match self.policy {
            Policy::Priority => 0,
            Policy::RoundRobin => self.cursor + 1,
        };
        Some(id)
    }

    /// The scheduler proper: dispatch forever.
    pub fn run(&mut self) -> ! {
        loop {
            self.step();
        }
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    /// Withdraw a task from whichever waiter list holds it, handing the
    /// claimed count back so `-count` keeps matching the waiter count.
    pub(crate) fn cancel_wait(&mut self, id: TaskId) {
        let blocked = self
            .tasks
            .get(id.0)
            .is_some_and(|t| t.state == TaskState::Blocked);
        if !blocked {
            return;
        }
        for (_, sem) in self.sems.iter_mut() {
            if sem.withdraw(id) {
                break;
            }
        }
        if let Some(t) = self.tasks.get_mut(id.0) {
            t.state = TaskState::Ready;
            t.resumed = false;
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
