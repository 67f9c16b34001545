//! # FIFO Mailbox
//!
//! A bounded queue of fixed-size byte slots with blocking producer and
//! consumer semantics, composed from two semaphores over one circular
//! buffer:
//!
//! - `write_sem`, initialized to the slot count, counts free slots;
//! - `read_sem`, initialized to 0, counts filled slots.
//!
//! `fifo_write` waits on `write_sem` and signals `read_sem`; `fifo_read`
//! does the opposite. A full mailbox therefore blocks writers and an
//! empty one blocks readers, with release order inherited from the
//! semaphores (LIFO among blocked peers).
//!
//! The mailbox is byte-granular and type-opaque: callers pick a
//! `slot_size` matching the layout of whatever they store and get the
//! same bytes back in FIFO order.

use alloc::vec::Vec;
use core::fmt;

use crate::arena::Handle;
use crate::scheduler::Scheduler;
use crate::sem::{Progress, SemId};
use crate::task::TaskId;
use crate::KernelError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Handle to a FIFO mailbox. Stale after `fifo_destroy`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FifoId(pub(crate) Handle);

impl fmt::Display for FifoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0.index(), self.0.gen())
    }
}

/// Circular slot buffer plus its two pacing semaphores.
pub(crate) struct Fifo {
    buf: Vec<u8>,
    slot_size: u8,
    slot_count: u8,
    read_idx: u8,
    write_idx: u8,
    used_slots: u8,
    read_sem: SemId,
    write_sem: SemId,
}

impl Fifo {
    #[inline]
    fn slot(&mut self, idx: u8) -> &mut [u8] {
        let size = self.slot_size as usize;
        let start = idx as usize * size;
        &mut self.buf[start..start + size]
    }

    /// Copy one slot in and advance the write side.
    fn push(&mut self, data: &[u8]) {
        let idx = self.write_idx;
        self.slot(idx).copy_from_slice(data);
        self.write_idx = (self.write_idx + 1) % self.slot_count;
        self.used_slots += 1;
    }

    /// Copy one slot out and advance the read side.
    fn pop(&mut self, out: &mut [u8]) {
        let idx = self.read_idx;
        out.copy_from_slice(self.slot(idx));
        self.read_idx = (self.read_idx + 1) % self.slot_count;
        self.used_slots -= 1;
    }
}

// ---------------------------------------------------------------------------
// Kernel operations
// ---------------------------------------------------------------------------

impl Scheduler {
    /// Create a mailbox of `slot_count` slots of `slot_size` bytes each.
    /// Both parameters must be in 1..=255.
    pub fn fifo_create(&mut self, slot_size: u8, slot_count: u8) -> Result<FifoId, KernelError> {
        if slot_size == 0 || slot_count == 0 {
            return Err(KernelError::RangeError);
        }
        let bytes = slot_size as usize * slot_count as usize;
        let mut buf = Vec::new();
        if buf.try_reserve_exact(bytes).is_err() {
            return Err(KernelError::AllocationFailed);
        }
        buf.resize(bytes, 0);

        let read_sem = self.sem_create(0)?;
        // the signed count saturates at 127; mailboxes wider than that
        // pace writers at 127 in-flight free slots (inherited limitation)
        let write_sem = match self.sem_create(i8::try_from(slot_count).unwrap_or(i8::MAX)) {
            Ok(s) => s,
            Err(e) => {
                let _ = self.sem_destroy(read_sem);
                return Err(e);
            }
        };

        match self.fifos.try_insert(Fifo {
            buf,
            slot_size,
            slot_count,
            read_idx: 0,
            write_idx: 0,
            used_slots: 0,
            read_sem,
            write_sem,
        }) {
            Ok(h) => Ok(FifoId(h)),
            Err(_) => {
                let _ = self.sem_destroy(read_sem);
                let _ = self.sem_destroy(write_sem);
                Err(KernelError::AllocationFailed)
            }
        }
    }

    /// Destroy a mailbox: frees the buffer and both sub-semaphores.
    /// Tasks still blocked on it are treated as by [`Scheduler::sem_destroy`].
    pub fn fifo_destroy(&mut self, fifo: FifoId) -> Result<(), KernelError> {
        let f = self.fifos.remove(fifo.0).ok_or(KernelError::Uninitialized)?;
        let _ = self.sem_destroy(f.read_sem);
        let _ = self.sem_destroy(f.write_sem);
        Ok(())
    }

    /// Blocking write. Must be invoked directly in the body of task `id`,
    /// with `resume` naming the arm containing this very call.
    ///
    /// Waits for a free slot (possibly blocking: on `Progress::Blocked`
    /// the body must return; the re-executed call finishes the write),
    /// copies `data` into the slot, and signals the read side.
    /// `data.len()` must equal the slot size.
    pub fn fifo_write(
        &mut self,
        id: TaskId,
        fifo: FifoId,
        data: &[u8],
        resume: u16,
    ) -> Result<Progress, KernelError> {
        let (write_sem, read_sem) = {
            let f = self.fifos.get(fifo.0).ok_or(KernelError::Uninitialized)?;
            if data.len() != f.slot_size as usize {
                return Err(KernelError::RangeError);
            }
            (f.write_sem, f.read_sem)
        };
        if self.sem_wait(id, write_sem, resume)?.is_blocked() {
            return Ok(Progress::Blocked);
        }
        if let Some(f) = self.fifos.get_mut(fifo.0) {
            f.push(data);
        }
        self.sem_signal(read_sem)?;
        Ok(Progress::Complete)
    }

    /// Blocking read, symmetric to [`Scheduler::fifo_write`]: waits for a
    /// filled slot, copies it into `out`, signals the write side.
    /// `out.len()` must equal the slot size.
    pub fn fifo_read(
        &mut self,
        id: TaskId,
        fifo: FifoId,
        out: &mut [u8],
        resume: u16,
    ) -> Result<Progress, KernelError> {
        let (read_sem, write_sem) = {
            let f = self.fifos.get(fifo.0).ok_or(KernelError::Uninitialized)?;
            if out.len() != f.slot_size as usize {
                return Err(KernelError::RangeError);
            }
            (f.read_sem, f.write_sem)
        };
        if self.sem_wait(id, read_sem, resume)?.is_blocked() {
            return Ok(Progress::Blocked);
        }
        if let Some(f) = self.fifos.get_mut(fifo.0) {
            f.pop(out);
        }
        self.sem_signal(write_sem)?;
        Ok(Progress::Complete)
    }

    /// Non-blocking write: transfers one slot if space is free right now.
    /// Never suspends; callable from anywhere. Returns the number of
    /// slots transferred (0 or 1).
    pub fn fifo_try_write(&mut self, fifo: FifoId, data: &[u8]) -> Result<u8, KernelError> {
        let (write_sem, read_sem) = {
            let f = self.fifos.get(fifo.0).ok_or(KernelError::Uninitialized)?;
            if data.len() != f.slot_size as usize {
                return Err(KernelError::RangeError);
            }
            (f.write_sem, f.read_sem)
        };
        // claim a free slot only if one is available without blocking
        {
            let s = self
                .sems
                .get_mut(write_sem.0)
                .ok_or(KernelError::Uninitialized)?;
            if s.count <= 0 {
                return Ok(0);
            }
            s.count -= 1;
        }
        if let Some(f) = self.fifos.get_mut(fifo.0) {
            f.push(data);
        }
        self.sem_signal(read_sem)?;
        Ok(1)
    }

    /// Non-blocking read counterpart of [`Scheduler::fifo_try_write`].
    pub fn fifo_try_read(&mut self, fifo: FifoId, out: &mut [u8]) -> Result<u8, KernelError> {
        let (read_sem, write_sem) = {
            let f = self.fifos.get(fifo.0).ok_or(KernelError::Uninitialized)?;
            if out.len() != f.slot_size as usize {
                return Err(KernelError::RangeError);
            }
            (f.read_sem, f.write_sem)
        };
        {
            let s = self
                .sems
                .get_mut(read_sem.0)
                .ok_or(KernelError::Uninitialized)?;
            if s.count <= 0 {
                return Ok(0);
            }
            s.count -= 1;
        }
        if let Some(f) = self.fifos.get_mut(fifo.0) {
            f.pop(out);
        }
        self.sem_signal(write_sem)?;
        Ok(1)
    }

    /// No filled slots?
    pub fn fifo_is_empty(&self, fifo: FifoId) -> Result<bool, KernelError> {
        self.fifo_ref(fifo).map(|f| f.used_slots == 0)
    }

    /// No free slots?
    pub fn fifo_is_full(&self, fifo: FifoId) -> Result<bool, KernelError> {
        self.fifo_ref(fifo).map(|f| f.used_slots == f.slot_count)
    }

    /// Number of filled slots.
    pub fn fifo_used_slots(&self, fifo: FifoId) -> Result<u8, KernelError> {
        self.fifo_ref(fifo).map(|f| f.used_slots)
    }

    /// Capacity in slots.
    pub fn fifo_max_slots(&self, fifo: FifoId) -> Result<u8, KernelError> {
        self.fifo_ref(fifo).map(|f| f.slot_count)
    }

    /// Slot size in bytes.
    pub fn fifo_slot_size(&self, fifo: FifoId) -> Result<u8, KernelError> {
        self.fifo_ref(fifo).map(|f| f.slot_size)
    }

    #[inline]
    fn fifo_ref(&self, fifo: FifoId) -> Result<&Fifo, KernelError> {
        self.fifos.get(fifo.0).ok_or(KernelError::Uninitialized)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskState;
    use crate::time::Tick;
    use std::cell::Cell;

    std::thread_local! {
        static NOW: Cell<Tick> = const { Cell::new(0) };
    }

    fn clock() -> Tick {
        NOW.with(|c| c.get())
    }

    fn nop(_: &mut Scheduler, _: TaskId) {}

    #[test]
    fn creation_validates_ranges() {
        let mut k = Scheduler::new(clock);
        assert_eq!(k.fifo_create(0, 4), Err(KernelError::RangeError));
        assert_eq!(k.fifo_create(4, 0), Err(KernelError::RangeError));
        let q = k.fifo_create(4, 3).unwrap();
        assert_eq!(k.fifo_slot_size(q).unwrap(), 4);
        assert_eq!(k.fifo_max_slots(q).unwrap(), 3);
        assert!(k.fifo_is_empty(q).unwrap());
        assert!(!k.fifo_is_full(q).unwrap());
    }

    #[test]
    fn try_ops_move_single_slots() {
        let mut k = Scheduler::new(clock);
        let q = k.fifo_create(2, 2).unwrap();
        assert_eq!(k.fifo_try_write(q, &[1, 2]).unwrap(), 1);
        assert_eq!(k.fifo_try_write(q, &[3, 4]).unwrap(), 1);
        assert!(k.fifo_is_full(q).unwrap());
        assert_eq!(k.fifo_try_write(q, &[5, 6]).unwrap(), 0);
        assert_eq!(k.fifo_used_slots(q).unwrap(), 2);

        let mut out = [0u8; 2];
        assert_eq!(k.fifo_try_read(q, &mut out).unwrap(), 1);
        assert_eq!(out, [1, 2]);
        assert_eq!(k.fifo_try_read(q, &mut out).unwrap(), 1);
        assert_eq!(out, [3, 4]);
        assert_eq!(k.fifo_try_read(q, &mut out).unwrap(), 0);
        assert!(k.fifo_is_empty(q).unwrap());
    }

    #[test]
    fn slot_size_mismatch_is_a_range_error() {
        let mut k = Scheduler::new(clock);
        let id = k.create_task(5, None, nop).unwrap();
        let q = k.fifo_create(4, 2).unwrap();
        assert_eq!(k.fifo_try_write(q, &[0; 3]), Err(KernelError::RangeError));
        let mut short = [0u8; 3];
        assert_eq!(k.fifo_try_read(q, &mut short), Err(KernelError::RangeError));
        assert_eq!(
            k.fifo_write(id, q, &[0; 5], 0),
            Err(KernelError::RangeError)
        );
    }

    #[test]
    fn write_blocks_when_full_and_read_unblocks() {
        let mut k = Scheduler::new(clock);
        let w = k.create_task(5, None, nop).unwrap();
        let r = k.create_task(5, None, nop).unwrap();
        let q = k.fifo_create(1, 1).unwrap();

        assert_eq!(k.fifo_write(w, q, &[7], 0), Ok(Progress::Complete));
        assert!(k.fifo_is_full(q).unwrap());
        assert_eq!(k.fifo_write(w, q, &[8], 0), Ok(Progress::Blocked));
        assert_eq!(k.task_state(w).unwrap(), TaskState::Blocked);

        let mut out = [0u8];
        assert_eq!(k.fifo_read(r, q, &mut out, 0), Ok(Progress::Complete));
        assert_eq!(out, [7]);
        // the read signalled the write side: writer released
        assert_eq!(k.task_state(w).unwrap(), TaskState::Ready);
        // the re-executed write completes without waiting again
        assert_eq!(k.fifo_write(w, q, &[8], 0), Ok(Progress::Complete));
        assert_eq!(k.fifo_used_slots(q).unwrap(), 1);
    }

    #[test]
    fn read_blocks_when_empty_and_write_unblocks() {
        let mut k = Scheduler::new(clock);
        let w = k.create_task(5, None, nop).unwrap();
        let r = k.create_task(5, None, nop).unwrap();
        let q = k.fifo_create(1, 2).unwrap();

        let mut out = [0u8];
        assert_eq!(k.fifo_read(r, q, &mut out, 0), Ok(Progress::Blocked));
        assert_eq!(k.task_state(r).unwrap(), TaskState::Blocked);

        assert_eq!(k.fifo_write(w, q, &[9], 0), Ok(Progress::Complete));
        assert_eq!(k.task_state(r).unwrap(), TaskState::Ready);
        assert_eq!(k.fifo_read(r, q, &mut out, 0), Ok(Progress::Complete));
        assert_eq!(out, [9]);
        assert!(k.fifo_is_empty(q).unwrap());
    }

    #[test]
    fn wraparound_preserves_order() {
        let mut k = Scheduler::new(clock);
        let q = k.fifo_create(1, 3).unwrap();
        let mut out = [0u8];
        for round in 0u8..5 {
            assert_eq!(k.fifo_try_write(q, &[round]).unwrap(), 1);
            assert_eq!(k.fifo_try_write(q, &[round + 100]).unwrap(), 1);
            assert_eq!(k.fifo_try_read(q, &mut out).unwrap(), 1);
            assert_eq!(out, [round]);
            assert_eq!(k.fifo_try_read(q, &mut out).unwrap(), 1);
            assert_eq!(out, [round + 100]);
        }
    }

    #[test]
    fn destroy_frees_fifo_and_sub_semaphores() {
        let mut k = Scheduler::new(clock);
        let q = k.fifo_create(2, 2).unwrap();
        k.fifo_destroy(q).unwrap();
        assert_eq!(k.fifo_destroy(q), Err(KernelError::Uninitialized));
        assert_eq!(k.fifo_try_write(q, &[0, 0]), Err(KernelError::Uninitialized));
        assert_eq!(k.fifo_used_slots(q), Err(KernelError::Uninitialized));
        assert_eq!(k.sems.len(), 0);
    }
}
