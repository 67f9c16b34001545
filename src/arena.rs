//! # Generational Arena
//!
//! Backing store for kernel objects: a growable slot array with a
//! free-list and a per-slot generation counter. Handles are
//! `(index, generation)` pairs, so a handle to a freed-and-recycled slot
//! is detected instead of silently aliasing the new occupant. Task,
//! semaphore, and FIFO handles are all thin wrappers around [`Handle`].
//!
//! Allocation happens only at object creation; lookups on the dispatch
//! path are two bounds-checked array accesses.

use alloc::vec::Vec;

/// Index + generation pair identifying one live slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Handle {
    index: u16,
    gen: u16,
}

impl Handle {
    /// Slot index, for display purposes.
    #[inline]
    pub(crate) fn index(self) -> u16 {
        self.index
    }

    /// Slot generation, for display purposes.
    #[inline]
    pub(crate) fn gen(self) -> u16 {
        self.gen
    }
}

struct Slot<T> {
    gen: u16,
    val: Option<T>,
}

/// Slot array + free-list. Generations start at 1 and bump on every free,
/// invalidating all outstanding handles to that slot.
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u16>,
    len: usize,
}

impl<T> Arena<T> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of live entries.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Insert, aborting the process on heap exhaustion. Reserved for boot
    /// time (built-in tasks); application-driven creation goes through
    /// [`Arena::try_insert`].
    pub(crate) fn insert(&mut self, val: T) -> Handle {
        match self.try_insert(val) {
            Ok(h) => h,
            // try_insert only fails on allocation failure, which at boot
            // is unrecoverable anyway.
            Err(_) => panic!("arena allocation failed at boot"),
        }
    }

    /// Insert, reporting heap exhaustion instead of aborting.
    pub(crate) fn try_insert(&mut self, val: T) -> Result<Handle, ()> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.val = Some(val);
            self.len += 1;
            return Ok(Handle {
                index,
                gen: slot.gen,
            });
        }
        self.slots.try_reserve(1).map_err(|_| ())?;
        // keep a free-list entry allocatable for the matching remove
        self.free.try_reserve(1).map_err(|_| ())?;
        let index = self.slots.len() as u16;
        self.slots.push(Slot { gen: 1, val: Some(val) });
        self.len += 1;
        Ok(Handle { index, gen: 1 })
    }

    /// Remove and return the value, or `None` for a stale/foreign handle.
    pub(crate) fn remove(&mut self, h: Handle) -> Option<T> {
        let slot = self.slots.get_mut(h.index as usize)?;
        if slot.gen != h.gen {
            return None;
        }
        let val = slot.val.take()?;
        slot.gen = slot.gen.wrapping_add(1);
        self.free.push(h.index);
        self.len -= 1;
        Some(val)
    }

    pub(crate) fn get(&self, h: Handle) -> Option<&T> {
        let slot = self.slots.get(h.index as usize)?;
        if slot.gen != h.gen {
            return None;
        }
        slot.val.as_ref()
    }

    pub(crate) fn get_mut(&mut self, h: Handle) -> Option<&mut T> {
        let slot = self.slots.get_mut(h.index as usize)?;
        if slot.gen != h.gen {
            return None;
        }
        slot.val.as_mut()
    }

    #[inline]
    pub(crate) fn contains(&self, h: Handle) -> bool {
        self.get(h).is_some()
    }

    /// Iterate live entries mutably, in slot order.
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut T)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let gen = slot.gen;
            slot.val.as_mut().map(move |v| {
                (
                    Handle {
                        index: i as u16,
                        gen,
                    },
                    v,
                )
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
