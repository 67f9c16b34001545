//! # CPU-Load Estimator
//!
//! Two built-in tasks approximate the busy fraction of the CPU:
//!
//! - the **idle task** (priority 0) decrements a shared counter toward 0
//!   and sleeps [`IDLE_PERIOD_TICKS`];
//! - the **load-measure task** (priority 255) publishes the counter as
//!   the load percentage, reloads it to [`LOAD_COUNTER_RELOAD`], and
//!   sleeps one full measurement window.
//!
//! When the idle task runs freely it reaches 0 between measurements →
//! reported load 0 %. When higher-priority work crowds it out entirely
//! the counter stays at 100 → reported load 100 %. The 10 ms idle period
//! and the 100× window calibrate the scale. Coarse and biased high; a
//! monitor, not a metric. Meaningless under the round-robin policy.

use crate::config::{IDLE_PERIOD_TICKS, LOAD_COUNTER_RELOAD, LOAD_PERIOD_TICKS};
use crate::scheduler::Scheduler;
use crate::task::TaskId;

/// Body of the built-in idle task.
pub(crate) fn idle_body(k: &mut Scheduler, id: TaskId) {
    k.load_counter = k.load_counter.saturating_sub(1);
    k.sleep(id, IDLE_PERIOD_TICKS, 0);
}

/// Body of the built-in load-measure task.
pub(crate) fn load_measure_body(k: &mut Scheduler, id: TaskId) {
    k.cpu_load_pct = k.load_counter;
    k.load_counter = LOAD_COUNTER_RELOAD;
    k.sleep(id, LOAD_PERIOD_TICKS, 0);
}

impl Scheduler {
    /// Last published CPU-load estimate, in percent. Updated once per
    /// measurement window (1 s at default configuration), stable in
    /// between, readable at any time.
    #[inline]
    pub fn cpu_load_pct(&self) -> u8 {
        self.cpu_load_pct
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Tick;
    use std::cell::Cell;

    std::thread_local! {
        static NOW: Cell<Tick> = const { Cell::new(0) };
    }

    fn clock() -> Tick {
        NOW.with(|c| c.get())
    }

    fn advance(d: Tick) {
        NOW.with(|c| c.set(c.get().wrapping_add(d)));
    }

    /// Drive the dispatch loop for `ticks` mock milliseconds, giving the
    /// cursor several full walks per tick.
    fn run_for(k: &mut Scheduler, ticks: Tick) {
        for _ in 0..ticks {
            for _ in 0..16 {
                k.step();
            }
            advance(1);
        }
    }

    fn busy(k: &mut Scheduler, id: TaskId) {
        k.yield_now(id, 0);
    }

    #[test]
    fn idle_system_reads_zero() {
        let mut k = Scheduler::new(clock);
        // two full windows: the first published value may still reflect
        // the initial counter, the second is steady state
        run_for(&mut k, 2 * crate::config::LOAD_PERIOD_TICKS + 2);
        assert!(k.cpu_load_pct() <= 1, "load was {}", k.cpu_load_pct());
    }

    #[test]
    fn saturated_system_reads_full() {
        let mut k = Scheduler::new(clock);
        let _hog = k.create_task(5, None, busy).unwrap();
        run_for(&mut k, 2 * crate::config::LOAD_PERIOD_TICKS + 2);
        assert_eq!(k.cpu_load_pct(), 100);
    }
}
