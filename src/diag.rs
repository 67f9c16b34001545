//! # Diagnostics
//!
//! Human-oriented views of kernel state, written through any
//! `core::fmt::Write` sink the platform supplies (a serial console, a
//! capture buffer, a `String` in tests). Entirely optional: a platform
//! without a sink simply never calls in here, and scheduling is
//! unaffected either way.

use core::fmt::{self, Write};

use crate::scheduler::Scheduler;

/// Crate version, for boot banners.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

impl Scheduler {
    /// Dump the task list in dispatch order, one line per task: handle,
    /// state, priority, resume point. Handles match the values returned
    /// by `create_task`, so dump lines correlate with application tasks.
    pub fn dump_task_list(&self, w: &mut dyn Write) -> fmt::Result {
        writeln!(w, "task list ({} tasks):", self.list.len())?;
        for id in self.list.iter() {
            match self.tasks.get(id.0) {
                Some(t) => writeln!(
                    w,
                    "  task {}  prio {:>3}  {:<9}  resume {}",
                    id, t.prio, t.state, t.resume_point
                )?,
                None => writeln!(w, "  task {}  <gone>", id)?,
            }
        }
        writeln!(
            w,
            "sync objects: {} semaphores, {} fifos",
            self.sems.len(),
            self.fifos.len()
        )
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskId;
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
    fn dump_lists_every_task_in_dispatch_order() {
        let mut k = Scheduler::new(clock);
        let id = k.create_task(42, None, nop).unwrap();
        let mut out = String::new();
        k.dump_task_list(&mut out).unwrap();
        assert!(out.starts_with("task list (3 tasks):"));
        assert!(out.contains(&format!("task {}  prio  42  ready", id)));
        // priority order: load-measure, app task, idle
        let load_line = out.find("prio 255").unwrap();
        let app_line = out.find("prio  42").unwrap();
        let idle_line = out.find("prio   0").unwrap();
        assert!(load_line < app_line && app_line < idle_line);
    }

    #[test]
    fn version_is_nonempty() {
        assert!(!version().is_empty());
    }
}
