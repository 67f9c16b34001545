//! # Kernel Configuration
//!
//! Compile-time constants governing priorities, the CPU-load estimator,
//! and the demo firmware's clock. Everything else is sized at runtime from
//! creation parameters.

use crate::time::Tick;

/// Lowest priority an application task may use. 0 is reserved for the
/// idle task.
pub const APP_PRIO_MIN: u8 = 1;

/// Highest priority an application task may use. 255 is reserved for the
/// load-measure task.
pub const APP_PRIO_MAX: u8 = 254;

/// Priority of the built-in idle task. Runs only when nothing else does.
pub const IDLE_TASK_PRIO: u8 = 0;

/// Priority of the built-in load-measure task. Outranks everything so the
/// load reading is published on schedule even under full load.
pub const LOAD_TASK_PRIO: u8 = 255;

/// Sleep period of the idle task between load-counter decrements.
pub const IDLE_PERIOD_TICKS: Tick = 10;

/// Starting value of the load counter; also the number of idle periods in
/// one measurement window, which is what calibrates the percent scale.
pub const LOAD_COUNTER_RELOAD: u8 = 100;

/// Sleep period of the load-measure task: one full measurement window.
pub const LOAD_PERIOD_TICKS: Tick = IDLE_PERIOD_TICKS * LOAD_COUNTER_RELOAD as Tick;

/// Exclusive upper bound on `sleep_ticks`. Intervals of 0x8000 ticks or
/// more read as overdue under wrapping 16-bit comparison, so longer sleeps
/// cannot be represented. Debug builds assert; release builds misbehave
/// exactly the way the comparison implies.
pub const MAX_SLEEP_TICKS: Tick = 0x8000;

/// Scheduler tick frequency for the demo firmware's SysTick setup.
pub const TICK_HZ: u32 = 1_000;

/// Core clock of the demo target (STM32F4 on the 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;
