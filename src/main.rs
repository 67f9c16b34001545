//! # Demo
//!
//! One binary, two faces:
//!
//! - On bare-metal ARM (`thumbv7em-none-eabihf` and friends) this is a
//!   minimal firmware: SysTick drives the 16-bit tick, a couple of tasks
//!   exchange readings through a FIFO mailbox, and the dispatch loop
//!   runs forever.
//! - On a host it is a bounded walkthrough of the same kernel: the tick
//!   comes from the process clock, the demo steps the dispatcher for a
//!   while, then dumps the task list and the CPU-load estimate.
//!
//! Both faces drive the exact same kernel code.

#![cfg_attr(all(target_arch = "arm", target_os = "none"), no_std)]
#![cfg_attr(all(target_arch = "arm", target_os = "none"), no_main)]

// ---------------------------------------------------------------------------
// Firmware (bare-metal ARM)
// ---------------------------------------------------------------------------

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod firmware {
    extern crate alloc;

    use alloc::boxed::Box;
    use core::mem::MaybeUninit;
    use core::ptr::addr_of_mut;
    use core::sync::atomic::{AtomicU16, Ordering};

    use cortex_m::peripheral::syst::SystClkSource;
    use cortex_m_rt::{entry, exception};
    use linked_list_allocator::LockedHeap;
    use panic_halt as _;

    use coros::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
    use coros::{kernel, ms_to_ticks, FifoId, Progress, Scheduler, TaskId, Tick};

    #[global_allocator]
    static HEAP: LockedHeap = LockedHeap::empty();

    const HEAP_SIZE: usize = 16 * 1024;
    static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];

    /// Milliseconds since boot, modulo 2^16, incremented by SysTick.
    static TICKS: AtomicU16 = AtomicU16::new(0);

    fn tick_now() -> Tick {
        TICKS.load(Ordering::Relaxed)
    }

    #[exception]
    fn SysTick() {
        TICKS.fetch_add(1, Ordering::Relaxed);
    }

    /// Sample a (fake) sensor every 50 ms and post the reading.
    fn sampler(k: &mut Scheduler, id: TaskId) {
        loop {
            match k.resume_point(id) {
                0 => {
                    let (q, reading) = match k.user_data_mut::<SamplerCtx>(id) {
                        Some(ctx) => {
                            ctx.reading = ctx.reading.wrapping_add(3);
                            (ctx.q, ctx.reading)
                        }
                        None => return,
                    };
                    match k.fifo_write(id, q, &reading.to_le_bytes(), 0) {
                        Ok(Progress::Blocked) => return,
                        Ok(Progress::Complete) => k.set_resume_point(id, 1),
                        Err(_) => return,
                    }
                }
                _ => {
                    k.sleep(id, ms_to_ticks(50), 0);
                    return;
                }
            }
        }
    }

    /// Drain readings and keep a running sum alive for the debugger.
    fn consumer(k: &mut Scheduler, id: TaskId) {
        loop {
            match k.resume_point(id) {
                0 => {
                    let q = match k.user_data_mut::<ConsumerCtx>(id) {
                        Some(ctx) => ctx.q,
                        None => return,
                    };
                    let mut slot = [0u8; 2];
                    match k.fifo_read(id, q, &mut slot, 0) {
                        Ok(Progress::Blocked) => return,
                        Ok(Progress::Complete) => {
                            let v = u16::from_le_bytes(slot);
                            if let Some(ctx) = k.user_data_mut::<ConsumerCtx>(id) {
                                ctx.sum = ctx.sum.wrapping_add(v as u32);
                            }
                            k.set_resume_point(id, 1);
                        }
                        Err(_) => return,
                    }
                }
                _ => {
                    k.yield_now(id, 0);
                    return;
                }
            }
        }
    }

    struct SamplerCtx {
        q: FifoId,
        reading: u16,
    }

    struct ConsumerCtx {
        q: FifoId,
        sum: u32,
    }

    #[entry]
    fn main() -> ! {
        // Safety: called once, before any allocation.
        unsafe {
            HEAP.lock()
                .init(addr_of_mut!(HEAP_MEM) as *mut u8, HEAP_SIZE);
        }

        if let Some(mut cp) = cortex_m::Peripherals::take() {
            let syst = &mut cp.SYST;
            syst.set_clock_source(SystClkSource::Core);
            syst.set_reload(SYSTEM_CLOCK_HZ / TICK_HZ - 1);
            syst.clear_current();
            syst.enable_counter();
            syst.enable_interrupt();
        }

        if kernel::init(tick_now).is_err() {
            loop {
                cortex_m::asm::wfi();
            }
        }
        let q = match kernel::fifo_create(2, 8) {
            Ok(q) => q,
            Err(_) => loop {
                cortex_m::asm::wfi();
            },
        };
        let _ = kernel::create_task(10, Some(Box::new(SamplerCtx { q, reading: 0 })), sampler);
        let _ = kernel::create_task(5, Some(Box::new(ConsumerCtx { q, sum: 0 })), consumer);

        kernel::run()
    }
}

// ---------------------------------------------------------------------------
// Hosted walkthrough
// ---------------------------------------------------------------------------

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
fn main() {
    use std::sync::OnceLock;
    use std::time::Instant;

    use coros::{diag, kernel, ms_to_ticks, FifoId, Progress, Scheduler, TaskId, Tick};

    static START: OnceLock<Instant> = OnceLock::new();

    fn host_clock() -> Tick {
        START.get_or_init(Instant::now).elapsed().as_millis() as Tick
    }

    struct ProducerCtx {
        q: FifoId,
        next: u8,
    }

    struct ConsumerCtx {
        q: FifoId,
        got: u8,
    }

    /// Post 0..10 into the mailbox as fast as the consumer allows.
    fn producer(k: &mut Scheduler, id: TaskId) {
        loop {
            match k.resume_point(id) {
                0 => {
                    let (q, next) = match k.user_data_mut::<ProducerCtx>(id) {
                        Some(ctx) => (ctx.q, ctx.next),
                        None => return,
                    };
                    if next >= 10 {
                        println!("[producer] done");
                        k.end(id);
                        return;
                    }
                    match k.fifo_write(id, q, &[next], 0) {
                        Ok(Progress::Blocked) => return,
                        Ok(Progress::Complete) => {
                            println!("[producer] sent {next}");
                            if let Some(ctx) = k.user_data_mut::<ProducerCtx>(id) {
                                ctx.next += 1;
                            }
                        }
                        Err(e) => {
                            eprintln!("[producer] {e}");
                            return;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    /// Drain one value every 20 ms.
    fn consumer(k: &mut Scheduler, id: TaskId) {
        loop {
            match k.resume_point(id) {
                0 => {
                    let q = match k.user_data_mut::<ConsumerCtx>(id) {
                        Some(ctx) => ctx.q,
                        None => return,
                    };
                    let mut slot = [0u8];
                    match k.fifo_read(id, q, &mut slot, 0) {
                        Ok(Progress::Blocked) => return,
                        Ok(Progress::Complete) => {
                            println!("[consumer] got {}", slot[0]);
                            if let Some(ctx) = k.user_data_mut::<ConsumerCtx>(id) {
                                ctx.got += 1;
                                if ctx.got >= 10 {
                                    println!("[consumer] done");
                                    k.end(id);
                                    return;
                                }
                            }
                            k.sleep(id, ms_to_ticks(20), 0);
                            return;
                        }
                        Err(e) => {
                            eprintln!("[consumer] {e}");
                            return;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    println!("coros {} hosted demo", diag::version());

    if let Err(e) = kernel::init(host_clock) {
        eprintln!("kernel init failed: {e}");
        return;
    }
    let demo = (|| -> Result<(), coros::KernelError> {
        let q = kernel::fifo_create(1, 2)?;
        kernel::create_task(3, Some(Box::new(ProducerCtx { q, next: 0 })), producer)?;
        kernel::create_task(3, Some(Box::new(ConsumerCtx { q, got: 0 })), consumer)?;
        Ok(())
    })();
    if let Err(e) = demo {
        eprintln!("demo setup failed: {e}");
        return;
    }

    // a bounded stand-in for kernel::run(): about half a second of work
    let deadline = Instant::now() + std::time::Duration::from_millis(500);
    while Instant::now() < deadline {
        let _ = kernel::with(|k| {
            k.step();
        });
    }

    let mut dump = String::new();
    let _ = kernel::dump_task_list(&mut dump);
    print!("{dump}");
    match kernel::cpu_load_pct() {
        Ok(pct) => println!("cpu load: {pct}%"),
        Err(e) => eprintln!("cpu load unavailable: {e}"),
    }
}
