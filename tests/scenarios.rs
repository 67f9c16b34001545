//! End-to-end scheduling scenarios on a deterministic mock clock.
//!
//! Each test owns a [`Scheduler`] instance and drives it with
//! [`run_for`]: the dispatch cursor gets several full walks per simulated
//! millisecond, which is how the endless loop behaves on hardware where
//! the loop spins far faster than the tick.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use coros::config::LOAD_PERIOD_TICKS;
use coros::{ms_to_ticks, Progress, Scheduler, TaskId, Tick};

std::thread_local! {
    static NOW: Cell<Tick> = const { Cell::new(0) };
}

fn clock() -> Tick {
    NOW.with(|c| c.get())
}

fn set_now(t: Tick) {
    NOW.with(|c| c.set(t));
}

fn advance(d: Tick) {
    NOW.with(|c| c.set(c.get().wrapping_add(d)));
}

/// Drive the dispatch loop for `ticks` simulated milliseconds.
fn run_for(k: &mut Scheduler, ticks: Tick) {
    for _ in 0..ticks {
        for _ in 0..24 {
            k.step();
        }
        advance(1);
    }
}

// ---------------------------------------------------------------------------
// Scenario: two-task alternation
// ---------------------------------------------------------------------------

struct AltCtx {
    name: char,
    log: Rc<RefCell<Vec<char>>>,
    iters: u8,
}

fn alternating(k: &mut Scheduler, id: TaskId) {
    // single-phase body: log the name, sleep 100 ms, end after 5 rounds
    let done = {
        let ctx = k.user_data_mut::<AltCtx>(id).unwrap();
        ctx.log.borrow_mut().push(ctx.name);
        ctx.iters += 1;
        ctx.iters >= 5
    };
    if done {
        k.end(id);
    } else {
        k.sleep(id, ms_to_ticks(100), 0);
    }
}

#[test]
fn two_equal_priority_tasks_alternate() {
    let mut k = Scheduler::new(clock);
    let log = Rc::new(RefCell::new(Vec::new()));
    // create B first so A ends up ahead of it in the list (insert
    // prepends; the stable sort keeps the newer equal-priority task first)
    let _b = k
        .create_task(
            2,
            Some(Box::new(AltCtx {
                name: 'B',
                log: log.clone(),
                iters: 0,
            })),
            alternating,
        )
        .unwrap();
    let _a = k
        .create_task(
            2,
            Some(Box::new(AltCtx {
                name: 'A',
                log: log.clone(),
                iters: 0,
            })),
            alternating,
        )
        .unwrap();

    let mut finished_at = None;
    for _ in 0..700 {
        for _ in 0..24 {
            k.step();
        }
        if k.task_count() == 2 && finished_at.is_none() {
            finished_at = Some(clock());
            break;
        }
        advance(1);
    }

    let log = log.borrow();
    assert_eq!(log.len(), 10);
    assert_eq!(log.iter().filter(|&&c| c == 'A').count(), 5);
    assert_eq!(log.iter().filter(|&&c| c == 'B').count(), 5);
    // strict interleave: the pair runs back-to-back every 100 ms
    for pair in log.chunks(2) {
        assert_eq!(pair, ['A', 'B'].as_slice());
    }
    // five rounds spaced 100 ms apart: last round at ≈400 ms
    let finished_at = finished_at.expect("tasks never finished");
    assert!((390..=520).contains(&finished_at), "finished at {finished_at}");
}

// ---------------------------------------------------------------------------
// Scenario: priority preference at yield
// ---------------------------------------------------------------------------

fn high_prio_beat(k: &mut Scheduler, id: TaskId) {
    if let Some(runs) = k.user_data_mut::<u32>(id) {
        *runs += 1;
    }
    k.sleep(id, ms_to_ticks(50), 0);
}

fn low_prio_spin(k: &mut Scheduler, id: TaskId) {
    if let Some(runs) = k.user_data_mut::<u32>(id) {
        *runs += 1;
    }
    k.yield_now(id, 0);
}

#[test]
fn high_priority_task_keeps_its_beat_under_load() {
    let mut k = Scheduler::new(clock);
    let h = k.create_task(200, Some(Box::new(0u32)), high_prio_beat).unwrap();
    let l = k.create_task(1, Some(Box::new(0u32)), low_prio_spin).unwrap();

    run_for(&mut k, 1000);

    let h_runs = *k.user_data_mut::<u32>(h).unwrap();
    let l_runs = *k.user_data_mut::<u32>(l).unwrap();
    // one run at t=0 plus one per 50 ms window
    assert!((19..=21).contains(&h_runs), "H ran {h_runs} times");
    // the spinner is only held off while H (and the built-ins) run
    assert!(l_runs > 1000, "L ran only {l_runs} times");
}

// ---------------------------------------------------------------------------
// Scenario: FIFO blocking transport
// ---------------------------------------------------------------------------

struct ProducerCtx {
    q: coros::FifoId,
    next: u8,
    blocks: u32,
}

struct SlowConsumerCtx {
    q: coros::FifoId,
    received: Vec<u8>,
    done_at: Option<Tick>,
}

/// Park an exhausted task without destroying its record, so the test can
/// read its stats after the run. Arm 1 re-sleeps forever.
const PARKED: u16 = 1;

fn eager_producer(k: &mut Scheduler, id: TaskId) {
    loop {
        match k.resume_point(id) {
            0 => {
                let (q, next) = match k.user_data_mut::<ProducerCtx>(id) {
                    Some(ctx) => (ctx.q, ctx.next),
                    None => return,
                };
                if next >= 10 {
                    k.sleep(id, 0x7000, PARKED);
                    return;
                }
                match k.fifo_write(id, q, &[next], 0) {
                    Ok(Progress::Blocked) => {
                        if let Some(ctx) = k.user_data_mut::<ProducerCtx>(id) {
                            ctx.blocks += 1;
                        }
                        return;
                    }
                    Ok(Progress::Complete) => {
                        if let Some(ctx) = k.user_data_mut::<ProducerCtx>(id) {
                            ctx.next += 1;
                        }
                    }
                    Err(_) => return,
                }
            }
            _ => {
                k.sleep(id, 0x7000, PARKED);
                return;
            }
        }
    }
}

fn slow_consumer(k: &mut Scheduler, id: TaskId) {
    loop {
        match k.resume_point(id) {
            0 => {
                let q = match k.user_data_mut::<SlowConsumerCtx>(id) {
                    Some(ctx) => ctx.q,
                    None => return,
                };
                let mut slot = [0u8];
                match k.fifo_read(id, q, &mut slot, 0) {
                    Ok(Progress::Blocked) => return,
                    Ok(Progress::Complete) => {
                        let now = k.now();
                        let done = {
                            let ctx = k.user_data_mut::<SlowConsumerCtx>(id).unwrap();
                            ctx.received.push(slot[0]);
                            if ctx.received.len() == 10 {
                                ctx.done_at = Some(now);
                            }
                            ctx.received.len() == 10
                        };
                        if done {
                            k.sleep(id, 0x7000, PARKED);
                        } else {
                            k.sleep(id, ms_to_ticks(10), 0);
                        }
                        return;
                    }
                    Err(_) => return,
                }
            }
            _ => {
                k.sleep(id, 0x7000, PARKED);
                return;
            }
        }
    }
}

#[test]
fn single_slot_fifo_delivery_is_in_order_and_blocking() {
    let mut k = Scheduler::new(clock);
    let q = k.fifo_create(1, 1).unwrap();
    let p = k
        .create_task(
            2,
            Some(Box::new(ProducerCtx {
                q,
                next: 0,
                blocks: 0,
            })),
            eager_producer,
        )
        .unwrap();
    let c = k
        .create_task(
            2,
            Some(Box::new(SlowConsumerCtx {
                q,
                received: Vec::new(),
                done_at: None,
            })),
            slow_consumer,
        )
        .unwrap();

    run_for(&mut k, 200);

    let blocks = k.user_data_mut::<ProducerCtx>(p).unwrap().blocks;
    assert_eq!(blocks, 9, "producer must stall once per slot after the first");
    let ctx = k.user_data_mut::<SlowConsumerCtx>(c).unwrap();
    assert_eq!(ctx.received, (0..10).collect::<Vec<u8>>());
    let done_at = ctx.done_at.expect("consumer never finished");
    assert!((80..=120).contains(&done_at), "finished at {done_at}");
}

// ---------------------------------------------------------------------------
// Scenario: semaphore handshake
// ---------------------------------------------------------------------------

struct WaiterCtx {
    gate: coros::SemId,
    count: u32,
}

struct SignallerCtx {
    gate: coros::SemId,
    sent: u32,
}

fn gated_waiter(k: &mut Scheduler, id: TaskId) {
    loop {
        match k.resume_point(id) {
            0 => {
                let gate = match k.user_data_mut::<WaiterCtx>(id) {
                    Some(ctx) => ctx.gate,
                    None => return,
                };
                match k.sem_wait(id, gate, 0) {
                    Ok(Progress::Blocked) => return,
                    Ok(Progress::Complete) => {
                        if let Some(ctx) = k.user_data_mut::<WaiterCtx>(id) {
                            ctx.count += 1;
                        }
                    }
                    Err(_) => return,
                }
            }
            _ => return,
        }
    }
}

fn periodic_signaller(k: &mut Scheduler, id: TaskId) {
    loop {
        match k.resume_point(id) {
            0 => {
                k.sleep(id, ms_to_ticks(20), 1);
                return;
            }
            _ => {
                let gate = match k.user_data_mut::<SignallerCtx>(id) {
                    Some(ctx) => ctx.gate,
                    None => return,
                };
                if k.sem_signal(gate).is_ok() {
                    if let Some(ctx) = k.user_data_mut::<SignallerCtx>(id) {
                        ctx.sent += 1;
                    }
                }
                k.set_resume_point(id, 0);
            }
        }
    }
}

#[test]
fn semaphore_handshake_counts_one_per_cycle() {
    let mut k = Scheduler::new(clock);
    let gate = k.sem_create(0).unwrap();
    let w = k
        .create_task(2, Some(Box::new(WaiterCtx { gate, count: 0 })), gated_waiter)
        .unwrap();
    let r = k
        .create_task(
            2,
            Some(Box::new(SignallerCtx { gate, sent: 0 })),
            periodic_signaller,
        )
        .unwrap();

    run_for(&mut k, 210);

    let sent = k.user_data_mut::<SignallerCtx>(r).unwrap().sent;
    let count = k.user_data_mut::<WaiterCtx>(w).unwrap().count;
    assert!(sent >= 5, "only {sent} signals in 210 ms");
    assert_eq!(count, sent, "every signal must unblock exactly one wait");
}

// ---------------------------------------------------------------------------
// Scenario: CPU load under a saturating task
// ---------------------------------------------------------------------------

#[test]
fn cpu_load_tracks_a_saturating_task() {
    let mut k = Scheduler::new(clock);
    run_for(&mut k, 2 * LOAD_PERIOD_TICKS + 5);
    assert!(k.cpu_load_pct() <= 1, "idle load was {}", k.cpu_load_pct());

    let hog = k.create_task(5, Some(Box::new(0u32)), low_prio_spin).unwrap();
    run_for(&mut k, 2 * LOAD_PERIOD_TICKS + 5);
    assert_eq!(k.cpu_load_pct(), 100);

    k.delete_task(hog).unwrap();
    run_for(&mut k, 2 * LOAD_PERIOD_TICKS + 5);
    assert!(k.cpu_load_pct() <= 1, "post-hog load was {}", k.cpu_load_pct());
}

// ---------------------------------------------------------------------------
// Scenario: a body running to its end deletes the task
// ---------------------------------------------------------------------------

fn one_shot(k: &mut Scheduler, id: TaskId) {
    if let Some(runs) = k.user_data_mut::<u32>(id) {
        *runs += 1;
    }
    k.end(id);
}

#[test]
fn task_ending_in_body_restores_the_list() {
    let mut k = Scheduler::new(clock);
    let mut before = String::new();
    k.dump_task_list(&mut before).unwrap();

    let id = k.create_task(9, Some(Box::new(0u32)), one_shot).unwrap();
    run_for(&mut k, 2);

    assert!(k.task_state(id).is_err(), "task should be gone");
    let mut after = String::new();
    k.dump_task_list(&mut after).unwrap();
    assert_eq!(before, after, "list must return to its pre-create shape");
    // the kernel stays fully operational
    let _ = k.cpu_load_pct();
    assert_eq!(k.task_count(), 2);
}

// ---------------------------------------------------------------------------
// Boundary: sleeping across the tick wrap
// ---------------------------------------------------------------------------

fn beat_96(k: &mut Scheduler, id: TaskId) {
    if let Some(runs) = k.user_data_mut::<u32>(id) {
        *runs += 1;
    }
    k.sleep(id, 0x60, 0);
}

#[test]
fn sleep_spanning_the_wrap_fires_at_the_true_deadline() {
    set_now(0xFFB0);
    let mut k = Scheduler::new(clock);
    let id = k.create_task(9, Some(Box::new(0u32)), beat_96).unwrap();

    // first run at 0xFFB0; next deadline 0x0010, across the wrap
    run_for(&mut k, 1);
    assert_eq!(*k.user_data_mut::<u32>(id).unwrap(), 1);

    // walk the clock through the wrap to one tick before the deadline
    while clock() != 0x0010 {
        run_for(&mut k, 1);
    }
    assert_eq!(*k.user_data_mut::<u32>(id).unwrap(), 1);

    // the dispatch pass at 0x0010 fires the task
    run_for(&mut k, 1);
    assert_eq!(*k.user_data_mut::<u32>(id).unwrap(), 2);
}

// ---------------------------------------------------------------------------
// Boundary: sleep(0) behaves as a pure yield
// ---------------------------------------------------------------------------

#[test]
fn zero_sleep_runs_every_pass_behind_higher_priorities() {
    let mut k = Scheduler::new(clock);
    let hi = k.create_task(50, Some(Box::new(0u32)), high_prio_beat).unwrap();
    let lo = k.create_task(1, Some(Box::new(0u32)), low_prio_spin).unwrap();

    run_for(&mut k, 10);

    let hi_runs = *k.user_data_mut::<u32>(hi).unwrap();
    let lo_runs = *k.user_data_mut::<u32>(lo).unwrap();
    assert_eq!(hi_runs, 1); // slept 50 ms after its first run
    assert!(lo_runs > 50, "yielding task ran only {lo_runs} times");
}
