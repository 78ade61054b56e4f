//! End-to-end scheduling scenarios on the simulated port
use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;
use std::collections::BTreeSet;

use crate::{
    sched::SwitchKind,
    task::pool::PrioSlot,
    test_port::{dispatch, init_kernel, stack, start, TestKernel},
    utils::PrioCoords,
    Config, CreateTaskError, TaskAttr, TaskSel,
};

fn noop(_: usize) {}

fn config() -> Config {
    Config::new().lowest_priority(31)
}

fn tick_isr(kernel: &TestKernel) {
    kernel.interrupt_enter().unwrap();
    kernel.tick().unwrap();
    kernel.interrupt_exit().unwrap();
}

/// Check the TCB pool invariants: the free list and the live list partition
/// the pool, priorities are unique, and cached coordinates match.
fn check_pool(kernel: &TestKernel) {
    let state = kernel.lock_cpu().unwrap();
    let live: Vec<_> = state.tasks.iter_live().collect();
    let free: Vec<_> = state.tasks.iter_free().collect();

    let live_set: BTreeSet<_> = live.iter().map(|t| t.index()).collect();
    let free_set: BTreeSet<_> = free.iter().map(|t| t.index()).collect();
    assert!(live_set.is_disjoint(&free_set));
    assert_eq!(live_set.len() + free_set.len(), 8);
    assert_eq!(live.len(), state.task_count);

    let prios: BTreeSet<_> = live.iter().map(|&t| state.tasks[t].priority()).collect();
    assert_eq!(prios.len(), live.len());
    for &task in &live {
        let tcb = &state.tasks[task];
        assert_eq!(tcb.coords, PrioCoords::new(tcb.priority()));
        assert_eq!(state.tasks.task_at(tcb.priority()), Some(task));
        assert_eq!(state.ready.contains(tcb.coords), tcb.is_ready());
    }
}

#[test]
fn scenario_highest_of_three() {
    let kernel = init_kernel(config());
    for prio in [5, 10, 15] {
        kernel
            .create_task(TaskAttr::new(noop, 0, stack(), prio))
            .unwrap();
    }
    {
        let state = kernel.lock_cpu().unwrap();
        assert_eq!(state.ready.highest(), Some(5));
        assert_eq!(state.ready.iter().collect::<Vec<_>>(), vec![5, 10, 15, 31]);
    }
    start(kernel);
    assert_eq!(kernel.current_priority(), Ok(Some(5)));
}

#[test]
fn scenario_delay_four_ticks() {
    let kernel = init_kernel(config());
    kernel.create_task(TaskAttr::new(noop, 0, stack(), 5)).unwrap();
    start(kernel);

    kernel.delay(4).unwrap();
    assert!(dispatch(kernel));
    assert_eq!(kernel.current_priority(), Ok(Some(31)));

    for remaining in [3, 2, 1] {
        tick_isr(kernel);
        assert!(!dispatch(kernel));
        assert_eq!(kernel.task_info(5).unwrap().delay, remaining);
    }
    tick_isr(kernel);
    assert!(dispatch(kernel));
    assert_eq!(kernel.current_priority(), Ok(Some(5)));
}

#[test]
fn scenario_nested_interrupts() {
    let kernel = init_kernel(config());
    kernel.create_task(TaskAttr::new(noop, 0, stack(), 5)).unwrap();
    kernel.create_task(TaskAttr::new(noop, 0, stack(), 10)).unwrap();
    start(kernel);

    kernel.delay(50).unwrap();
    assert!(dispatch(kernel));
    assert_eq!(kernel.current_priority(), Ok(Some(10)));
    kernel.port().take_switches();

    kernel.interrupt_enter().unwrap();
    kernel.interrupt_enter().unwrap();
    assert_eq!(kernel.interrupt_nesting(), Ok(2));

    // Make the higher-priority task ready from the inner handler
    kernel.resume_delay(5).unwrap();
    assert_eq!(kernel.port().take_switches(), vec![]);

    kernel.interrupt_exit().unwrap();
    assert_eq!(kernel.interrupt_nesting(), Ok(1));
    assert_eq!(kernel.port().take_switches(), vec![]);
    assert!(!dispatch(kernel));

    kernel.interrupt_exit().unwrap();
    assert_eq!(kernel.interrupt_nesting(), Ok(0));
    assert_eq!(kernel.port().take_switches(), vec![SwitchKind::Interrupt]);
    assert!(dispatch(kernel));
    assert_eq!(kernel.current_priority(), Ok(Some(5)));
}

#[test]
fn scenario_pool_exhaustion() {
    let kernel = init_kernel(config());
    // The idle task occupies one of the eight TCBs
    for prio in 0..7 {
        kernel
            .create_task(TaskAttr::new(noop, 0, stack(), prio))
            .unwrap();
    }
    check_pool(kernel);

    let ready_before = kernel.lock_cpu().unwrap().ready;
    assert_eq!(
        kernel.create_task(TaskAttr::new(noop, 0, stack(), 20)),
        Err(CreateTaskError::ResourceExhausted)
    );

    assert_eq!(kernel.task_count(), Ok(8));
    let state = kernel.lock_cpu().unwrap();
    assert_eq!(state.ready, ready_before);
    assert_eq!(state.tasks.slot(20), PrioSlot::Free);
    assert_eq!(state.tasks.iter_free().count(), 0);
    drop(state);
    check_pool(kernel);
}

/// Rescheduling is gated by both nesting counters.
#[test]
fn reschedule_gating() {
    let kernel = init_kernel(config());
    kernel.create_task(TaskAttr::new(noop, 0, stack(), 3)).unwrap();
    kernel.create_task(TaskAttr::new(noop, 0, stack(), 10)).unwrap();
    start(kernel);
    kernel.delay(5).unwrap();
    assert!(dispatch(kernel));
    kernel.port().take_switches();

    kernel.interrupt_enter().unwrap();
    kernel.resume_delay(3).unwrap();
    kernel.sched().unwrap();
    assert_eq!(kernel.port().take_switches(), vec![]);
    kernel.interrupt_exit().unwrap();
    assert_eq!(kernel.port().take_switches(), vec![SwitchKind::Interrupt]);
    assert!(dispatch(kernel));
    assert_eq!(kernel.current_priority(), Ok(Some(3)));

    kernel.sched_lock().unwrap();
    kernel.create_task(TaskAttr::new(noop, 0, stack(), 2)).unwrap();
    kernel.interrupt_enter().unwrap();
    kernel.interrupt_exit().unwrap();
    assert!(!dispatch(kernel), "switched with the scheduler locked");

    kernel.sched_unlock().unwrap();
    assert_eq!(kernel.port().take_switches(), vec![SwitchKind::Task]);
    assert!(dispatch(kernel));
    assert_eq!(kernel.current_priority(), Ok(Some(2)));
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Create(u8),
    Delete(u8),
    Suspend(u8),
    Resume(u8),
    Delay(u8),
    Tick,
    ChangePrio(u8, u8),
}

impl Arbitrary for Op {
    fn arbitrary(g: &mut Gen) -> Self {
        let prio = |g: &mut Gen| u8::arbitrary(g) % 32;
        match u8::arbitrary(g) % 7 {
            0 => Op::Create(prio(g)),
            1 => Op::Delete(prio(g)),
            2 => Op::Suspend(prio(g)),
            3 => Op::Resume(prio(g)),
            4 => Op::Delay(u8::arbitrary(g) % 5),
            5 => Op::Tick,
            _ => Op::ChangePrio(prio(g), prio(g)),
        }
    }
}

/// Random sequences of task services keep the pool consistent, and after
/// every dispatch the running task is the highest-priority ready task.
#[quickcheck]
fn random_operations_keep_invariants(ops: Vec<Op>) {
    let kernel = init_kernel(config());
    kernel.create_task(TaskAttr::new(noop, 0, stack(), 16)).unwrap();
    start(kernel);

    for op in ops {
        log::trace!("{op:?}");
        // Errors are expected for many random inputs; only consistency
        // matters here
        match op {
            Op::Create(prio) => {
                let _ = kernel.create_task(TaskAttr::new(noop, 0, stack(), prio));
            }
            Op::Delete(prio) => {
                let _ = kernel.delete_task(prio);
            }
            Op::Suspend(prio) => {
                let _ = kernel.suspend_task(prio);
            }
            Op::Resume(prio) => {
                let _ = kernel.resume_task(prio);
            }
            // The idle task never blocks
            Op::Delay(_) if kernel.current_priority() == Ok(Some(31)) => {}
            Op::Delay(ticks) => {
                let _ = kernel.delay(ticks.into());
            }
            Op::Tick => tick_isr(kernel),
            Op::ChangePrio(old, new) => {
                let _ = kernel.change_task_priority(old, new);
            }
        }
        dispatch(kernel);
        check_pool(kernel);

        let state = kernel.lock_cpu().unwrap();
        assert_eq!(state.current_priority(), state.ready.highest());
        assert!(state.tcb_cur.is_some());
    }

    assert!(kernel.task_info(TaskSel::Priority(31)).is_ok());
}
