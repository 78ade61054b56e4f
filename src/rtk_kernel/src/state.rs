//! The kernel state
use core::fmt;

use crate::{
    cfg::Config,
    task::{pool::TaskPool, readyqueue::ReadyQueue, TaskId},
    utils::Init,
    wait::EventPool,
};

/// The initialization progress of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InitPhase {
    /// [`Kernel::init`](crate::Kernel::init) hasn't run.
    Boot,
    /// `init` is creating the system tasks. Only `init` may create tasks.
    Initializing,
    Initialized,
}

/// All mutable state of a [`Kernel`](crate::Kernel).
///
/// Only accessible inside a critical section, through
/// [`Kernel::lock_cpu`](crate::Kernel::lock_cpu).
pub struct State<const TASKS: usize, const EVENTS: usize> {
    pub(crate) config: Config,

    pub(crate) phase: InitPhase,
    pub(crate) running: bool,
    /// Interrupt nesting depth. `0` = task context.
    pub(crate) int_nesting: u8,
    /// Scheduler lock depth. Rescheduling is suppressed while nonzero.
    pub(crate) lock_nesting: u8,
    pub(crate) time: u32,
    pub(crate) ctx_switches: u32,
    pub(crate) task_count: usize,

    pub(crate) idle_ctr: u32,
    pub(crate) idle_ctr_run: u32,
    pub(crate) idle_ctr_max: u32,
    pub(crate) stat_ready: bool,
    pub(crate) cpu_usage: u8,

    pub(crate) prio_cur: u8,
    pub(crate) prio_high_rdy: u8,
    /// The running task. `None` before `start` and after the running task
    /// deleted itself.
    pub(crate) tcb_cur: Option<TaskId>,
    /// The task chosen by the last scheduling decision.
    pub(crate) tcb_high_rdy: Option<TaskId>,

    pub(crate) ready: ReadyQueue,
    pub(crate) tasks: TaskPool<TASKS>,
    pub(crate) events: EventPool<EVENTS>,
}

impl<const TASKS: usize, const EVENTS: usize> State<TASKS, EVENTS> {
    pub(crate) const fn new(config: Config) -> Self {
        Self {
            config,
            phase: InitPhase::Boot,
            running: false,
            int_nesting: 0,
            lock_nesting: 0,
            time: 0,
            ctx_switches: 0,
            task_count: 0,
            idle_ctr: 0,
            idle_ctr_run: 0,
            idle_ctr_max: 0,
            stat_ready: false,
            cpu_usage: 0,
            prio_cur: 0,
            prio_high_rdy: 0,
            tcb_cur: None,
            tcb_high_rdy: None,
            ready: ReadyQueue::INIT,
            tasks: TaskPool::new(),
            events: EventPool::new(),
        }
    }

    /// Return `true` if the kernel is running.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Return `true` if called from an interrupt handler.
    #[inline]
    pub fn is_interrupt_context(&self) -> bool {
        self.int_nesting > 0
    }

    /// The priority of the running task.
    #[inline]
    pub fn current_priority(&self) -> Option<u8> {
        self.tcb_cur.map(|_| self.prio_cur)
    }
}

impl<const TASKS: usize, const EVENTS: usize> fmt::Debug for State<TASKS, EVENTS> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("State")
            .field("phase", &self.phase)
            .field("running", &self.running)
            .field("int_nesting", &self.int_nesting)
            .field("lock_nesting", &self.lock_nesting)
            .field("time", &self.time)
            .field("prio_cur", &self.prio_cur)
            .field("tcb_cur", &self.tcb_cur)
            .field("ready", &self.ready)
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}
