//! Kernel startup and the system tasks
use core::convert::Infallible;

use crate::{
    error::{BadContextError, CreateTaskError, DelayError, InitError, StartError},
    hook::Hooks,
    port::{Port, StackRegion},
    state::{InitPhase, State},
    task::TaskAttr,
    Kernel,
};

/// The stacks of the system tasks, supplied to [`Kernel::init`].
#[derive(Debug)]
pub struct SystemStacks {
    pub idle: StackRegion,
    /// Required iff [`Config::stat_task`](crate::Config::stat_task) is set.
    pub stat: Option<StackRegion>,
}

/// The ID assigned to the idle task.
pub const IDLE_TASK_ID: u16 = 0xffff;
/// The ID assigned to the statistics task.
pub const STAT_TASK_ID: u16 = 0xfffe;

impl<const TASKS: usize, const EVENTS: usize> State<TASKS, EVENTS> {
    /// Sample the idle counter and recompute the CPU usage.
    pub(crate) fn stat_update(&mut self) {
        self.idle_ctr_run = self.idle_ctr;
        self.idle_ctr = 0;

        let max = self.idle_ctr_max / 100;
        self.cpu_usage = if max > 0 {
            100u32.saturating_sub(self.idle_ctr_run / max) as u8
        } else {
            0
        };
    }
}

impl<P: Port, H: Hooks, const TASKS: usize, const EVENTS: usize> Kernel<P, H, TASKS, EVENTS> {
    /// Initialize the kernel and create the system tasks.
    ///
    /// Must be called exactly once, before any other task is created. The
    /// kernel has to be `'static` because the system tasks refer to it.
    pub fn init(&'static self, stacks: SystemStacks) -> Result<(), InitError> {
        {
            let mut state = self.state.lock(&self.port)?;
            if state.phase != InitPhase::Boot {
                return Err(InitError::BadObjectState);
            }
            if self.config.stat_task && stacks.stat.is_none() {
                return Err(InitError::BadParam);
            }
            state.phase = InitPhase::Initializing;
        }

        self.hooks.init_begin();

        if let Err(e) = self.create_system_tasks(stacks) {
            let mut state = self.state.lock(&self.port)?;
            let state = &mut *state;
            // Undo the partial initialization so that `init` can be retried
            let system_prios = [Some(self.config.idle_priority()), self.config.stat_priority()];
            for prio in system_prios.into_iter().flatten() {
                if let Some(task) = state.tasks.task_at(prio) {
                    self.remove_task(state, task);
                }
            }
            state.phase = InitPhase::Boot;
            log::debug!("kernel initialization failed: {e:?}");
            return Err(match e {
                CreateTaskError::BadContext => InitError::BadContext,
                _ => InitError::BadParam,
            });
        }

        self.state.lock(&self.port)?.phase = InitPhase::Initialized;
        self.hooks.init_end();
        log::debug!("kernel initialized ({:?})", self.config);
        Ok(())
    }

    fn create_system_tasks(&'static self, stacks: SystemStacks) -> Result<(), CreateTaskError> {
        let param = self as *const Self as usize;

        // The idle task must be the first task on the live list
        self.create_task_inner(
            TaskAttr::new(Self::idle_task_entry, param, stacks.idle, self.config.idle_priority())
                .id(IDLE_TASK_ID)
                .name("idle"),
            InitPhase::Initializing,
        )?;

        if let (Some(prio), Some(stack)) = (self.config.stat_priority(), stacks.stat) {
            self.create_task_inner(
                TaskAttr::new(Self::stat_task_entry, param, stack, prio)
                    .id(STAT_TASK_ID)
                    .name("stat"),
                InitPhase::Initializing,
            )?;
        }
        Ok(())
    }

    /// Start multitasking by dispatching the highest-priority ready task.
    ///
    /// Never returns on success. Fails with `BadObjectState` before
    /// [`Self::init`] or on a second call.
    pub fn start(&self) -> Result<Infallible, StartError> {
        let mut state = self.state.lock(&self.port)?;
        if state.phase != InitPhase::Initialized || state.running {
            return Err(StartError::BadObjectState);
        }

        let prio = state.ready.highest().ok_or(StartError::BadObjectState)?;
        let task = state
            .tasks
            .task_at(prio)
            .ok_or(StartError::BadObjectState)?;

        state.prio_cur = prio;
        state.prio_high_rdy = prio;
        state.tcb_cur = Some(task);
        state.tcb_high_rdy = Some(task);
        self.hooks.task_switch(None, &state.tasks[task]);
        state.running = true;

        let sp = state.tasks[task].stack_ptr;
        log::debug!("starting with {task:?} at priority {prio}");

        // Interrupts stay masked until the first task's context is restored
        state.leak();
        // Safety: Interrupts are masked and this is the only call
        unsafe { self.port.start_first_task(sp) }
    }

    /// Calibrate the CPU usage measurement. Call once from the first
    /// application task, before creating other tasks.
    ///
    /// Measures how far the idle counter gets in one second with nothing
    /// else running, then lets the statistics task start.
    pub fn stat_init(&self) -> Result<(), DelayError> {
        // Synchronize with the tick
        self.delay(2)?;
        self.state.lock(&self.port)?.idle_ctr = 0;

        self.delay(self.config.ticks_per_sec)?;
        let mut state = self.state.lock(&self.port)?;
        state.idle_ctr_max = state.idle_ctr;
        state.stat_ready = true;
        log::debug!("idle counter max = {}", state.idle_ctr_max);
        Ok(())
    }

    /// One iteration of the statistics task.
    pub(crate) fn stat_step(&self) -> Result<(), DelayError> {
        let ready = {
            let mut state = self.state.lock(&self.port)?;
            if state.stat_ready {
                state.stat_update();
            }
            state.stat_ready
        };

        if ready {
            self.hooks.stat();
            self.delay(self.config.ticks_per_sec)
        } else {
            self.delay(self.config.ticks_per_sec.saturating_mul(2))
        }
    }

    /// One iteration of the idle task.
    pub(crate) fn idle_step(&self) -> Result<(), BadContextError> {
        {
            let mut state = self.state.lock(&self.port)?;
            state.idle_ctr = state.idle_ctr.wrapping_add(1);
        }
        self.hooks.idle();
        Ok(())
    }

    fn idle_task_entry(param: usize) {
        // Safety: `init` passed a `&'static Self`
        let kernel = unsafe { &*(param as *const Self) };
        loop {
            // Only fails if a hook holds the kernel state, which can't be
            // the case between iterations
            let _ = kernel.idle_step();
        }
    }

    fn stat_task_entry(param: usize) {
        // Safety: `init` passed a `&'static Self`
        let kernel = unsafe { &*(param as *const Self) };
        loop {
            let _ = kernel.stat_step();
        }
    }
}
