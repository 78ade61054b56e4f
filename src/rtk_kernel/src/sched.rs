//! Scheduler core
use crate::{
    error::BadContextError,
    hook::Hooks,
    port::{Port, StackPtr},
    state::State,
    Kernel,
};

/// The kind of context switch requested from the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SwitchKind {
    Task,
    Interrupt,
}

impl<const TASKS: usize, const EVENTS: usize> State<TASKS, EVENTS> {
    /// Choose the highest-priority ready task. If it isn't the running task,
    /// record it as the switch target and return `true`.
    pub(crate) fn prepare_switch(&mut self) -> bool {
        // The idle task keeps the queue nonempty in a correctly initialized
        // kernel. Stay put if it's empty anyway.
        let Some(prio) = self.ready.highest() else {
            return false;
        };
        if prio == self.prio_cur && self.tcb_cur.is_some() {
            return false;
        }
        let Some(task) = self.tasks.task_at(prio) else {
            return false;
        };

        self.prio_high_rdy = prio;
        self.tcb_high_rdy = Some(task);
        let tcb = &mut self.tasks[task];
        tcb.ctx_sw_ctr = tcb.ctx_sw_ctr.wrapping_add(1);
        self.ctx_switches = self.ctx_switches.wrapping_add(1);
        true
    }

    /// Return `true` if a task-level reschedule is allowed now.
    #[inline]
    pub(crate) fn can_reschedule(&self) -> bool {
        self.running && self.int_nesting == 0 && self.lock_nesting == 0
    }
}

impl<P: Port, H: Hooks, const TASKS: usize, const EVENTS: usize> Kernel<P, H, TASKS, EVENTS> {
    /// Perform a task-level reschedule while holding the kernel state.
    ///
    /// Does nothing in an interrupt handler, with the scheduler locked, or
    /// before [`Self::start`]. Otherwise, if a higher-priority task is ready,
    /// requests a context switch, which takes place once the critical
    /// section ends.
    pub fn reschedule(&self, state: &mut State<TASKS, EVENTS>) {
        if !state.can_reschedule() {
            return;
        }
        if state.prepare_switch() {
            log::trace!(
                "switch requested: priority {} -> {}",
                state.prio_cur,
                state.prio_high_rdy
            );
            self.request_switch(SwitchKind::Task);
        }
    }

    #[inline]
    pub(crate) fn request_switch(&self, kind: SwitchKind) {
        // Safety: Called inside a critical section, in the context `kind`
        // designates
        unsafe {
            match kind {
                SwitchKind::Task => self.port.context_switch(),
                SwitchKind::Interrupt => self.port.interrupt_context_switch(),
            }
        }
    }

    /// Run the scheduler. Switches to the highest-priority ready task if it
    /// isn't the running one.
    pub fn sched(&self) -> Result<(), BadContextError> {
        let mut state = self.state.lock(&self.port)?;
        self.reschedule(&mut state);
        Ok(())
    }

    /// Prevent rescheduling until the matching [`Self::sched_unlock`]. Nests
    /// up to 255 levels. Has no effect before [`Self::start`].
    pub fn sched_lock(&self) -> Result<(), BadContextError> {
        let mut state = self.state.lock(&self.port)?;
        if state.int_nesting > 0 {
            return Err(BadContextError::BadContext);
        }
        if state.running {
            state.lock_nesting = state.lock_nesting.saturating_add(1);
        }
        Ok(())
    }

    /// Undo one [`Self::sched_lock`]. Reschedules when the outermost lock is
    /// released.
    pub fn sched_unlock(&self) -> Result<(), BadContextError> {
        let mut state = self.state.lock(&self.port)?;
        if state.int_nesting > 0 {
            return Err(BadContextError::BadContext);
        }
        if state.running && state.lock_nesting > 0 {
            state.lock_nesting -= 1;
            self.reschedule(&mut state);
        }
        Ok(())
    }

    /// Complete a context switch. Called by the port's switch handler after
    /// saving the outgoing context.
    ///
    /// Stores `outgoing_sp` in the outgoing task's TCB (unless that task has
    /// deleted itself), invokes [`Hooks::task_switch`], makes the task chosen
    /// by the last scheduling decision current, and returns its saved stack
    /// pointer. Returns `outgoing_sp` if no switch is pending.
    pub fn switch_context(&self, outgoing_sp: StackPtr) -> Result<StackPtr, BadContextError> {
        let mut state = self.state.lock(&self.port)?;
        let state = &mut *state;

        let Some(to) = state.tcb_high_rdy else {
            return Ok(outgoing_sp);
        };

        if let Some(from) = state.tcb_cur {
            if from == to {
                return Ok(outgoing_sp);
            }
            state.tasks[from].stack_ptr = outgoing_sp;
        }

        self.hooks
            .task_switch(state.tcb_cur.map(|from| &state.tasks[from]), &state.tasks[to]);

        log::trace!("switching to {:?} (priority {})", to, state.prio_high_rdy);

        state.tcb_cur = Some(to);
        state.prio_cur = state.prio_high_rdy;
        Ok(state.tasks[to].stack_ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cfg::Config,
        task::TaskAttr,
        test_port::{dispatch, init_kernel, stack, start, HookCall},
    };

    fn noop(_: usize) {}

    #[test]
    fn highest_priority_runs_first() {
        let kernel = init_kernel(Config::new().lowest_priority(31));
        for prio in [10, 5, 15] {
            kernel
                .create_task(TaskAttr::new(noop, 0, stack(), prio))
                .unwrap();
        }
        start(kernel);
        assert_eq!(kernel.current_priority(), Ok(Some(5)));
        assert_eq!(kernel.port().take_switches(), vec![]);

        // Nothing better is ready
        kernel.sched().unwrap();
        assert!(!dispatch(kernel));
    }

    #[test]
    fn creating_higher_priority_task_preempts() {
        let kernel = init_kernel(Config::new().lowest_priority(31));
        kernel.create_task(TaskAttr::new(noop, 0, stack(), 10)).unwrap();
        start(kernel);

        kernel.create_task(TaskAttr::new(noop, 0, stack(), 20)).unwrap();
        assert_eq!(kernel.port().take_switches(), vec![]);

        kernel.create_task(TaskAttr::new(noop, 0, stack(), 3)).unwrap();
        assert_eq!(kernel.port().take_switches(), vec![SwitchKind::Task]);

        let before = kernel.context_switches().unwrap();
        kernel.hooks().take_calls();
        assert!(dispatch(kernel));
        assert_eq!(kernel.current_priority(), Ok(Some(3)));
        assert_eq!(
            kernel.hooks().take_calls(),
            vec![HookCall::TaskSwitch(Some(10), 3)]
        );
        assert_eq!(kernel.context_switches(), Ok(before));
        assert_eq!(kernel.task_info(3).unwrap().context_switches, 1);
    }

    #[test]
    fn saves_outgoing_stack_pointer() {
        let kernel = init_kernel(Config::new().lowest_priority(31));
        kernel.create_task(TaskAttr::new(noop, 0, stack(), 10)).unwrap();
        start(kernel);

        kernel.create_task(TaskAttr::new(noop, 0, stack(), 3)).unwrap();
        let sp = kernel.port().running_sp();
        let incoming = {
            let state = kernel.lock_cpu().unwrap();
            state.tasks[state.tasks.task_at(3).unwrap()].stack_ptr()
        };
        assert!(dispatch(kernel));
        assert_eq!(kernel.port().running_sp(), incoming);

        let state = kernel.lock_cpu().unwrap();
        assert_eq!(state.tasks[state.tasks.task_at(10).unwrap()].stack_ptr(), sp);
    }

    /// A locked scheduler defers preemption until the outermost unlock.
    #[test]
    fn sched_lock_defers_switch() {
        let kernel = init_kernel(Config::new().lowest_priority(31));
        kernel.create_task(TaskAttr::new(noop, 0, stack(), 10)).unwrap();
        start(kernel);

        kernel.sched_lock().unwrap();
        kernel.sched_lock().unwrap();
        assert_eq!(kernel.lock_nesting(), Ok(2));

        kernel.create_task(TaskAttr::new(noop, 0, stack(), 3)).unwrap();
        assert!(!dispatch(kernel));

        kernel.sched_unlock().unwrap();
        assert!(!dispatch(kernel));
        assert_eq!(kernel.current_priority(), Ok(Some(10)));

        kernel.sched_unlock().unwrap();
        assert!(dispatch(kernel));
        assert_eq!(kernel.current_priority(), Ok(Some(3)));

        // Extra unlocks are ignored
        kernel.sched_unlock().unwrap();
        assert_eq!(kernel.lock_nesting(), Ok(0));
    }

    #[test]
    fn sched_lock_before_start_is_noop() {
        let kernel = init_kernel(Config::new().lowest_priority(31));
        kernel.sched_lock().unwrap();
        assert_eq!(kernel.lock_nesting(), Ok(0));
    }

    #[test]
    fn sched_lock_rejected_in_interrupt() {
        let kernel = init_kernel(Config::new().lowest_priority(31));
        start(kernel);
        kernel.interrupt_enter().unwrap();
        assert_eq!(kernel.sched_lock(), Err(BadContextError::BadContext));
        assert_eq!(kernel.sched_unlock(), Err(BadContextError::BadContext));
        kernel.interrupt_exit().unwrap();
    }

    #[test]
    fn reentry_from_hook_fails() {
        let kernel = init_kernel(Config::new().lowest_priority(31));
        let _state = kernel.lock_cpu().unwrap();
        assert_eq!(kernel.sched().err(), Some(BadContextError::BadContext));
    }
}
