//! Interrupt nesting
use crate::{error::BadContextError, hook::Hooks, port::Port, sched::SwitchKind, Kernel};

impl<P: Port, H: Hooks, const TASKS: usize, const EVENTS: usize> Kernel<P, H, TASKS, EVENTS> {
    /// Notify the kernel that an interrupt handler has started.
    ///
    /// Must be called with interrupts masked and paired with exactly one
    /// [`Self::interrupt_exit`]. The nesting counter saturates at 255. Has no
    /// effect before [`Self::start`].
    pub fn interrupt_enter(&self) -> Result<(), BadContextError> {
        let mut state = self.state.lock(&self.port)?;
        if state.running {
            state.int_nesting = state.int_nesting.saturating_add(1);
        }
        Ok(())
    }

    /// Notify the kernel that an interrupt handler is about to return.
    ///
    /// When the outermost handler exits and the scheduler is unlocked,
    /// requests an interrupt-level context switch if a higher-priority task
    /// became ready.
    pub fn interrupt_exit(&self) -> Result<(), BadContextError> {
        let mut state = self.state.lock(&self.port)?;
        if !state.running {
            return Ok(());
        }

        state.int_nesting = state.int_nesting.saturating_sub(1);
        if state.int_nesting == 0 && state.lock_nesting == 0 && state.prepare_switch() {
            log::trace!(
                "switch requested on interrupt exit: priority {} -> {}",
                state.prio_cur,
                state.prio_high_rdy
            );
            self.request_switch(SwitchKind::Interrupt);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        cfg::Config,
        sched::SwitchKind,
        task::TaskAttr,
        test_port::{dispatch, init_kernel, stack, start},
    };

    fn noop(_: usize) {}

    #[test]
    fn ignored_before_start() {
        let kernel = init_kernel(Config::new().lowest_priority(31));
        kernel.interrupt_enter().unwrap();
        assert_eq!(kernel.interrupt_nesting(), Ok(0));
        kernel.interrupt_exit().unwrap();
        assert_eq!(kernel.interrupt_nesting(), Ok(0));
    }

    #[test]
    fn nesting_saturates() {
        let kernel = init_kernel(Config::new().lowest_priority(31));
        start(kernel);
        for _ in 0..300 {
            kernel.interrupt_enter().unwrap();
        }
        assert_eq!(kernel.interrupt_nesting(), Ok(255));
        for _ in 0..300 {
            kernel.interrupt_exit().unwrap();
        }
        assert_eq!(kernel.interrupt_nesting(), Ok(0));
    }

    /// Task creation and blocking are refused inside a handler.
    #[test]
    fn task_services_refused_in_handler() {
        let kernel = init_kernel(Config::new().lowest_priority(31));
        start(kernel);
        kernel.interrupt_enter().unwrap();
        assert_eq!(
            kernel.create_task(TaskAttr::new(noop, 0, stack(), 1)),
            Err(crate::CreateTaskError::BadContext)
        );
        assert_eq!(kernel.delay(1), Err(crate::DelayError::BadContext));
        kernel.interrupt_exit().unwrap();
    }

    #[test]
    fn no_switch_when_nothing_better() {
        let kernel = init_kernel(Config::new().lowest_priority(31));
        kernel.create_task(TaskAttr::new(noop, 0, stack(), 4)).unwrap();
        start(kernel);
        kernel.interrupt_enter().unwrap();
        kernel.interrupt_exit().unwrap();
        assert_eq!(kernel.port().take_switches(), Vec::<SwitchKind>::new());
        assert!(!dispatch(kernel));
    }
}
