//! Application hooks
use crate::task::TaskCb;

/// Callbacks invoked by the kernel at well-defined points. Every method
/// defaults to doing nothing.
///
/// Hooks that receive a [`TaskCb`] run with the kernel state locked, so they
/// must not call kernel services (which would fail with `BadContext`).
pub trait Hooks {
    /// Called by [`Kernel::init`](crate::Kernel::init) once the call has been
    /// accepted, before the system tasks are created.
    fn init_begin(&self) {}

    /// Called at the end of [`Kernel::init`](crate::Kernel::init).
    fn init_end(&self) {}

    /// Called after a task has been initialized, before it becomes ready.
    fn task_create(&self, _task: &TaskCb) {}

    /// Called before a task's TCB is returned to the pool.
    fn task_delete(&self, _task: &TaskCb) {}

    /// Called when a task's entry function returns.
    fn task_return(&self, _task: &TaskCb) {}

    /// Called when the kernel is about to switch from `from` to `to`. `from`
    /// is `None` for the first task and after the outgoing task deleted
    /// itself.
    fn task_switch(&self, _from: Option<&TaskCb>, _to: &TaskCb) {}

    /// Called right after a TCB is filled in.
    fn tcb_init(&self, _task: &TaskCb) {}

    /// Called by the idle task on every iteration.
    fn idle(&self) {}

    /// Called by the statistics task once per second.
    fn stat(&self) {}

    /// Called at the start of every [`Kernel::tick`](crate::Kernel::tick).
    fn time_tick(&self) {}
}

/// The default [`Hooks`] implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl Hooks for NoHooks {}
