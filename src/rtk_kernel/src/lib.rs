//! A preemptive, priority-based real-time kernel core.
//!
//! Every task has a unique priority in `0..=lowest_priority` (lower is more
//! urgent). The highest-priority ready task always runs; there is no
//! round-robin. A [`Kernel`] owns all kernel state and delegates register
//! save/restore to a [`Port`].
//!
//! # Usage
//!
//!  1. Implement [`Port`] for the target (and optionally [`Hooks`]).
//!  2. Place a [`Kernel`] in a `static` and call [`Kernel::init`].
//!  3. Create application tasks with [`Kernel::create_task`].
//!  4. Call [`Kernel::start`], which never returns.
//!  5. From the timer interrupt handler, call [`Kernel::interrupt_enter`],
//!     [`Kernel::tick`], and [`Kernel::interrupt_exit`].
#![cfg_attr(not(test), no_std)] // Link `std` only when building a test (`cfg(test)`)
#![deny(unsafe_op_in_unsafe_fn)]

mod cfg;
mod error;
mod hook;
mod interrupt;
mod klock;
mod port;
mod sched;
mod startup;
mod state;
mod task;
mod timeout;
mod wait;

pub mod utils;

#[cfg(test)]
mod test_port;
#[cfg(test)]
mod tests;

pub use self::{
    cfg::Config,
    error::*,
    hook::{Hooks, NoHooks},
    klock::CpuLockGuard,
    port::{Port, StackPtr, StackRegion, StackWord, TaskEntry},
    startup::{SystemStacks, IDLE_TASK_ID, STAT_TASK_ID},
    state::State,
    task::{
        StackUsage, TaskAttr, TaskCb, TaskId, TaskInfo, TaskOptions, TaskSel, TaskStatus,
        TASK_NAME_LEN,
    },
    wait::{DeleteMode, EventId, EventPayload},
};

use self::klock::CpuLockCell;

/// A critical section guard giving access to a kernel's [`State`].
pub type StateGuard<'a, P, const TASKS: usize, const EVENTS: usize> =
    CpuLockGuard<'a, P, State<TASKS, EVENTS>>;

/// A kernel instance.
///
/// `TASKS` is the size of the TCB pool (including the system tasks) and
/// `EVENTS` is the size of the event pool.
///
/// # Examples
///
/// ```ignore
/// static KERNEL: Kernel<MyPort, NoHooks, 16, 8> =
///     Kernel::new(MyPort::new(), NoHooks, Config::new().lowest_priority(31));
/// ```
pub struct Kernel<P, H, const TASKS: usize, const EVENTS: usize> {
    port: P,
    hooks: H,
    config: Config,
    state: CpuLockCell<State<TASKS, EVENTS>>,
}

// Safety: All state is behind `CpuLockCell`, which is only accessed inside
// the port's critical section on a single CPU
unsafe impl<P: Sync, H: Sync, const TASKS: usize, const EVENTS: usize> Sync
    for Kernel<P, H, TASKS, EVENTS>
{
}

impl<P: Port, H: Hooks, const TASKS: usize, const EVENTS: usize> Kernel<P, H, TASKS, EVENTS> {
    /// Construct a kernel.
    ///
    /// Panics (at compile time in a `const` context) if `config` is invalid
    /// or the TCB pool can't hold the system tasks.
    pub const fn new(port: P, hooks: H, config: Config) -> Self {
        config.validate(TASKS);
        Self {
            port,
            hooks,
            config,
            state: CpuLockCell::new(State::new(config)),
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Enter a critical section and get the kernel state.
    ///
    /// This is the building block for services layered on the kernel (e.g.,
    /// semaphores). See [`State::event_task_wait`] and
    /// [`Kernel::reschedule`].
    pub fn lock_cpu(&self) -> Result<StateGuard<'_, P, TASKS, EVENTS>, BadContextError> {
        self.state.lock(&self.port)
    }

    /// Read the kernel state inside a short critical section.
    fn read<R>(&self, f: impl FnOnce(&State<TASKS, EVENTS>) -> R) -> Result<R, BadContextError> {
        let state = self.state.lock(&self.port)?;
        Ok(f(&state))
    }

    pub fn is_running(&self) -> Result<bool, BadContextError> {
        self.read(|state| state.running)
    }

    pub fn interrupt_nesting(&self) -> Result<u8, BadContextError> {
        self.read(|state| state.int_nesting)
    }

    pub fn lock_nesting(&self) -> Result<u8, BadContextError> {
        self.read(|state| state.lock_nesting)
    }

    /// The total number of context switches.
    pub fn context_switches(&self) -> Result<u32, BadContextError> {
        self.read(|state| state.ctx_switches)
    }

    /// The number of live tasks, including the system tasks.
    pub fn task_count(&self) -> Result<usize, BadContextError> {
        self.read(|state| state.task_count)
    }

    /// The priority of the running task. `None` before [`Self::start`].
    pub fn current_priority(&self) -> Result<Option<u8>, BadContextError> {
        self.read(|state| state.current_priority())
    }

    /// The CPU usage in percent, as of the last statistics update.
    pub fn cpu_usage(&self) -> Result<u8, BadContextError> {
        self.read(|state| state.cpu_usage)
    }
}
