//! Tasks
use arrayvec::ArrayString;
use core::fmt;

use crate::{
    error::{
        ChangePriorityError, CheckStackError, CreateTaskError, DeleteTaskError, QueryTaskError,
        RequestDeletionError, ResumeTaskError, SetTaskNameError, SuspendTaskError,
        TaskLookupError, WaitTimeoutError,
    },
    hook::Hooks,
    port::{Port, StackPtr, StackRegion, TaskEntry},
    state::{InitPhase, State},
    utils::{intrusive_list::Link, Init, PrioCoords},
    wait::EventId,
    Kernel,
};

pub(crate) mod pool;
#[doc(hidden)]
pub mod readyqueue;

/// The maximum length of a task name in bytes.
pub const TASK_NAME_LEN: usize = 16;

/// Identifies a task control block in a kernel's TCB pool.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u16);

impl TaskId {
    /// Get the index of the TCB in the pool.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

bitflags::bitflags! {
    /// Options specified at task creation.
    pub struct TaskOptions: u16 {
        /// Enable [`Kernel::check_task_stack`] for the task.
        const STACK_CHECK = 0x0001;
        /// Zero-fill the stack at creation. Only takes effect together with
        /// [`Self::STACK_CHECK`].
        const STACK_CLEAR = 0x0002;
        /// The task uses the floating-point unit. Interpreted by the port.
        const SAVE_FP = 0x0004;
    }
}

bitflags::bitflags! {
    /// The reasons a task is not ready. An empty set means the task is
    /// Ready (or Running).
    pub struct TaskStatus: u8 {
        /// Pending on a semaphore.
        const SEM = 0x01;
        /// Pending on a mailbox.
        const MBOX = 0x02;
        /// Pending on a message queue.
        const Q = 0x04;
        /// Explicitly suspended.
        const SUSPEND = 0x08;
        /// Pending on a mutex.
        const MUTEX = 0x10;
        /// Pending on an event flag group.
        const FLAG = 0x20;
        /// Any of the pend reasons.
        const PEND_ANY = Self::SEM.bits
            | Self::MBOX.bits
            | Self::Q.bits
            | Self::MUTEX.bits
            | Self::FLAG.bits;
    }
}

impl Init for TaskStatus {
    const INIT: Self = Self::empty();
}

impl Init for TaskOptions {
    const INIT: Self = Self::empty();
}

/// Selects the target of a task service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSel {
    /// The currently running task.
    Current,
    /// The task at the specified priority.
    Priority(u8),
}

impl From<u8> for TaskSel {
    #[inline]
    fn from(x: u8) -> Self {
        Self::Priority(x)
    }
}

/// *Task control block* - the state data of a task.
pub struct TaskCb {
    pub(crate) stack_ptr: StackPtr,
    pub(crate) stack: Option<StackRegion>,
    pub(crate) options: TaskOptions,
    pub(crate) id: u16,
    pub(crate) name: ArrayString<TASK_NAME_LEN>,

    pub(crate) prio: u8,
    /// Always equal to `PrioCoords::new(prio)`.
    pub(crate) coords: PrioCoords,
    pub(crate) status: TaskStatus,
    /// The outcome of the last wait, reported by `finish_wait`.
    pub(crate) pend_outcome: Result<(), WaitTimeoutError>,
    /// Remaining ticks of a delay or a wait timeout. `0` = none.
    pub(crate) delay: u32,
    pub(crate) event: Option<EventId>,
    pub(crate) msg: Option<usize>,
    pub(crate) del_req: bool,
    pub(crate) ctx_sw_ctr: u32,
    pub(crate) ext: usize,

    /// Live-list link. `Some(_)` iff the TCB is allocated.
    pub(crate) link: Option<Link<TaskId>>,
    pub(crate) next_free: Option<TaskId>,
}

impl Init for TaskCb {
    const INIT: Self = Self {
        stack_ptr: core::ptr::null_mut(),
        stack: None,
        options: TaskOptions::INIT,
        id: 0,
        name: ArrayString::new_const(),
        prio: 0,
        coords: PrioCoords::INIT,
        status: TaskStatus::INIT,
        pend_outcome: Ok(()),
        delay: 0,
        event: None,
        msg: None,
        del_req: false,
        ctx_sw_ctr: 0,
        ext: 0,
        link: None,
        next_free: None,
    };
}

impl fmt::Debug for TaskCb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TaskCb")
            .field("self", &(self as *const _))
            .field("name", &self.name.as_str())
            .field("prio", &self.prio)
            .field("status", &self.status)
            .field("delay", &self.delay)
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

impl TaskCb {
    pub fn priority(&self) -> u8 {
        self.prio
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn delay(&self) -> u32 {
        self.delay
    }

    pub fn options(&self) -> TaskOptions {
        self.options
    }

    /// The user extension word supplied at creation.
    pub fn ext(&self) -> usize {
        self.ext
    }

    pub fn context_switches(&self) -> u32 {
        self.ctx_sw_ctr
    }

    /// The saved stack pointer. Only meaningful while the task is not
    /// running.
    pub fn stack_ptr(&self) -> StackPtr {
        self.stack_ptr
    }

    /// Set the priority and the cached bitmap coordinates together.
    #[inline]
    pub(crate) fn set_priority(&mut self, prio: u8) {
        self.prio = prio;
        self.coords = PrioCoords::new(prio);
    }

    #[inline]
    pub(crate) fn is_ready(&self) -> bool {
        self.status.is_empty() && self.delay == 0
    }
}

/// The creation parameters of a task.
pub struct TaskAttr<'a> {
    pub(crate) entry: TaskEntry,
    pub(crate) param: usize,
    pub(crate) stack: StackRegion,
    pub(crate) prio: u8,
    pub(crate) id: u16,
    pub(crate) name: &'a str,
    pub(crate) options: TaskOptions,
    pub(crate) ext: usize,
}

impl<'a> TaskAttr<'a> {
    /// Construct a `TaskAttr` with no name, ID `0`, and no options.
    pub fn new(entry: TaskEntry, param: usize, stack: StackRegion, priority: u8) -> Self {
        Self {
            entry,
            param,
            stack,
            prio: priority,
            id: 0,
            name: "",
            options: TaskOptions::empty(),
            ext: 0,
        }
    }

    pub fn id(self, id: u16) -> Self {
        Self { id, ..self }
    }

    /// Set the name. Must be at most [`TASK_NAME_LEN`] bytes long.
    pub fn name(self, name: &'a str) -> Self {
        Self { name, ..self }
    }

    pub fn options(self, options: TaskOptions) -> Self {
        Self { options, ..self }
    }

    pub fn ext(self, ext: usize) -> Self {
        Self { ext, ..self }
    }
}

/// A snapshot of a task's state returned by [`Kernel::task_info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: u16,
    pub priority: u8,
    pub status: TaskStatus,
    pub delay: u32,
    pub event: Option<EventId>,
    pub options: TaskOptions,
    pub ext: usize,
    pub context_switches: u32,
    pub deletion_requested: bool,
    /// The stack size in words, or `0` if unknown.
    pub stack_len: usize,
}

/// The result of [`Kernel::check_task_stack`]. Both values are in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackUsage {
    pub free: usize,
    pub used: usize,
}

impl<const TASKS: usize, const EVENTS: usize> State<TASKS, EVENTS> {
    /// Resolve a [`TaskSel`] into a live task.
    pub(crate) fn lookup(&self, sel: TaskSel) -> Result<TaskId, TaskLookupError> {
        match sel {
            TaskSel::Current => self.tcb_cur.ok_or(TaskLookupError::NoSuchTask),
            TaskSel::Priority(prio) => {
                if prio > self.config.lowest_priority {
                    return Err(TaskLookupError::InvalidPriority);
                }
                self.tasks
                    .task_at(prio)
                    .ok_or(TaskLookupError::NoSuchTask)
            }
        }
    }

    #[inline]
    pub(crate) fn is_system_task(&self, task: TaskId) -> bool {
        let prio = self.tasks[task].prio;
        prio == self.config.idle_priority() || Some(prio) == self.config.stat_priority()
    }

    /// Put the task in the ready queue if nothing is holding it back.
    #[inline]
    pub(crate) fn make_ready_if_runnable(&mut self, task: TaskId) {
        let tcb = &self.tasks[task];
        if tcb.is_ready() {
            self.ready.insert(tcb.coords);
        }
    }
}

impl<P: Port, H: Hooks, const TASKS: usize, const EVENTS: usize> Kernel<P, H, TASKS, EVENTS> {
    /// Create a task.
    ///
    /// The task starts in the Ready state. If the kernel is running and the
    /// new task has a higher priority than the current one, a context switch
    /// is requested.
    pub fn create_task(&self, attr: TaskAttr<'_>) -> Result<(), CreateTaskError> {
        self.create_task_inner(attr, InitPhase::Initialized)
    }

    /// Create a task if the kernel is in `phase`.
    pub(crate) fn create_task_inner(
        &self,
        attr: TaskAttr<'_>,
        phase: InitPhase,
    ) -> Result<(), CreateTaskError> {
        if attr.prio > self.config.lowest_priority {
            return Err(CreateTaskError::InvalidPriority);
        }
        let name =
            ArrayString::<TASK_NAME_LEN>::from(attr.name).map_err(|_| CreateTaskError::BadParam)?;

        {
            let mut state = self.state.lock(&self.port)?;
            if state.phase != phase {
                return Err(CreateTaskError::BadObjectState);
            }
            if state.int_nesting > 0 {
                return Err(CreateTaskError::BadContext);
            }
            if !state.tasks.reserve(attr.prio) {
                return Err(CreateTaskError::PriorityInUse);
            }
        }

        // The stack frame is built outside the critical section. The
        // reservation keeps the priority from being taken meanwhile.
        if attr
            .options
            .contains(TaskOptions::STACK_CHECK | TaskOptions::STACK_CLEAR)
        {
            // Safety: `StackRegion` grants exclusive access to the region
            unsafe { attr.stack.clear() };
        }
        // Safety: Ditto
        let stack_ptr = unsafe {
            self.port
                .build_initial_stack_frame(attr.entry, attr.param, &attr.stack, attr.options)
        };

        let mut state = self.state.lock(&self.port)?;
        let state = &mut *state;

        let Some(task) = state.tasks.alloc() else {
            state.tasks.release_reservation(attr.prio);
            return Err(CreateTaskError::ResourceExhausted);
        };

        let tcb = &mut state.tasks[task];
        tcb.stack_ptr = stack_ptr;
        tcb.stack = Some(attr.stack);
        tcb.options = attr.options;
        tcb.id = attr.id;
        tcb.name = name;
        tcb.set_priority(attr.prio);
        tcb.status = TaskStatus::empty();
        tcb.pend_outcome = Ok(());
        tcb.delay = 0;
        tcb.event = None;
        tcb.msg = None;
        tcb.del_req = false;
        tcb.ctx_sw_ctr = 0;
        tcb.ext = attr.ext;

        self.hooks.tcb_init(&state.tasks[task]);
        self.hooks.task_create(&state.tasks[task]);

        state.tasks.register(task, attr.prio);
        state.ready.insert(state.tasks[task].coords);
        state.task_count += 1;

        log::debug!(
            "created task {:?} ({:?}) at priority {}",
            task,
            state.tasks[task].name.as_str(),
            attr.prio
        );

        self.reschedule(state);
        Ok(())
    }

    /// Delete a task. The idle task and the statistics task can't be deleted.
    ///
    /// Deleting [`TaskSel::Current`] switches to another task once the
    /// kernel state is unlocked.
    pub fn delete_task(&self, sel: impl Into<TaskSel>) -> Result<(), DeleteTaskError> {
        let mut state = self.state.lock(&self.port)?;
        let state = &mut *state;
        if state.int_nesting > 0 {
            return Err(DeleteTaskError::BadContext);
        }

        let task = state.lookup(sel.into())?;
        if state.is_system_task(task) {
            return Err(DeleteTaskError::SystemTask);
        }

        self.remove_task(state, task);
        self.reschedule(state);
        Ok(())
    }

    /// Return from the current task's entry point.
    ///
    /// Invokes [`Hooks::task_return`] and deletes the current task. A port
    /// calls this when a task entry function returns.
    pub fn exit_current_task(&self) -> Result<(), DeleteTaskError> {
        let mut state = self.state.lock(&self.port)?;
        let state = &mut *state;
        if state.int_nesting > 0 {
            return Err(DeleteTaskError::BadContext);
        }

        let task = state.lookup(TaskSel::Current)?;
        self.hooks.task_return(&state.tasks[task]);
        if state.is_system_task(task) {
            return Err(DeleteTaskError::SystemTask);
        }

        self.remove_task(state, task);
        self.reschedule(state);
        Ok(())
    }

    /// Detach `task` from every kernel structure and free its TCB.
    pub(crate) fn remove_task(&self, state: &mut State<TASKS, EVENTS>, task: TaskId) {
        let coords = state.tasks[task].coords;
        state.ready.remove(coords);
        if let Some(event) = state.tasks[task].event.take() {
            state.events.remove_waiter(event, coords);
        }

        let tcb = &mut state.tasks[task];
        tcb.status = TaskStatus::empty();
        tcb.delay = 0;
        tcb.msg = None;
        tcb.stack = None;

        self.hooks.task_delete(&state.tasks[task]);

        log::debug!(
            "deleting task {:?} ({:?}) at priority {}",
            task,
            state.tasks[task].name.as_str(),
            state.tasks[task].prio
        );

        state.tasks.release(task);
        state.task_count -= 1;

        if state.tcb_cur == Some(task) {
            state.tcb_cur = None;
        }
    }

    /// Ask a task to delete itself at a convenient point.
    ///
    /// The target polls [`Self::is_deletion_requested`] and then calls
    /// [`Self::delete_task`] on itself.
    pub fn request_task_deletion(&self, sel: impl Into<TaskSel>) -> Result<(), RequestDeletionError> {
        let mut state = self.state.lock(&self.port)?;
        let task = state.lookup(sel.into())?;
        if state.is_system_task(task) {
            return Err(RequestDeletionError::SystemTask);
        }
        state.tasks[task].del_req = true;
        Ok(())
    }

    /// Return `true` if deletion of the current task was requested.
    pub fn is_deletion_requested(&self) -> Result<bool, QueryTaskError> {
        let state = self.state.lock(&self.port)?;
        let task = state.lookup(TaskSel::Current)?;
        Ok(state.tasks[task].del_req)
    }

    /// Suspend a task. Suspension nests with waits and delays: the task
    /// becomes ready again only after every reason is lifted.
    pub fn suspend_task(&self, sel: impl Into<TaskSel>) -> Result<(), SuspendTaskError> {
        let mut state = self.state.lock(&self.port)?;
        let state = &mut *state;

        let task = state.lookup(sel.into())?;
        if state.tasks[task].prio == self.config.idle_priority() {
            return Err(SuspendTaskError::SystemTask);
        }

        let tcb = &mut state.tasks[task];
        tcb.status |= TaskStatus::SUSPEND;
        let coords = tcb.coords;
        state.ready.remove(coords);

        self.reschedule(state);
        Ok(())
    }

    /// Lift the suspension of the task at `prio`.
    pub fn resume_task(&self, prio: u8) -> Result<(), ResumeTaskError> {
        let mut state = self.state.lock(&self.port)?;
        let state = &mut *state;

        let task = state.lookup(TaskSel::Priority(prio))?;
        let tcb = &mut state.tasks[task];
        if !tcb.status.contains(TaskStatus::SUSPEND) {
            return Err(ResumeTaskError::BadObjectState);
        }
        tcb.status.remove(TaskStatus::SUSPEND);
        state.make_ready_if_runnable(task);

        self.reschedule(state);
        Ok(())
    }

    /// Move a task to another priority.
    ///
    /// The idle task's priority can be neither the source nor the
    /// destination. The statistics task can't be moved.
    pub fn change_task_priority(
        &self,
        sel: impl Into<TaskSel>,
        new_prio: u8,
    ) -> Result<(), ChangePriorityError> {
        let idle_prio = self.config.idle_priority();
        if new_prio > self.config.lowest_priority || new_prio == idle_prio {
            return Err(ChangePriorityError::InvalidPriority);
        }

        let mut state = self.state.lock(&self.port)?;
        let state = &mut *state;

        let sel = sel.into();
        if sel == TaskSel::Priority(idle_prio) {
            return Err(ChangePriorityError::InvalidPriority);
        }
        let task = state.lookup(sel)?;
        let old_prio = state.tasks[task].prio;
        if Some(old_prio) == self.config.stat_priority() {
            return Err(ChangePriorityError::SystemTask);
        }
        if state.tasks.slot(new_prio) != pool::PrioSlot::Free {
            return Err(ChangePriorityError::PriorityInUse);
        }

        let old_coords = state.tasks[task].coords;
        state.tasks.move_slot(task, old_prio, new_prio);
        state.tasks[task].set_priority(new_prio);
        let new_coords = state.tasks[task].coords;

        if state.ready.contains(old_coords) {
            state.ready.remove(old_coords);
            state.ready.insert(new_coords);
        }
        if let Some(event) = state.tasks[task].event {
            state.events.remove_waiter(event, old_coords);
            state.events.add_waiter(event, new_coords);
        }
        if state.tcb_cur == Some(task) {
            state.prio_cur = new_prio;
        }

        log::trace!("task {task:?} moved from priority {old_prio} to {new_prio}");

        self.reschedule(state);
        Ok(())
    }

    /// Get a snapshot of a task's state.
    pub fn task_info(&self, sel: impl Into<TaskSel>) -> Result<TaskInfo, QueryTaskError> {
        let state = self.state.lock(&self.port)?;
        let task = state.lookup(sel.into())?;
        let tcb = &state.tasks[task];
        Ok(TaskInfo {
            id: tcb.id,
            priority: tcb.prio,
            status: tcb.status,
            delay: tcb.delay,
            event: tcb.event,
            options: tcb.options,
            ext: tcb.ext,
            context_switches: tcb.ctx_sw_ctr,
            deletion_requested: tcb.del_req,
            stack_len: tcb.stack.as_ref().map_or(0, StackRegion::len),
        })
    }

    pub fn task_name(
        &self,
        sel: impl Into<TaskSel>,
    ) -> Result<ArrayString<TASK_NAME_LEN>, QueryTaskError> {
        let state = self.state.lock(&self.port)?;
        let task = state.lookup(sel.into())?;
        Ok(state.tasks[task].name)
    }

    pub fn set_task_name(&self, sel: impl Into<TaskSel>, name: &str) -> Result<(), SetTaskNameError> {
        let name = ArrayString::from(name).map_err(|_| SetTaskNameError::BadParam)?;
        let mut state = self.state.lock(&self.port)?;
        let task = state.lookup(sel.into())?;
        state.tasks[task].name = name;
        Ok(())
    }

    /// Measure the stack usage of a task created with
    /// [`TaskOptions::STACK_CHECK`].
    ///
    /// Counts the zero words from the far end of the stack, so the result is
    /// only accurate if the stack was zero-filled at creation.
    pub fn check_task_stack(&self, sel: impl Into<TaskSel>) -> Result<StackUsage, CheckStackError> {
        let (base, len) = {
            let state = self.state.lock(&self.port)?;
            let task = state.lookup(sel.into())?;
            let tcb = &state.tasks[task];
            if !tcb.options.contains(TaskOptions::STACK_CHECK) {
                return Err(CheckStackError::NotSupported);
            }
            let stack = tcb.stack.as_ref().ok_or(CheckStackError::NotSupported)?;
            (stack.base(), stack.len())
        };

        // Safety: The region was handed to the kernel at task creation and
        // is never released
        let free_words = unsafe {
            StackRegion::from_raw_parts(base, len).count_unused_words(P::STACK_GROWS_DOWN)
        };

        let word = core::mem::size_of::<crate::port::StackWord>();
        Ok(StackUsage {
            free: free_words * word,
            used: (len - free_words) * word,
        })
    }
}
