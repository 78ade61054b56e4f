//! Event control blocks and the task wait/ready primitives
//!
//! An event is the kernel-side half of a synchronization object: a wait list
//! ordered by priority plus a small payload that the object built on top of
//! it (semaphore, mailbox, etc.) interprets.
use core::fmt;

use crate::{
    error::{
        BadIdError, CreateEventError, DeleteEventError, FinishWaitError, PendError, PostError,
        WaitTimeoutError,
    },
    hook::Hooks,
    port::Port,
    state::State,
    task::TaskStatus,
    utils::{Init, PrioBitmap, PrioCoords},
    Kernel,
};

/// Identifies an event control block in a kernel's event pool.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u16);

impl EventId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "EventId({})", self.0)
    }
}

/// The data an IPC object keeps in its event control block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EventPayload {
    /// E.g., a semaphore count.
    pub count: u16,
    /// E.g., a mailbox message.
    pub data: usize,
}

impl Init for EventPayload {
    const INIT: Self = Self { count: 0, data: 0 };
}

/// Specifies what [`Kernel::delete_event`] does with waiting tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Fail with `TaskWaiting` if any task is waiting.
    NoPend,
    /// Wake up every waiting task with `Aborted`.
    Always,
}

/// *Event control block*
struct EventCb {
    waiters: PrioBitmap,
    payload: EventPayload,
    in_use: bool,
    next_free: Option<EventId>,
}

impl Init for EventCb {
    const INIT: Self = Self {
        waiters: PrioBitmap::INIT,
        payload: EventPayload::INIT,
        in_use: false,
        next_free: None,
    };
}

/// The fixed-size pool of event control blocks.
pub(crate) struct EventPool<const N: usize> {
    ecbs: [EventCb; N],
    free: Option<EventId>,
}

impl<const N: usize> EventPool<N> {
    pub(crate) const fn new() -> Self {
        const ECB_INIT: EventCb = EventCb::INIT;
        let mut ecbs = [ECB_INIT; N];

        let mut i = 0;
        while i < N {
            ecbs[i].next_free = if i + 1 < N {
                Some(EventId((i + 1) as u16))
            } else {
                None
            };
            i += 1;
        }

        Self {
            ecbs,
            free: if N > 0 { Some(EventId(0)) } else { None },
        }
    }

    fn alloc(&mut self, payload: EventPayload) -> Option<EventId> {
        let event = self.free?;
        let ecb = &mut self.ecbs[event.index()];
        self.free = ecb.next_free.take();
        ecb.in_use = true;
        ecb.waiters = PrioBitmap::INIT;
        ecb.payload = payload;
        Some(event)
    }

    fn free(&mut self, event: EventId) {
        let ecb = &mut self.ecbs[event.index()];
        debug_assert!(ecb.waiters.is_empty());
        ecb.in_use = false;
        ecb.next_free = self.free;
        self.free = Some(event);
    }

    fn get(&self, event: EventId) -> Result<&EventCb, BadIdError> {
        match self.ecbs.get(event.index()) {
            Some(ecb) if ecb.in_use => Ok(ecb),
            _ => Err(BadIdError::BadId),
        }
    }

    fn get_mut(&mut self, event: EventId) -> Result<&mut EventCb, BadIdError> {
        match self.ecbs.get_mut(event.index()) {
            Some(ecb) if ecb.in_use => Ok(ecb),
            _ => Err(BadIdError::BadId),
        }
    }

    pub(crate) fn add_waiter(&mut self, event: EventId, coords: PrioCoords) {
        self.ecbs[event.index()].waiters.set(coords);
    }

    pub(crate) fn remove_waiter(&mut self, event: EventId, coords: PrioCoords) {
        self.ecbs[event.index()].waiters.clear(coords);
    }
}

impl<const TASKS: usize, const EVENTS: usize> State<TASKS, EVENTS> {
    /// Make the current task wait on `event`.
    ///
    /// `reason` is the pend bit to set (e.g., [`TaskStatus::SEM`]). It must
    /// include at least one of [`TaskStatus::PEND_ANY`].
    /// `timeout` is in ticks; `0` waits forever. The caller then releases the
    /// state via [`Kernel::reschedule`] and, once resumed, collects the
    /// outcome with [`Self::finish_wait`].
    pub fn event_task_wait(
        &mut self,
        event: EventId,
        reason: TaskStatus,
        timeout: u32,
    ) -> Result<(), PendError> {
        if self.int_nesting > 0 || self.lock_nesting > 0 {
            return Err(PendError::BadContext);
        }
        let task = self.tcb_cur.ok_or(PendError::BadContext)?;
        self.events.get(event)?;
        if (reason & TaskStatus::PEND_ANY).is_empty() {
            return Err(PendError::BadParam);
        }

        let tcb = &mut self.tasks[task];
        tcb.status |= reason & TaskStatus::PEND_ANY;
        tcb.pend_outcome = Ok(());
        tcb.delay = timeout;
        tcb.event = Some(event);
        tcb.msg = None;
        let coords = tcb.coords;

        self.ready.remove(coords);
        self.events.add_waiter(event, coords);
        Ok(())
    }

    /// Wake up the highest-priority task waiting on `event`, handing it
    /// `msg`. Returns the priority of the task, or `None` if no task was
    /// waiting.
    ///
    /// The task becomes ready unless it's also suspended.
    pub fn event_task_ready(
        &mut self,
        event: EventId,
        msg: Option<usize>,
        reason: TaskStatus,
    ) -> Result<Option<u8>, BadIdError> {
        let Some(prio) = self.events.get(event)?.waiters.find_set() else {
            return Ok(None);
        };
        let Some(task) = self.tasks.task_at(prio) else {
            return Ok(None);
        };

        let tcb = &mut self.tasks[task];
        tcb.delay = 0;
        tcb.event = None;
        tcb.msg = msg;
        tcb.status.remove(reason & TaskStatus::PEND_ANY);
        tcb.pend_outcome = Ok(());
        let coords = tcb.coords;

        self.events.remove_waiter(event, coords);
        self.make_ready_if_runnable(task);
        Ok(Some(prio))
    }

    pub fn event_has_waiters(&self, event: EventId) -> Result<bool, BadIdError> {
        Ok(!self.events.get(event)?.waiters.is_empty())
    }

    /// Access the payload of `event`.
    pub fn event_payload_mut(&mut self, event: EventId) -> Result<&mut EventPayload, BadIdError> {
        Ok(&mut self.events.get_mut(event)?.payload)
    }

    /// Collect the outcome of the current task's last wait. Returns the
    /// message handed over by [`Self::event_task_ready`].
    pub fn finish_wait(&mut self) -> Result<Option<usize>, FinishWaitError> {
        let task = self.tcb_cur.ok_or(FinishWaitError::BadContext)?;
        let tcb = &mut self.tasks[task];
        let outcome = core::mem::replace(&mut tcb.pend_outcome, Ok(()));
        let msg = tcb.msg.take();
        outcome?;
        Ok(msg)
    }
}

impl<P: Port, H: Hooks, const TASKS: usize, const EVENTS: usize> Kernel<P, H, TASKS, EVENTS> {
    /// Allocate an event control block.
    pub fn create_event(&self, payload: EventPayload) -> Result<EventId, CreateEventError> {
        let mut state = self.state.lock(&self.port)?;
        if state.int_nesting > 0 {
            return Err(CreateEventError::BadContext);
        }
        let event = state
            .events
            .alloc(payload)
            .ok_or(CreateEventError::ResourceExhausted)?;
        log::trace!("created event {event:?}");
        Ok(event)
    }

    /// Free an event control block.
    pub fn delete_event(&self, event: EventId, mode: DeleteMode) -> Result<(), DeleteEventError> {
        let mut state = self.state.lock(&self.port)?;
        let state = &mut *state;
        if state.int_nesting > 0 {
            return Err(DeleteEventError::BadContext);
        }
        let has_waiters = state.event_has_waiters(event)?;

        match mode {
            DeleteMode::NoPend if has_waiters => return Err(DeleteEventError::TaskWaiting),
            DeleteMode::NoPend => {}
            DeleteMode::Always => {
                while let Some(prio) = state.events.get(event)?.waiters.find_set() {
                    match state.tasks.task_at(prio) {
                        Some(task) => {
                            state.tasks[task].delay = 0;
                            state.abandon_wait(task, WaitTimeoutError::Aborted);
                            state.make_ready_if_runnable(task);
                        }
                        None => state.events.remove_waiter(event, PrioCoords::new(prio)),
                    }
                }
            }
        }

        state.events.free(event);
        log::trace!("deleted event {event:?}");

        if has_waiters {
            self.reschedule(state);
        }
        Ok(())
    }

    /// Make the current task wait on `event` and reschedule. See
    /// [`State::event_task_wait`].
    pub fn pend(&self, event: EventId, reason: TaskStatus, timeout: u32) -> Result<(), PendError> {
        let mut state = self.state.lock(&self.port)?;
        state.event_task_wait(event, reason, timeout)?;
        self.reschedule(&mut state);
        Ok(())
    }

    /// Wake up the highest-priority task waiting on `event` and reschedule.
    /// Returns `true` if a task was waiting.
    pub fn post(
        &self,
        event: EventId,
        msg: Option<usize>,
        reason: TaskStatus,
    ) -> Result<bool, PostError> {
        let mut state = self.state.lock(&self.port)?;
        let woken = state.event_task_ready(event, msg, reason)?;
        if woken.is_some() {
            self.reschedule(&mut state);
        }
        Ok(woken.is_some())
    }

    /// See [`State::finish_wait`].
    pub fn finish_wait(&self) -> Result<Option<usize>, FinishWaitError> {
        self.state.lock(&self.port)?.finish_wait()
    }
}
