//! Tick processing and time services
use crate::{
    error::{BadContextError, DelayError, ResumeDelayError, WaitTimeoutError},
    hook::Hooks,
    port::Port,
    state::State,
    task::{TaskId, TaskSel, TaskStatus},
    Kernel,
};

impl<const TASKS: usize, const EVENTS: usize> State<TASKS, EVENTS> {
    /// Advance the delay of one task by a tick.
    pub(crate) fn tick_task(&mut self, task: TaskId) {
        let tcb = &mut self.tasks[task];
        if tcb.delay == 0 {
            return;
        }
        tcb.delay -= 1;
        if tcb.delay != 0 {
            return;
        }

        if tcb.status.contains(TaskStatus::SUSPEND) {
            // Retry every tick until the suspension is lifted
            tcb.delay = 1;
            return;
        }

        if tcb.status.intersects(TaskStatus::PEND_ANY) {
            self.abandon_wait(task, WaitTimeoutError::Timeout);
        }
        self.make_ready_if_runnable(task);
    }

    /// End a task's wait on an event without a post.
    pub(crate) fn abandon_wait(&mut self, task: TaskId, outcome: WaitTimeoutError) {
        let tcb = &mut self.tasks[task];
        tcb.status.remove(TaskStatus::PEND_ANY);
        tcb.pend_outcome = Err(outcome);
        tcb.msg = None;
        let coords = tcb.coords;
        if let Some(event) = tcb.event.take() {
            self.events.remove_waiter(event, coords);
        }
    }
}

impl<P: Port, H: Hooks, const TASKS: usize, const EVENTS: usize> Kernel<P, H, TASKS, EVENTS> {
    /// Process a timer tick. Call once per tick from the timer interrupt
    /// handler, between [`Self::interrupt_enter`] and
    /// [`Self::interrupt_exit`].
    ///
    /// Invokes [`Hooks::time_tick`], increments the tick counter, and
    /// advances the delay of every task. Each task is handled in its own
    /// critical section.
    pub fn tick(&self) -> Result<(), BadContextError> {
        self.hooks.time_tick();

        let mut cursor = {
            let mut state = self.state.lock(&self.port)?;
            state.time = state.time.wrapping_add(1);
            if !state.running {
                return Ok(());
            }
            state.tasks.live_front()
        };

        let idle_prio = self.config.idle_priority();
        while let Some(task) = cursor {
            let mut state = self.state.lock(&self.port)?;
            // The idle task is the oldest task and thus the last one
            if state.tasks[task].prio == idle_prio {
                break;
            }
            state.tick_task(task);
            cursor = state.tasks.live_next(task);
        }
        Ok(())
    }

    /// Block the current task for `ticks` ticks. `0` returns immediately.
    pub fn delay(&self, ticks: u32) -> Result<(), DelayError> {
        let mut state = self.state.lock(&self.port)?;
        let state = &mut *state;
        if state.int_nesting > 0 || state.lock_nesting > 0 {
            return Err(DelayError::BadContext);
        }
        if ticks == 0 {
            return Ok(());
        }
        let task = state.tcb_cur.ok_or(DelayError::BadContext)?;

        let tcb = &mut state.tasks[task];
        tcb.delay = ticks;
        let coords = tcb.coords;
        state.ready.remove(coords);

        self.reschedule(state);
        Ok(())
    }

    /// Block the current task for the specified wall-clock time, rounded to
    /// the nearest tick.
    ///
    /// `minutes` and `seconds` must be less than 60 and `millis` less than
    /// 1000. An all-zero duration is rejected.
    pub fn delay_hmsm(
        &self,
        hours: u8,
        minutes: u8,
        seconds: u8,
        millis: u16,
    ) -> Result<(), DelayError> {
        if self.interrupt_nesting()? > 0 {
            return Err(DelayError::BadContext);
        }
        if (hours, minutes, seconds, millis) == (0, 0, 0, 0)
            || minutes > 59
            || seconds > 59
            || millis > 999
        {
            return Err(DelayError::BadParam);
        }

        let ticks = hmsm_to_ticks(self.config.ticks_per_sec, hours, minutes, seconds, millis)
            .ok_or(DelayError::BadParam)?;
        self.delay(ticks)
    }

    /// Cancel the delay (or wait timeout) of the task at `prio`.
    ///
    /// A task waiting on an event stops waiting and observes a timeout. The
    /// task becomes ready unless it's suspended.
    pub fn resume_delay(&self, prio: u8) -> Result<(), ResumeDelayError> {
        let mut state = self.state.lock(&self.port)?;
        let state = &mut *state;

        let task = state.lookup(TaskSel::Priority(prio))?;
        let tcb = &mut state.tasks[task];
        if tcb.delay == 0 {
            return Err(ResumeDelayError::BadObjectState);
        }
        tcb.delay = 0;

        if tcb.status.intersects(TaskStatus::PEND_ANY) {
            state.abandon_wait(task, WaitTimeoutError::Timeout);
        }
        state.make_ready_if_runnable(task);

        self.reschedule(state);
        Ok(())
    }

    /// Get the tick counter.
    pub fn time(&self) -> Result<u32, BadContextError> {
        self.read(|state| state.time)
    }

    pub fn set_time(&self, time: u32) -> Result<(), BadContextError> {
        self.state.lock(&self.port)?.time = time;
        Ok(())
    }
}

/// Convert a wall-clock duration into ticks, rounding the millisecond part
/// to the nearest tick. Returns `None` on overflow.
fn hmsm_to_ticks(ticks_per_sec: u32, hours: u8, minutes: u8, seconds: u8, millis: u16) -> Option<u32> {
    let tps = u64::from(ticks_per_sec);
    let secs = u64::from(hours) * 3600 + u64::from(minutes) * 60 + u64::from(seconds);
    let ticks = secs * tps + tps * (u64::from(millis) + 500 / tps) / 1000;
    u32::try_from(ticks).ok()
}
