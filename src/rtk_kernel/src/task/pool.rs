//! The fixed-size pool of task control blocks (internal use only).
//!
//! **This module is exempt from the API stability guarantee.**
use core::{fmt, ops};

use super::{TaskCb, TaskId};
use crate::utils::{
    intrusive_list::{Link, ListAccessor, ListHead},
    Init, PRIO_BITMAP_LEN,
};

/// An entry of the priority table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PrioSlot {
    Free,
    /// Claimed by a task creation that hasn't allocated its TCB yet.
    Reserved,
    Task(TaskId),
}

/// Storage for `N` TCBs, indexable by [`TaskId`].
pub(crate) struct TcbArray<const N: usize>([TaskCb; N]);

impl<const N: usize> ops::Index<TaskId> for TcbArray<N> {
    type Output = TaskCb;

    #[inline]
    fn index(&self, index: TaskId) -> &Self::Output {
        &self.0[index.index()]
    }
}

impl<const N: usize> ops::IndexMut<TaskId> for TcbArray<N> {
    #[inline]
    fn index_mut(&mut self, index: TaskId) -> &mut Self::Output {
        &mut self.0[index.index()]
    }
}

fn tcb_link(tcb: &mut TaskCb) -> &mut Option<Link<TaskId>> {
    &mut tcb.link
}

/// The TCB pool.
///
/// Every TCB is either on the free list (singly linked through
/// `TaskCb::next_free`) or on the live list (doubly linked through
/// `TaskCb::link`), never both.
pub(crate) struct TaskPool<const N: usize> {
    tcbs: TcbArray<N>,
    free: Option<TaskId>,
    live: ListHead<TaskId>,
    prio_tbl: [PrioSlot; PRIO_BITMAP_LEN],
}

impl<const N: usize> fmt::Debug for TaskPool<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TaskPool")
            .field("free", &self.free)
            .field("live", &self.live)
            .finish_non_exhaustive()
    }
}

impl<const N: usize> TaskPool<N> {
    pub(crate) const fn new() -> Self {
        const TCB_INIT: TaskCb = TaskCb::INIT;
        let mut tcbs = [TCB_INIT; N];

        let mut i = 0;
        while i < N {
            tcbs[i].next_free = if i + 1 < N {
                Some(TaskId((i + 1) as u16))
            } else {
                None
            };
            i += 1;
        }

        Self {
            tcbs: TcbArray(tcbs),
            free: if N > 0 { Some(TaskId(0)) } else { None },
            live: ListHead::INIT,
            prio_tbl: [PrioSlot::Free; PRIO_BITMAP_LEN],
        }
    }

    /// Get the task registered at `prio`.
    #[inline]
    pub(crate) fn task_at(&self, prio: u8) -> Option<TaskId> {
        match self.prio_tbl.get(prio as usize) {
            Some(PrioSlot::Task(task)) => Some(*task),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn slot(&self, prio: u8) -> PrioSlot {
        self.prio_tbl[prio as usize]
    }

    /// Claim `prio` for a task being created. Returns `false` if the slot is
    /// already taken.
    pub(crate) fn reserve(&mut self, prio: u8) -> bool {
        let slot = &mut self.prio_tbl[prio as usize];
        if *slot != PrioSlot::Free {
            return false;
        }
        *slot = PrioSlot::Reserved;
        true
    }

    /// Undo [`Self::reserve`].
    pub(crate) fn release_reservation(&mut self, prio: u8) {
        let slot = &mut self.prio_tbl[prio as usize];
        debug_assert_eq!(*slot, PrioSlot::Reserved);
        *slot = PrioSlot::Free;
    }

    /// Pop a TCB off the free list.
    pub(crate) fn alloc(&mut self) -> Option<TaskId> {
        let task = self.free?;
        self.free = self.tcbs[task].next_free.take();
        Some(task)
    }

    /// Put an allocated TCB on the live list and register it at `prio`.
    pub(crate) fn register(&mut self, task: TaskId, prio: u8) {
        debug_assert_eq!(self.prio_tbl[prio as usize], PrioSlot::Reserved);
        self.prio_tbl[prio as usize] = PrioSlot::Task(task);
        let result = ListAccessor::new(&mut self.live, &mut self.tcbs, tcb_link).push_front(task);
        debug_assert!(result.is_ok(), "{task:?} is already live");
    }

    /// Remove a live TCB from the live list and the priority table, and
    /// return it to the free list.
    pub(crate) fn release(&mut self, task: TaskId) {
        let prio = self.tcbs[task].prio;
        debug_assert_eq!(self.prio_tbl[prio as usize], PrioSlot::Task(task));
        self.prio_tbl[prio as usize] = PrioSlot::Free;

        let result = ListAccessor::new(&mut self.live, &mut self.tcbs, tcb_link).remove(task);
        debug_assert!(result.is_ok(), "{task:?} is not live: {result:?}");

        self.tcbs[task].next_free = self.free;
        self.free = Some(task);
    }

    /// Move a live task's priority table entry from `old` to `new`. The
    /// caller must have checked that `new` is free.
    pub(crate) fn move_slot(&mut self, task: TaskId, old: u8, new: u8) {
        debug_assert_eq!(self.prio_tbl[old as usize], PrioSlot::Task(task));
        debug_assert_eq!(self.prio_tbl[new as usize], PrioSlot::Free);
        self.prio_tbl[old as usize] = PrioSlot::Free;
        self.prio_tbl[new as usize] = PrioSlot::Task(task);
    }

    /// The most recently registered live task.
    #[inline]
    pub(crate) fn live_front(&self) -> Option<TaskId> {
        self.live.first
    }

    #[inline]
    pub(crate) fn live_next(&self, task: TaskId) -> Option<TaskId> {
        self.tcbs[task].link.and_then(|link| link.next)
    }

    pub(crate) fn iter_live(&self) -> impl Iterator<Item = TaskId> + '_ {
        let mut cursor = self.live_front();
        core::iter::from_fn(move || {
            let task = cursor?;
            cursor = self.live_next(task);
            Some(task)
        })
    }

    pub(crate) fn iter_free(&self) -> impl Iterator<Item = TaskId> + '_ {
        let mut cursor = self.free;
        core::iter::from_fn(move || {
            let task = cursor?;
            cursor = self.tcbs[task].next_free;
            Some(task)
        })
    }
}

impl<const N: usize> ops::Index<TaskId> for TaskPool<N> {
    type Output = TaskCb;

    #[inline]
    fn index(&self, index: TaskId) -> &Self::Output {
        &self.tcbs[index]
    }
}

impl<const N: usize> ops::IndexMut<TaskId> for TaskPool<N> {
    #[inline]
    fn index_mut(&mut self, index: TaskId) -> &mut Self::Output {
        &mut self.tcbs[index]
    }
}
