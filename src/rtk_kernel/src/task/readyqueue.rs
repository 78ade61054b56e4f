//! Task ready queue (internal use only).
//!
//! **This module is exempt from the API stability guarantee.**
use core::fmt;

use crate::utils::{Init, PrioBitmap, PrioCoords};

/// Tracks the set of priorities whose task is in the Ready state.
///
/// Priorities are unique among live tasks, so a single bit per priority
/// suffices and there is no per-priority FIFO.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadyQueue {
    bitmap: PrioBitmap,
}

impl Init for ReadyQueue {
    const INIT: Self = Self {
        bitmap: PrioBitmap::INIT,
    };
}

impl fmt::Debug for ReadyQueue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("ReadyQueue").field(&self.bitmap).finish()
    }
}

impl ReadyQueue {
    /// Mark the task at `coords` as ready. Idempotent.
    #[inline]
    pub(crate) fn insert(&mut self, coords: PrioCoords) {
        self.bitmap.set(coords);
    }

    /// Mark the task at `coords` as not ready.
    #[inline]
    pub(crate) fn remove(&mut self, coords: PrioCoords) {
        self.bitmap.clear(coords);
    }

    #[inline]
    pub(crate) fn contains(&self, coords: PrioCoords) -> bool {
        self.bitmap.get(coords)
    }

    /// Get the highest (numerically lowest) ready priority.
    #[inline]
    pub(crate) fn highest(&self) -> Option<u8> {
        self.bitmap.find_set()
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.bitmap.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn reinserting_is_noop(prios: Vec<u8>, again: u8) {
        let mut queue = ReadyQueue::INIT;
        for &p in &prios {
            queue.insert(PrioCoords::new(p % 64));
        }
        let coords = PrioCoords::new(again % 64);
        queue.insert(coords);
        let snapshot = queue;
        queue.insert(coords);
        assert_eq!(queue, snapshot);
        assert!(queue.contains(coords));
    }

    #[quickcheck]
    fn highest_is_minimum(prios: Vec<u8>) {
        let mut queue = ReadyQueue::INIT;
        for &p in &prios {
            queue.insert(PrioCoords::new(p % 64));
        }
        assert_eq!(queue.highest(), prios.iter().map(|p| p % 64).min());
        assert_eq!(queue.iter().count(), {
            let mut v: Vec<u8> = prios.iter().map(|p| p % 64).collect();
            v.sort_unstable();
            v.dedup();
            v.len()
        });
    }

    #[test]
    fn remove_then_empty() {
        let mut queue = ReadyQueue::INIT;
        queue.insert(PrioCoords::new(31));
        queue.insert(PrioCoords::new(5));
        assert_eq!(queue.highest(), Some(5));
        queue.remove(PrioCoords::new(5));
        assert_eq!(queue.highest(), Some(31));
        queue.remove(PrioCoords::new(31));
        assert_eq!(queue.highest(), None);
    }
}
