//! Kernel state locking mechanism
use core::{
    cell::{RefCell, RefMut},
    fmt,
    mem::ManuallyDrop,
    ops,
};

use crate::{error::BadContextError, port::Port};

/// Cell type that can be accessed only inside a critical section (obtained
/// by [`CpuLockCell::lock`]).
// A `RefCell` rather than a singleton token, so that each `Kernel` instance
// can own its own state.
pub(crate) struct CpuLockCell<T>(RefCell<T>);

impl<T> CpuLockCell<T> {
    pub(crate) const fn new(x: T) -> Self {
        Self(RefCell::new(x))
    }

    /// Enter a critical section and borrow the contents.
    ///
    /// Fails with `BadContext` if the contents are already borrowed, which
    /// happens when a kernel service is called from a hook or from an
    /// interrupt handler that preempted the kernel inside a port without
    /// real interrupt masking.
    pub(crate) fn lock<'a, P: Port>(
        &'a self,
        port: &'a P,
    ) -> Result<CpuLockGuard<'a, P, T>, BadContextError> {
        let saved = port.enter_critical();
        match self.0.try_borrow_mut() {
            Ok(inner) => Ok(CpuLockGuard {
                inner: ManuallyDrop::new(inner),
                port,
                saved,
            }),
            Err(_) => {
                // Safety: Paired with the `enter_critical` above
                unsafe { port.exit_critical(saved) };
                Err(BadContextError::BadContext)
            }
        }
    }
}

/// RAII guard for a critical section. Restores the saved interrupt state
/// when dropped.
pub struct CpuLockGuard<'a, P: Port, T> {
    inner: ManuallyDrop<RefMut<'a, T>>,
    port: &'a P,
    saved: P::CriticalState,
}

impl<P: Port, T> CpuLockGuard<'_, P, T> {
    /// Release the borrow but leave interrupts masked.
    pub(crate) fn leak(self) {
        let mut this = ManuallyDrop::new(self);
        // Safety: `this.inner` is never touched again
        unsafe { ManuallyDrop::drop(&mut this.inner) };
    }
}

impl<P: Port, T> Drop for CpuLockGuard<'_, P, T> {
    #[inline]
    fn drop(&mut self) {
        // The borrow must end before interrupts are unmasked. The port may
        // perform a pended context switch at that moment.
        // Safety: `self.inner` is never touched again
        unsafe { ManuallyDrop::drop(&mut self.inner) };
        // Safety: Paired with the `enter_critical` in `CpuLockCell::lock`
        unsafe { self.port.exit_critical(self.saved) };
    }
}

impl<P: Port, T> ops::Deref for CpuLockGuard<'_, P, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<P: Port, T> ops::DerefMut for CpuLockGuard<'_, P, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<P: Port, T: fmt::Debug> fmt::Debug for CpuLockGuard<'_, P, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("CpuLockGuard").field(&**self.inner).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_port::TestPort;

    #[test]
    fn nested_lock_fails_and_restores() {
        let port = TestPort::new();
        let cell = CpuLockCell::new(42u32);

        let guard = cell.lock(&port).unwrap();
        assert!(port.is_masked());
        assert_eq!(*guard, 42);

        assert_eq!(cell.lock(&port).err(), Some(BadContextError::BadContext));
        // The failed attempt restored the state it saw (masked)
        assert!(port.is_masked());

        drop(guard);
        assert!(!port.is_masked());
    }

    #[test]
    fn leak_keeps_interrupts_masked() {
        let port = TestPort::new();
        let cell = CpuLockCell::new(0u32);

        let mut guard = cell.lock(&port).unwrap();
        *guard = 7;
        guard.leak();
        assert!(port.is_masked());

        // The borrow was released
        let guard = cell.lock(&port).unwrap();
        assert_eq!(*guard, 7);
    }
}
