//! The interface between the kernel and a per-CPU backend
use core::fmt;

use crate::task::TaskOptions;

/// A machine word on a task stack.
pub type StackWord = usize;

/// A saved stack pointer. Its meaning is defined by the port's frame layout.
pub type StackPtr = *mut StackWord;

/// The entry point of a task. Receives the parameter supplied at creation.
pub type TaskEntry = fn(usize);

/// Implemented by a port.
///
/// # Safety
///
/// Implementing a port is inherently unsafe because it's responsible for
/// masking interrupts and for saving and restoring task contexts.
///
/// These methods are only meant to be called by the kernel.
pub unsafe trait Port {
    /// The interrupt state saved by [`Self::enter_critical`].
    type CriticalState: Copy;

    /// The direction of stack growth. Used by stack checking.
    const STACK_GROWS_DOWN: bool = true;

    /// Mask interrupts and return the previous state. Must be callable
    /// while interrupts are already masked.
    fn enter_critical(&self) -> Self::CriticalState;

    /// Restore the interrupt state saved by the matching
    /// [`Self::enter_critical`].
    ///
    /// Precondition: Inside the critical section opened by that call
    unsafe fn exit_critical(&self, state: Self::CriticalState);

    /// Construct a register image on `stack` such that restoring it starts
    /// `entry` with `param` as its argument and interrupts enabled. Returns
    /// the stack pointer to save in the task's TCB.
    ///
    /// Precondition: Outside the critical section, `stack` not in use
    unsafe fn build_initial_stack_frame(
        &self,
        entry: TaskEntry,
        param: usize,
        stack: &StackRegion,
        options: TaskOptions,
    ) -> StackPtr;

    /// Request a task-level context switch.
    ///
    /// The switch must take place after the kernel leaves the current
    /// critical section (e.g., by pending a software interrupt). The switch
    /// handler saves the outgoing context and calls
    /// [`Kernel::switch_context`](crate::Kernel::switch_context).
    ///
    /// Precondition: Inside a critical section, task context
    unsafe fn context_switch(&self);

    /// Request a context switch from the interrupt return path. Same
    /// contract as [`Self::context_switch`].
    ///
    /// Precondition: Inside a critical section, exiting the outermost
    /// interrupt handler
    unsafe fn interrupt_context_switch(&self);

    /// Restore the register image at `sp` and enable interrupts, discarding
    /// the current (startup) context.
    ///
    /// Precondition: Interrupts masked, called exactly once
    unsafe fn start_first_task(&self, sp: StackPtr) -> !;
}

/// A task's stack memory, handed over to the kernel at task creation.
pub struct StackRegion {
    base: StackPtr,
    len: usize,
}

impl fmt::Debug for StackRegion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("StackRegion")
            .field("base", &self.base)
            .field("len", &self.len)
            .finish()
    }
}

impl StackRegion {
    /// Use a static buffer as a stack.
    pub fn from_static(stack: &'static mut [StackWord]) -> Self {
        Self {
            base: stack.as_mut_ptr(),
            len: stack.len(),
        }
    }

    /// Construct a `StackRegion` from a pointer and a length in words.
    ///
    /// # Safety
    ///
    /// The region must be valid for reads and writes, and must not be
    /// accessed by anything but the task and the kernel for as long as the
    /// kernel can use it.
    pub const unsafe fn from_raw_parts(base: StackPtr, len: usize) -> Self {
        Self { base, len }
    }

    /// The lowest address of the region.
    pub fn base(&self) -> StackPtr {
        self.base
    }

    /// The size in words.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the highest word of the region.
    pub fn top(&self) -> StackPtr {
        self.base.wrapping_add(self.len)
    }

    /// Zero-fill the region.
    pub(crate) unsafe fn clear(&self) {
        // Safety: The caller owns the region
        unsafe { core::ptr::write_bytes(self.base, 0, self.len) };
    }

    /// Count the consecutive zero words starting from the end opposite to
    /// where the stack starts.
    pub(crate) unsafe fn count_unused_words(&self, grows_down: bool) -> usize {
        let mut count = 0;
        while count < self.len {
            let i = if grows_down {
                count
            } else {
                self.len - 1 - count
            };
            // Safety: `i < len`. The task may be writing the other end.
            if unsafe { self.base.add(i).read_volatile() } != 0 {
                break;
            }
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_unused_words() {
        let buf: &'static mut [StackWord] = Box::leak(vec![0; 8].into_boxed_slice());
        buf[5] = 1;
        let region = StackRegion::from_static(buf);
        assert_eq!(unsafe { region.count_unused_words(true) }, 5);
        assert_eq!(unsafe { region.count_unused_words(false) }, 2);

        unsafe { region.clear() };
        assert_eq!(unsafe { region.count_unused_words(true) }, 8);
        assert_eq!(region.top(), region.base().wrapping_add(8));
    }
}
