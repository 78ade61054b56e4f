//! Result codes and per-operation error types
use core::fmt;

/// The macro to define [`ResultCode`].
macro_rules! define_result_code {
    (
        $( #[$meta:meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident = $vd:expr
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta] )*
                $vname = $vd
            ),*
        }

        impl ResultCode {
            /// Get the short name of the result code.
            ///
            /// # Examples
            ///
            /// ```
            /// use rtk_kernel::ResultCode;
            /// assert_eq!(ResultCode::PriorityInUse.as_str(), "PriorityInUse");
            /// ```
            pub fn as_str(self) -> &'static str {
                match self {
                    $(
                        Self::$vname => stringify!($vname),
                    )*
                }
            }
        }

        impl fmt::Debug for ResultCode {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_result_code! {
    /// All result codes (including success) that a kernel service can
    /// produce. Each operation-specific error type is a subset of this.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[repr(i8)]
    pub enum ResultCode {
        /// The operation was successful.
        Success = 0,
        /// The operation is not supported by the target object, e.g., a stack
        /// check was requested for a task created without
        /// [`TaskOptions::STACK_CHECK`].
        ///
        /// [`TaskOptions::STACK_CHECK`]: crate::TaskOptions::STACK_CHECK
        NotSupported = -9,
        /// A parameter is invalid in a way that is not covered by any other
        /// error codes.
        BadParam = -17,
        /// The specified event identifier does not refer to a live event.
        BadId = -18,
        /// The current context disallows the operation. This includes calling
        /// a blocking or task-management service from an interrupt handler,
        /// blocking while the scheduler is locked, and reentering the kernel
        /// while its state is locked.
        BadContext = -25,
        /// The priority is outside the configured range.
        InvalidPriority = -31,
        /// Another task already occupies the priority.
        PriorityInUse = -32,
        /// No task exists at the specified priority.
        NoSuchTask = -33,
        /// The operation would delete, suspend, or move a system task (the
        /// idle task or the statistics task).
        SystemTask = -34,
        /// A fixed-size kernel table (the TCB pool or the event pool) has no
        /// free entries.
        ResourceExhausted = -40,
        /// A target object is in a state that disallows the operation.
        BadObjectState = -41,
        /// One or more tasks are waiting on the event.
        TaskWaiting = -42,
        /// The wait was aborted because the event was deleted.
        Aborted = -49,
        /// The operation timed out.
        Timeout = -50,
    }
}

impl ResultCode {
    /// Get a flag indicating whether the code represents a failure.
    ///
    /// Failure codes have negative values.
    #[inline]
    pub fn is_err(self) -> bool {
        (self as i8) < 0
    }

    /// Get a flag indicating whether the code represents a success.
    ///
    /// Success codes have non-negative values.
    #[inline]
    pub fn is_ok(self) -> bool {
        !self.is_err()
    }
}

macro_rules! define_error {
    (
        mod $mod_name:ident {}
        $( #[$meta:meta] )*
        $vis:vis enum $name:ident $(: $($subty:ident),* $(,)*)? {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        ///
        /// See [`ResultCode`] for all result codes and generic descriptions.
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(i8)]
        $vis enum $name {
            $(
                $( #[$vmeta] )*
                // Use the same discriminants as `ResultCode` for cost-free
                // conversion
                $vname = ResultCode::$vname as i8
            ),*
        }

        impl fmt::Debug for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                ResultCode::from(*self).fmt(f)
            }
        }

        impl From<Result<(), $name>> for ResultCode {
            #[inline]
            fn from(x: Result<(), $name>) -> Self {
                match x {
                    Ok(()) => Self::Success,
                    Err(e) => Self::from(e),
                }
            }
        }

        impl From<$name> for ResultCode {
            #[inline]
            fn from(x: $name) -> Self {
                match x {
                    $(
                        $name::$vname => Self::$vname,
                    )*
                }
            }
        }

        #[cfg(test)]
        mod $mod_name {
            use super::*;

            #[test]
            fn to_result_code() {
                $(
                    assert_eq!(
                        ResultCode::$vname as i8,
                        $name::$vname as i8,
                    );
                    assert_eq!(
                        ResultCode::$vname,
                        ResultCode::from($name::$vname),
                    );
                )*
            }

            #[test]
            fn result_to_result_code() {
                $(
                    assert_eq!(
                        ResultCode::$vname,
                        ResultCode::from(Err($name::$vname)),
                    );
                )*
                assert_eq!(
                    ResultCode::Success,
                    ResultCode::from(Result::<(), $name>::Ok(())),
                );
            }
        }

        $($(
            $subty!(impl From<_> for $name);
        )*)?

        #[allow(unused_macros)]
        macro_rules! $name {
            (impl From<_> for $dest_ty:ty) => {
                impl From<$name> for $dest_ty {
                    #[inline]
                    fn from(x: $name) -> Self {
                        match x {
                            $(
                                $name::$vname => Self::$vname,
                            )*
                        }
                    }
                }
            };
        }
    };
}

define_error! {
    mod bad_context_error {}
    /// The current context disallows the operation.
    pub enum BadContextError {
        BadContext,
    }
}

define_error! {
    mod bad_id_error {}
    /// The event identifier is invalid.
    pub enum BadIdError {
        BadId,
    }
}

define_error! {
    mod task_lookup_error {}
    /// The task selector doesn't refer to a live task.
    pub enum TaskLookupError {
        /// The priority is greater than the configured lowest priority.
        InvalidPriority,
        /// No task exists at the priority, or there is no current task.
        NoSuchTask,
    }
}

define_error! {
    mod create_task_error {}
    /// Error type for [`Kernel::create_task`].
    ///
    /// [`Kernel::create_task`]: crate::Kernel::create_task
    pub enum CreateTaskError: BadContextError {
        /// Called from an interrupt handler, or the kernel state is locked.
        BadContext,
        /// The task name doesn't fit in [`TASK_NAME_LEN`] bytes.
        ///
        /// [`TASK_NAME_LEN`]: crate::TASK_NAME_LEN
        BadParam,
        /// The priority is greater than the configured lowest priority.
        InvalidPriority,
        /// The priority is already occupied.
        PriorityInUse,
        /// There are no free task control blocks.
        ResourceExhausted,
        /// The kernel is not initialized.
        BadObjectState,
    }
}

define_error! {
    mod delete_task_error {}
    /// Error type for [`Kernel::delete_task`] and
    /// [`Kernel::exit_current_task`].
    ///
    /// [`Kernel::delete_task`]: crate::Kernel::delete_task
    /// [`Kernel::exit_current_task`]: crate::Kernel::exit_current_task
    pub enum DeleteTaskError: BadContextError, TaskLookupError {
        /// Called from an interrupt handler, or the kernel state is locked.
        BadContext,
        InvalidPriority,
        NoSuchTask,
        /// The target is the idle task or the statistics task.
        SystemTask,
    }
}

define_error! {
    mod request_deletion_error {}
    /// Error type for [`Kernel::request_task_deletion`].
    ///
    /// [`Kernel::request_task_deletion`]: crate::Kernel::request_task_deletion
    pub enum RequestDeletionError: BadContextError, TaskLookupError {
        BadContext,
        InvalidPriority,
        NoSuchTask,
        /// The target is the idle task or the statistics task.
        SystemTask,
    }
}

define_error! {
    mod suspend_task_error {}
    /// Error type for [`Kernel::suspend_task`].
    ///
    /// [`Kernel::suspend_task`]: crate::Kernel::suspend_task
    pub enum SuspendTaskError: BadContextError, TaskLookupError {
        BadContext,
        InvalidPriority,
        NoSuchTask,
        /// The target is the idle task.
        SystemTask,
    }
}

define_error! {
    mod resume_task_error {}
    /// Error type for [`Kernel::resume_task`].
    ///
    /// [`Kernel::resume_task`]: crate::Kernel::resume_task
    pub enum ResumeTaskError: BadContextError, TaskLookupError {
        BadContext,
        InvalidPriority,
        NoSuchTask,
        /// The task is not suspended.
        BadObjectState,
    }
}

define_error! {
    mod change_priority_error {}
    /// Error type for [`Kernel::change_task_priority`].
    ///
    /// [`Kernel::change_task_priority`]: crate::Kernel::change_task_priority
    pub enum ChangePriorityError: BadContextError, TaskLookupError {
        BadContext,
        /// Either priority is out of range, or one of them is the idle task's
        /// priority.
        InvalidPriority,
        /// The new priority is already occupied.
        PriorityInUse,
        NoSuchTask,
        /// The target is the statistics task.
        SystemTask,
    }
}

define_error! {
    mod query_task_error {}
    /// Error type for [`Kernel::task_info`] and [`Kernel::task_name`].
    ///
    /// [`Kernel::task_info`]: crate::Kernel::task_info
    /// [`Kernel::task_name`]: crate::Kernel::task_name
    pub enum QueryTaskError: BadContextError, TaskLookupError {
        BadContext,
        InvalidPriority,
        NoSuchTask,
    }
}

define_error! {
    mod set_task_name_error {}
    /// Error type for [`Kernel::set_task_name`].
    ///
    /// [`Kernel::set_task_name`]: crate::Kernel::set_task_name
    pub enum SetTaskNameError: BadContextError, TaskLookupError {
        BadContext,
        /// The name doesn't fit in [`TASK_NAME_LEN`] bytes.
        ///
        /// [`TASK_NAME_LEN`]: crate::TASK_NAME_LEN
        BadParam,
        InvalidPriority,
        NoSuchTask,
    }
}

define_error! {
    mod check_stack_error {}
    /// Error type for [`Kernel::check_task_stack`].
    ///
    /// [`Kernel::check_task_stack`]: crate::Kernel::check_task_stack
    pub enum CheckStackError: BadContextError, TaskLookupError {
        BadContext,
        InvalidPriority,
        NoSuchTask,
        /// The task was created without [`TaskOptions::STACK_CHECK`].
        ///
        /// [`TaskOptions::STACK_CHECK`]: crate::TaskOptions::STACK_CHECK
        NotSupported,
    }
}

define_error! {
    mod delay_error {}
    /// Error type for [`Kernel::delay`] and [`Kernel::delay_hmsm`].
    ///
    /// [`Kernel::delay`]: crate::Kernel::delay
    /// [`Kernel::delay_hmsm`]: crate::Kernel::delay_hmsm
    pub enum DelayError: BadContextError {
        /// Called from an interrupt handler or with the scheduler locked.
        BadContext,
        /// A time component is out of range, or the total is zero.
        BadParam,
    }
}

define_error! {
    mod resume_delay_error {}
    /// Error type for [`Kernel::resume_delay`].
    ///
    /// [`Kernel::resume_delay`]: crate::Kernel::resume_delay
    pub enum ResumeDelayError: BadContextError, TaskLookupError {
        BadContext,
        InvalidPriority,
        NoSuchTask,
        /// The task is not delayed.
        BadObjectState,
    }
}

define_error! {
    mod init_error {}
    /// Error type for [`Kernel::init`].
    ///
    /// [`Kernel::init`]: crate::Kernel::init
    pub enum InitError: BadContextError {
        BadContext,
        /// The statistics task is enabled but no stack was supplied for it.
        BadParam,
        /// The kernel was already initialized.
        BadObjectState,
    }
}

define_error! {
    mod start_error {}
    /// Error type for [`Kernel::start`].
    ///
    /// [`Kernel::start`]: crate::Kernel::start
    pub enum StartError: BadContextError {
        BadContext,
        /// The kernel is not initialized or is already running.
        BadObjectState,
    }
}

define_error! {
    mod create_event_error {}
    /// Error type for [`Kernel::create_event`].
    ///
    /// [`Kernel::create_event`]: crate::Kernel::create_event
    pub enum CreateEventError: BadContextError {
        BadContext,
        /// There are no free event control blocks.
        ResourceExhausted,
    }
}

define_error! {
    mod delete_event_error {}
    /// Error type for [`Kernel::delete_event`].
    ///
    /// [`Kernel::delete_event`]: crate::Kernel::delete_event
    pub enum DeleteEventError: BadContextError, BadIdError {
        BadContext,
        BadId,
        /// Tasks are waiting on the event and
        /// [`DeleteMode::NoPend`](crate::DeleteMode::NoPend) was requested.
        TaskWaiting,
    }
}

define_error! {
    mod pend_error {}
    /// Error type for [`State::event_task_wait`] and [`Kernel::pend`].
    ///
    /// [`State::event_task_wait`]: crate::State::event_task_wait
    /// [`Kernel::pend`]: crate::Kernel::pend
    pub enum PendError: BadContextError, BadIdError {
        /// Called from an interrupt handler or with the scheduler locked.
        BadContext,
        /// The pend reason includes no pend bit.
        BadParam,
        BadId,
    }
}

define_error! {
    mod post_error {}
    /// Error type for [`Kernel::post`].
    ///
    /// [`Kernel::post`]: crate::Kernel::post
    pub enum PostError: BadContextError, BadIdError {
        BadContext,
        BadId,
    }
}

define_error! {
    mod wait_timeout_error {}
    /// The outcome of a wait that ended without a post.
    pub enum WaitTimeoutError {
        /// The event was deleted while the task was waiting.
        Aborted,
        /// The wait timed out.
        Timeout,
    }
}

define_error! {
    mod finish_wait_error {}
    /// Error type for [`State::finish_wait`] and [`Kernel::finish_wait`].
    ///
    /// [`State::finish_wait`]: crate::State::finish_wait
    /// [`Kernel::finish_wait`]: crate::Kernel::finish_wait
    pub enum FinishWaitError: BadContextError, WaitTimeoutError {
        BadContext,
        Aborted,
        Timeout,
    }
}
