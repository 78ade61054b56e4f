//! Kernel configuration
use crate::utils::PRIO_BITMAP_LEN;

/// Static kernel configuration.
///
/// The sizes of the TCB and event pools are the const parameters of
/// [`Kernel`](crate::Kernel).
///
/// # Examples
///
/// ```
/// use rtk_kernel::Config;
/// const CONFIG: Config = Config::new()
///     .lowest_priority(31)
///     .ticks_per_sec(1000)
///     .stat_task(true);
/// assert_eq!(CONFIG.idle_priority(), 31);
/// assert_eq!(CONFIG.stat_priority(), Some(30));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// The lowest (numerically greatest) priority, occupied by the idle
    /// task. Must be less than `64`.
    pub lowest_priority: u8,
    /// The number of [`Kernel::tick`](crate::Kernel::tick) calls per second.
    pub ticks_per_sec: u32,
    /// Create the statistics task at `lowest_priority - 1`.
    pub stat_task: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub const fn new() -> Self {
        Self {
            lowest_priority: 63,
            ticks_per_sec: 100,
            stat_task: false,
        }
    }

    pub const fn lowest_priority(self, lowest_priority: u8) -> Self {
        Self {
            lowest_priority,
            ..self
        }
    }

    pub const fn ticks_per_sec(self, ticks_per_sec: u32) -> Self {
        Self {
            ticks_per_sec,
            ..self
        }
    }

    pub const fn stat_task(self, stat_task: bool) -> Self {
        Self { stat_task, ..self }
    }

    #[inline]
    pub const fn idle_priority(&self) -> u8 {
        self.lowest_priority
    }

    #[inline]
    pub const fn stat_priority(&self) -> Option<u8> {
        if self.stat_task {
            Some(self.lowest_priority - 1)
        } else {
            None
        }
    }

    /// The number of TCBs consumed by [`Kernel::init`](crate::Kernel::init).
    pub const fn system_task_count(&self) -> usize {
        if self.stat_task {
            2
        } else {
            1
        }
    }

    /// Panic if the configuration is unusable with a TCB pool of `tasks`
    /// entries.
    pub(crate) const fn validate(&self, tasks: usize) {
        assert!(
            (self.lowest_priority as usize) < PRIO_BITMAP_LEN,
            "`lowest_priority` must be less than 64"
        );
        assert!(
            !self.stat_task || self.lowest_priority >= 1,
            "the statistics task needs a priority above the idle task"
        );
        assert!(self.ticks_per_sec > 0, "`ticks_per_sec` must not be zero");
        assert!(
            tasks >= self.system_task_count(),
            "the TCB pool can't hold the system tasks"
        );
        assert!(tasks <= u16::MAX as usize, "the TCB pool is too large");
    }
}
