//! A simulated port and test fixtures
use std::{
    cell::{Cell, RefCell},
    panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
};

use crate::{
    cfg::Config,
    hook::Hooks,
    port::{Port, StackPtr, StackRegion, StackWord, TaskEntry},
    sched::SwitchKind,
    startup::SystemStacks,
    task::{TaskCb, TaskOptions},
    Kernel,
};

pub(crate) type TestKernel = Kernel<TestPort, TestHooks, 8, 4>;

/// The payload `TestPort::start_first_task` unwinds with.
struct FirstTaskDispatched(usize);

/// A port that records context switch requests instead of performing them.
/// [`dispatch`] plays the role of the switch handler.
pub(crate) struct TestPort {
    masked: Cell<bool>,
    pending: Cell<Option<SwitchKind>>,
    switches: RefCell<Vec<SwitchKind>>,
    running_sp: Cell<StackPtr>,
}

impl TestPort {
    pub(crate) fn new() -> Self {
        Self {
            masked: Cell::new(false),
            pending: Cell::new(None),
            switches: RefCell::new(Vec::new()),
            running_sp: Cell::new(std::ptr::null_mut()),
        }
    }

    pub(crate) fn is_masked(&self) -> bool {
        self.masked.get()
    }

    /// Take the log of switch requests.
    pub(crate) fn take_switches(&self) -> Vec<SwitchKind> {
        self.switches.take()
    }

    /// The stack pointer of the task the simulated CPU is running.
    pub(crate) fn running_sp(&self) -> StackPtr {
        self.running_sp.get()
    }

    fn request(&self, kind: SwitchKind) {
        assert!(self.masked.get(), "switch requested outside a critical section");
        log::trace!("{kind:?} switch requested");
        self.switches.borrow_mut().push(kind);
        self.pending.set(Some(kind));
    }
}

unsafe impl Port for TestPort {
    type CriticalState = bool;

    fn enter_critical(&self) -> bool {
        self.masked.replace(true)
    }

    unsafe fn exit_critical(&self, state: bool) {
        self.masked.set(state);
    }

    /// Push the entry point and the parameter. The saved stack pointer points
    /// to the parameter.
    unsafe fn build_initial_stack_frame(
        &self,
        entry: TaskEntry,
        param: usize,
        stack: &StackRegion,
        _options: TaskOptions,
    ) -> StackPtr {
        assert!(stack.len() >= 2);
        assert!(!self.masked.get());
        let top = stack.top();
        // Safety: The region holds at least two words
        unsafe {
            let sp = top.sub(2);
            sp.add(1).write(entry as usize as StackWord);
            sp.write(param);
            sp
        }
    }

    unsafe fn context_switch(&self) {
        self.request(SwitchKind::Task);
    }

    unsafe fn interrupt_context_switch(&self) {
        self.request(SwitchKind::Interrupt);
    }

    unsafe fn start_first_task(&self, sp: StackPtr) -> ! {
        assert!(self.masked.get());
        self.masked.set(false);
        resume_unwind(Box::new(FirstTaskDispatched(sp as usize)))
    }
}

/// Perform the pending context switch, if any. Returns `true` if one was
/// pending.
pub(crate) fn dispatch<H: Hooks, const T: usize, const E: usize>(
    kernel: &Kernel<TestPort, H, T, E>,
) -> bool {
    let port = kernel.port();
    if port.pending.take().is_none() {
        return false;
    }
    let incoming = kernel.switch_context(port.running_sp.get()).unwrap();
    port.running_sp.set(incoming);
    true
}

/// Call [`Kernel::start`] and catch the first task dispatch. Returns the
/// stack pointer of the first task.
pub(crate) fn start<H: Hooks, const T: usize, const E: usize>(
    kernel: &Kernel<TestPort, H, T, E>,
) -> StackPtr {
    let result = catch_unwind(AssertUnwindSafe(|| kernel.start()));
    let payload = match result {
        Ok(Ok(never)) => match never {},
        Ok(Err(e)) => panic!("start failed: {e:?}"),
        Err(payload) => payload,
    };
    let dispatched = payload
        .downcast::<FirstTaskDispatched>()
        .unwrap_or_else(|payload| resume_unwind(payload));
    let sp = dispatched.0 as StackPtr;
    kernel.port().running_sp.set(sp);
    sp
}

/// A recorded hook invocation. Task hooks record the task's priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HookCall {
    InitBegin,
    InitEnd,
    TaskCreate(u8),
    TaskDelete(u8),
    TaskReturn(u8),
    TaskSwitch(Option<u8>, u8),
    TcbInit(u8),
    Idle,
    Stat,
    TimeTick,
}

#[derive(Default)]
pub(crate) struct TestHooks {
    calls: RefCell<Vec<HookCall>>,
}

impl TestHooks {
    pub(crate) fn take_calls(&self) -> Vec<HookCall> {
        self.calls.take()
    }

    fn record(&self, call: HookCall) {
        log::trace!("hook: {call:?}");
        self.calls.borrow_mut().push(call);
    }
}

impl Hooks for TestHooks {
    fn init_begin(&self) {
        self.record(HookCall::InitBegin);
    }

    fn init_end(&self) {
        self.record(HookCall::InitEnd);
    }

    fn task_create(&self, task: &TaskCb) {
        self.record(HookCall::TaskCreate(task.priority()));
    }

    fn task_delete(&self, task: &TaskCb) {
        self.record(HookCall::TaskDelete(task.priority()));
    }

    fn task_return(&self, task: &TaskCb) {
        self.record(HookCall::TaskReturn(task.priority()));
    }

    fn task_switch(&self, from: Option<&TaskCb>, to: &TaskCb) {
        self.record(HookCall::TaskSwitch(
            from.map(TaskCb::priority),
            to.priority(),
        ));
    }

    fn tcb_init(&self, task: &TaskCb) {
        self.record(HookCall::TcbInit(task.priority()));
    }

    fn idle(&self) {
        self.record(HookCall::Idle);
    }

    fn stat(&self) {
        self.record(HookCall::Stat);
    }

    fn time_tick(&self) {
        self.record(HookCall::TimeTick);
    }
}

/// Construct a kernel that lives until the end of the test process.
pub(crate) fn new_kernel(config: Config) -> &'static TestKernel {
    let _ = env_logger::builder().is_test(true).try_init();
    Box::leak(Box::new(Kernel::new(
        TestPort::new(),
        TestHooks::default(),
        config,
    )))
}

/// Construct and initialize a kernel.
pub(crate) fn init_kernel(config: Config) -> &'static TestKernel {
    let kernel = new_kernel(config);
    kernel
        .init(SystemStacks {
            idle: stack(),
            stat: config.stat_task.then(stack),
        })
        .unwrap();
    kernel
}

/// Allocate a zeroed stack of `len` words.
pub(crate) fn task_stack(len: usize) -> StackRegion {
    fill_stack(len, 0)
}

/// Allocate a stack of `len` words filled with `value`.
pub(crate) fn fill_stack(len: usize, value: StackWord) -> StackRegion {
    StackRegion::from_static(Box::leak(vec![value; len].into_boxed_slice()))
}

pub(crate) fn stack() -> StackRegion {
    task_stack(64)
}
