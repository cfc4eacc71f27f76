//! Task table and scheduler loop.
//!
//! Single-threaded cooperative scheduling per the runtime's concurrency
//! model: one `Scheduler` drives one backend on one OS thread. "Auto"
//! threading mode (multiple runtimes, each with its own scheduler, one per
//! thread) is built by running several of these, not by this module
//! growing worker-pool logic — no shared worker pool, priority bitmap,
//! forced-preemption signal handling, or dedicated timer thread, since
//! none of that has a counterpart in this runtime's
//! single-threaded-per-instance model.

use crate::arch;
use crate::config::RuntimeConfig;
use crate::memory::FrameStack;
use crate::tls;
use fiberio_core::backend::AioBackend;
use fiberio_core::completion::{Completion, CompletionResult};
use fiberio_core::error::{RtError, RtResult};
use fiberio_core::id::TaskId;
use fiberio_core::job::AioOp;
use fiberio_core::state::TaskState;
use std::cell::Cell;
use std::collections::VecDeque;

thread_local! {
    static CURRENT_SCHEDULER: Cell<*mut Scheduler> = const { Cell::new(std::ptr::null_mut()) };
}

/// Pointer to the scheduler currently driving this thread, or null between
/// runs. Read by [`io_await`] and [`yield_now`], which are free functions
/// so frame code can call them without threading a `&mut Scheduler`
/// through every I/O method.
pub(crate) fn current_scheduler_ptr() -> *mut Scheduler {
    CURRENT_SCHEDULER.with(|cell| cell.get())
}

fn set_current_scheduler(ptr: *mut Scheduler) -> *mut Scheduler {
    CURRENT_SCHEDULER.with(|cell| cell.replace(ptr))
}

/// A re-exported alias: user code never sees a bare [`TaskId`] outside this
/// crate today, but keeping the name distinct from `fiberio_core::TaskId`
/// leaves room for the facade to wrap it without a breaking rename later.
pub type TaskHandle = TaskId;

/// One task slot: a frame's stack, saved registers, and pending result.
pub(crate) struct TaskSlot {
    pub state: TaskState,
    pub regs: arch::SavedRegs,
    pub stack: Option<FrameStack>,
    pub result: Option<CompletionResult>,
    /// An op that lost the race for an in-flight backend slot at
    /// `io_await` time (`size_aio_jobs_max` admission control). Parked
    /// here until [`Scheduler::admit_pending`] finds room; the slot is
    /// already `Waiting` the whole time, so the frame sees no difference
    /// between "submitted, no completion yet" and "not yet submitted".
    pub pending_op: Option<AioOp>,
}

impl TaskSlot {
    fn new() -> Self {
        Self {
            state: TaskState::Unused,
            regs: arch::SavedRegs::default(),
            stack: None,
            result: None,
            pending_op: None,
        }
    }
}

/// Owns the task pool, the runnable FIFO, and the AIO backend for one
/// runtime instance.
pub struct Scheduler {
    config: RuntimeConfig,
    backend: Box<dyn AioBackend>,
    slots: Vec<Option<Box<TaskSlot>>>,
    free_list: Vec<u32>,
    runnable: VecDeque<u32>,
    waiting_count: usize,
    scheduler_regs: arch::SavedRegs,
    stop: bool,
    completion_buf: Vec<Completion>,
    /// Jobs currently admitted to `backend` (submitted, awaiting a
    /// completion). Bounded by `config.aio_jobs_max` independently of
    /// whatever capacity the backend itself was constructed with — this
    /// is the `size_aio_jobs_max` admission gate described in the
    /// backpressure scenario.
    inflight_jobs: usize,
    /// Slot indices whose op lost the race for an in-flight slot and is
    /// parked in `TaskSlot::pending_op`, FIFO order.
    admission_queue: VecDeque<u32>,
}

impl Scheduler {
    pub fn new(config: RuntimeConfig, backend: Box<dyn AioBackend>) -> RtResult<Self> {
        config.validate().map_err(|e| RtError::Unexpected(std::io::Error::other(e.to_string())))?;
        Ok(Self {
            completion_buf: Vec::with_capacity(config.aio_reap_max),
            slots: Vec::new(),
            free_list: Vec::new(),
            runnable: VecDeque::new(),
            waiting_count: 0,
            scheduler_regs: arch::SavedRegs::default(),
            stop: false,
            inflight_jobs: 0,
            admission_queue: VecDeque::new(),
            config,
            backend,
        })
    }

    /// Allocate a frame with `stack_size` bytes of stack, mark it
    /// runnable, and append it to the FIFO. No handle is handed back to
    /// user code in the facade; this one is used internally (tests,
    /// `Runtime::spawn`) where observing the id is useful.
    pub fn spawn<F>(&mut self, f: F, stack_size: usize) -> RtResult<TaskId>
    where
        F: FnOnce() + Send + 'static,
    {
        let idx = self.alloc_slot()?;
        let stack = FrameStack::new(stack_size)?;
        let top = stack.top();

        let boxed: Box<dyn FnOnce() + Send> = Box::new(f);
        let closure_ptr = Box::into_raw(Box::new(boxed)) as usize;

        let slot = self.slots[idx as usize].as_mut().expect("slot just allocated");
        slot.stack = Some(stack);
        unsafe {
            arch::init_context(&mut slot.regs, top, crate::frame::run_entry as usize, closure_ptr);
        }
        slot.state = TaskState::Runnable;
        slot.result = None;
        slot.pending_op = None;

        self.runnable.push_back(idx);
        Ok(TaskId::new(idx))
    }

    /// Dispatch one runnable frame, running it until it yields, suspends
    /// on I/O, or completes.
    pub fn run_once(&mut self) -> bool {
        match self.runnable.pop_front() {
            Some(idx) => {
                self.run_task(idx);
                true
            }
            None => false,
        }
    }

    /// One full scheduler pass: drain the runnable FIFO, submit queued
    /// jobs, reap completions, and dispatch them back to their waiters.
    pub fn tick(&mut self) -> RtResult<()> {
        while self.run_once() {}

        self.backend.submit()?;

        self.completion_buf.clear();
        let max = self.config.aio_reap_max;
        self.backend.reap(&mut self.completion_buf, max)?;

        let completions = std::mem::take(&mut self.completion_buf);
        for completion in &completions {
            self.dispatch(completion);
        }
        self.completion_buf = completions;

        self.admit_pending();

        Ok(())
    }

    /// Spawn `entry` as the first frame and run the scheduler loop until
    /// the stop flag is set and no runnable or waiting slots remain.
    pub fn run<F>(&mut self, entry: F) -> RtResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn(entry, self.config.stack_size)?;

        let self_ptr: *mut Scheduler = self;
        let previous = set_current_scheduler(self_ptr);

        let result = loop {
            if let Err(e) = self.tick() {
                break Err(e);
            }
            if self.stop && !self.has_work() {
                break Ok(());
            }
        };

        set_current_scheduler(previous);
        self.backend.shutdown();
        result
    }

    /// Request a clean shutdown: the main loop exits once currently live
    /// frames finish (or suspend forever, which is a caller bug, not
    /// something this method can detect).
    pub fn stop(&mut self) {
        self.stop = true;
    }

    pub fn has_work(&self) -> bool {
        !self.runnable.is_empty() || self.waiting_count > 0
    }

    pub fn task_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count() - self.free_list.len()
    }

    pub(crate) fn slot_mut(&mut self, id: TaskId) -> Option<&mut TaskSlot> {
        if id.is_none() {
            return None;
        }
        self.slots.get_mut(id.as_usize()).and_then(|s| s.as_mut()).map(|b| b.as_mut())
    }

    pub(crate) fn scheduler_regs_ptr(&mut self) -> *mut arch::SavedRegs {
        &mut self.scheduler_regs
    }

    fn alloc_slot(&mut self) -> RtResult<u32> {
        if let Some(idx) = self.free_list.pop() {
            return Ok(idx);
        }
        if self.slots.len() >= self.config.max_tasks {
            return Err(RtError::QueueFull);
        }
        let idx = self.slots.len() as u32;
        self.slots.push(Some(Box::new(TaskSlot::new())));
        Ok(idx)
    }

    fn run_task(&mut self, idx: u32) {
        let slot_ptr: *mut TaskSlot = match self.slots[idx as usize].as_mut() {
            Some(b) => b.as_mut() as *mut TaskSlot,
            None => return,
        };

        tls::set_current(TaskId::new(idx), slot_ptr as *mut u8);
        unsafe {
            let sched_regs: *mut arch::SavedRegs = &mut self.scheduler_regs;
            let frame_regs: *mut arch::SavedRegs = &mut (*slot_ptr).regs;
            arch::context_switch(sched_regs, frame_regs);
        }
        tls::clear_current();

        let state = unsafe { (*slot_ptr).state };
        match state {
            TaskState::Runnable => self.runnable.push_back(idx),
            TaskState::Waiting => {}
            TaskState::Dead => self.reclaim(idx),
            TaskState::Unused => {}
        }
    }

    fn reclaim(&mut self, idx: u32) {
        if let Some(slot) = self.slots[idx as usize].as_mut() {
            slot.stack = None;
            slot.result = None;
            slot.pending_op = None;
            slot.state = TaskState::Unused;
        }
        self.free_list.push(idx);
    }

    fn dispatch(&mut self, completion: &Completion) {
        if let Some(slot) = self.slot_mut(completion.waiter) {
            if slot.state == TaskState::Waiting {
                slot.result = Some(completion.result);
                slot.state = TaskState::Runnable;
                self.waiting_count -= 1;
                self.inflight_jobs = self.inflight_jobs.saturating_sub(1);
                self.runnable.push_back(completion.waiter.as_u32());
            }
            // A completion for a slot not in `Waiting` is stale (the frame
            // was cancelled or already reclaimed) and is silently dropped.
        }
    }

    /// Admit `op` for `waiter` if the `size_aio_jobs_max` cap leaves room;
    /// otherwise park it on the slot for [`Scheduler::admit_pending`] to
    /// pick up once an in-flight job frees. Either way the frame is left
    /// to suspend exactly the same way — this only decides whether the op
    /// reaches the backend now or later, never whether the caller sees an
    /// error for ordinary over-subscription.
    fn admit(&mut self, waiter: TaskId, op: AioOp) -> RtResult<()> {
        if self.inflight_jobs < self.config.aio_jobs_max {
            self.backend.queue(waiter, op)?;
            self.inflight_jobs += 1;
        } else {
            if let Some(slot) = self.slot_mut(waiter) {
                slot.pending_op = Some(op);
            }
            self.admission_queue.push_back(waiter.as_u32());
        }
        Ok(())
    }

    /// Submit as many parked ops as the in-flight cap now allows. Called
    /// once per tick, after completions free up backend slots; a frame
    /// admitted here was already `Waiting` and stays so — only its op
    /// moves from "parked" to "submitted to the backend".
    fn admit_pending(&mut self) {
        while self.inflight_jobs < self.config.aio_jobs_max {
            let Some(idx) = self.admission_queue.pop_front() else { break };
            let id = TaskId::new(idx);
            let Some(op) = self.slot_mut(id).and_then(|slot| slot.pending_op.take()) else { continue };
            // Backends here are always constructed with capacity >=
            // `aio_jobs_max`, and this path never admits past that cap, so
            // a `QueueFull` here would mean the two have drifted apart.
            self.backend.queue(id, op).expect("backend capacity must cover aio_jobs_max admissions");
            self.inflight_jobs += 1;
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.backend.shutdown();
    }
}

fn classify(result: CompletionResult) -> RtResult<CompletionResult> {
    match result {
        CompletionResult::Timeout => Err(RtError::Timeout),
        CompletionResult::Error { errno } => {
            Err(RtError::from_errno(errno).unwrap_or_else(|| RtError::Unexpected(std::io::Error::from_raw_os_error(errno))))
        }
        other => Ok(other),
    }
}

/// Submit `op` on behalf of the currently running frame and suspend until
/// its completion arrives. Must be called from within a frame (i.e. from
/// code running as the argument to [`Scheduler::spawn`]); panics
/// otherwise, since there is no frame to suspend.
pub fn io_await(op: AioOp) -> RtResult<CompletionResult> {
    let sched_ptr = current_scheduler_ptr();
    assert!(!sched_ptr.is_null(), "io_await called with no scheduler driving this thread");
    let sched = unsafe { &mut *sched_ptr };

    let id = tls::current();
    assert!(id.is_some(), "io_await called outside a running frame");

    sched.admit(id, op)?;

    {
        let slot = sched.slot_mut(id).expect("current task has no slot");
        slot.state = TaskState::Waiting;
        slot.result = None;
    }
    sched.waiting_count += 1;

    unsafe {
        let frame_regs: *mut arch::SavedRegs = &mut sched.slot_mut(id).expect("current task has no slot").regs;
        let sched_regs: *mut arch::SavedRegs = sched.scheduler_regs_ptr();
        arch::context_switch(frame_regs, sched_regs);
    }

    let result = sched
        .slot_mut(id)
        .expect("current task has no slot")
        .result
        .take()
        .expect("frame resumed without a completion result");
    classify(result)
}

/// Spawn a new frame on whichever scheduler is driving the current thread.
/// Callable both from within a running frame (the common case: a connection
/// handler spawning a helper) and from the thread that called
/// [`Scheduler::run`] before entry, mirroring how `io_await`/`yield_now`
/// resolve "the current scheduler" the same way regardless of caller.
pub fn spawn<F>(f: F, stack_size: usize) -> RtResult<TaskId>
where
    F: FnOnce() + Send + 'static,
{
    let sched_ptr = current_scheduler_ptr();
    assert!(!sched_ptr.is_null(), "spawn called with no scheduler driving this thread");
    let sched = unsafe { &mut *sched_ptr };
    sched.spawn(f, stack_size)
}

/// Request the scheduler driving the current thread to stop once its
/// runnable and waiting frames drain. A no-op if no scheduler is current.
pub fn stop_current() {
    let sched_ptr = current_scheduler_ptr();
    if sched_ptr.is_null() {
        return;
    }
    let sched = unsafe { &mut *sched_ptr };
    sched.stop();
}

/// Capabilities of the backend driving the scheduler on the current thread.
/// Used by the I/O surface to decide between a native submit and a direct
/// non-blocking syscall + yield loop. Panics outside a running scheduler,
/// like [`io_await`].
pub fn current_capabilities() -> fiberio_core::backend::Capabilities {
    let sched_ptr = current_scheduler_ptr();
    assert!(!sched_ptr.is_null(), "current_capabilities called with no scheduler driving this thread");
    let sched = unsafe { &*sched_ptr };
    sched.backend.capabilities()
}

/// Voluntarily yield the current frame back to the scheduler without
/// waiting on any completion. The frame is re-enqueued at the back of the
/// runnable FIFO and resumes on a later tick.
pub fn yield_now() {
    let sched_ptr = current_scheduler_ptr();
    if sched_ptr.is_null() {
        std::thread::yield_now();
        return;
    }
    let sched = unsafe { &mut *sched_ptr };

    let id = tls::current();
    if id.is_none() {
        std::thread::yield_now();
        return;
    }

    unsafe {
        let frame_regs: *mut arch::SavedRegs = &mut sched.slot_mut(id).expect("current task has no slot").regs;
        let sched_regs: *mut arch::SavedRegs = sched.scheduler_regs_ptr();
        arch::context_switch(frame_regs, sched_regs);
    }
}

/// Whether a frame is currently running on this thread.
pub fn is_in_frame() -> bool {
    tls::is_in_frame()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiberio_core::backend::Capabilities;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NullBackend;
    impl AioBackend for NullBackend {
        fn queue(&mut self, _waiter: TaskId, _op: AioOp) -> RtResult<()> {
            Ok(())
        }
        fn submit(&mut self) -> RtResult<()> {
            Ok(())
        }
        fn reap(&mut self, _out: &mut Vec<Completion>, _max: usize) -> RtResult<usize> {
            Ok(0)
        }
        fn cancel(&mut self, _waiter: TaskId) {}
        fn inflight(&self) -> usize {
            0
        }
        fn capacity(&self) -> usize {
            0
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::NONE
        }
        fn shutdown(&mut self) {}
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(RuntimeConfig::new(), Box::new(NullBackend)).unwrap()
    }

    #[test]
    fn spawn_then_run_executes_entry() {
        let mut sched = scheduler();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        sched.run(move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        }).unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn multiple_frames_all_run_to_completion() {
        let mut sched = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&counter);
        let c2 = Arc::clone(&counter);
        let c3 = Arc::clone(&counter);

        sched.run(move || {
            yield_now();
            c1.fetch_add(1, Ordering::SeqCst);
            spawn_sibling(c2);
            spawn_sibling(c3);
        }).unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn frame_yield_interleaves_with_other_runnables() {
        let mut sched = scheduler();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let o1 = Arc::clone(&order);
        sched.spawn(
            move || {
                o1.lock().unwrap().push('a');
                yield_now();
                o1.lock().unwrap().push('c');
            },
            4096,
        ).unwrap();

        let o2 = Arc::clone(&order);
        sched.spawn(
            move || {
                o2.lock().unwrap().push('b');
            },
            4096,
        ).unwrap();

        // `yield_now` only performs a real context switch while a
        // scheduler is registered as "current" on this thread, which
        // `Scheduler::run` normally does; drive the FIFO manually here so
        // we can observe the interleaving without a full `run` loop.
        let sched_ptr: *mut Scheduler = &mut sched;
        let previous = set_current_scheduler(sched_ptr);
        while sched.run_once() {}
        set_current_scheduler(previous);

        let seen: String = order.lock().unwrap().iter().collect();
        assert_eq!(seen, "abc");
    }

    // Spawns a frame on the currently running scheduler from inside
    // another frame; used only by `multiple_frames_all_run_to_completion`.
    fn spawn_sibling(counter: Arc<AtomicUsize>) {
        let sched_ptr = current_scheduler_ptr();
        let sched = unsafe { &mut *sched_ptr };
        sched.spawn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }, 4096).unwrap();
    }
}
