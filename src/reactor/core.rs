//! The reactor thread: readiness loop plus delayed-task sweeping.

use super::context;
use super::poller::{Event, Interest, Poller};
use crate::clock::now_millis;
use crate::error::{Error, Result};
use crate::load::LoadEstimator;
use crate::pipe::{Drain, Pipe};
use crate::task::{DelayTask, Priority, Task};

use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::mem;
use std::os::fd::RawFd;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

/// A descriptor-readiness callback.
///
/// Invoked on the owning reactor thread with the readiness report for its
/// descriptor. A panic escaping the callback is caught at the loop boundary
/// and logged; it never takes the reactor down.
pub type EventCallback = Box<dyn FnMut(Event) + Send>;

type DelCallback = Box<dyn FnOnce(bool) + Send>;

/// State shared between the reactor handle and its loop thread.
struct Shared {
    name: String,
    running: AtomicBool,

    /// Callbacks submitted via [`Reactor::submit`], drained on wake.
    /// High-priority entries sit at the front.
    tasks: Mutex<VecDeque<Task>>,

    pipe: Pipe,
    load: LoadEstimator,

    /// Identity of the loop thread, set once at startup.
    tid: OnceLock<ThreadId>,
}

/// Tables owned exclusively by the loop thread.
///
/// Reached only through [`context::with_current`], so every mutation happens
/// on the owning thread.
pub(super) struct LoopState {
    poller: Poller,

    /// Registered descriptor callbacks, keyed by descriptor identity.
    handlers: HashMap<RawFd, Rc<RefCell<EventCallback>>>,

    /// Deadline-ordered delayed tasks; ties at one millisecond share a slot.
    delayed: BTreeMap<u64, Vec<Arc<DelayTask>>>,
}

impl LoopState {
    fn add(&mut self, fd: RawFd, interest: Interest, callback: EventCallback) -> Result<()> {
        match self.poller.add(fd, interest) {
            Ok(()) => {
                self.handlers.insert(fd, Rc::new(RefCell::new(callback)));
                Ok(())
            }
            Err(e) => {
                log::warn!("add event failed: {e}");
                Err(e)
            }
        }
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> Result<()> {
        match self.poller.modify(fd, interest) {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!("modify event failed: {e}");
                Err(e)
            }
        }
    }

    fn del(&mut self, fd: RawFd, done: DelCallback) {
        match self.poller.remove(fd) {
            Ok(()) => {
                self.handlers.remove(&fd);
                done(true);
            }
            Err(e) => {
                log::warn!("del event failed: {e}");
                done(false);
            }
        }
    }

    fn insert_delayed(&mut self, deadline: u64, task: Arc<DelayTask>) {
        self.delayed.entry(deadline).or_default().push(task);
    }

    /// Milliseconds until the earliest deadline, `None` when the table is
    /// empty (wait indefinitely).
    fn next_timeout(&self, now: u64) -> Option<u64> {
        self.delayed
            .keys()
            .next()
            .map(|deadline| deadline.saturating_sub(now))
    }
}

/// A thread running a readiness-multiplexed event loop plus a
/// deadline-ordered task scheduler.
///
/// All methods are safe to call from any thread. Operations on the
/// registration and delayed-task tables are applied immediately when called
/// from the reactor's own thread and otherwise marshaled onto it as
/// high-priority callbacks.
pub struct Reactor {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Reactor {
    /// Spawns the reactor thread and waits for its loop to come up.
    ///
    /// `pin_cpu` optionally pins the thread to one CPU (best-effort).
    ///
    /// # Errors
    ///
    /// Fails if the wake pipe or the epoll instance cannot be created, or if
    /// the OS refuses to spawn the thread. A reactor that failed to start
    /// owns no resources.
    pub fn start(name: &str, pin_cpu: Option<usize>) -> Result<Arc<Reactor>> {
        let shared = Arc::new(Shared {
            name: name.to_string(),
            running: AtomicBool::new(true),
            tasks: Mutex::new(VecDeque::new()),
            pipe: Pipe::new()?,
            load: LoadEstimator::new(),
            tid: OnceLock::new(),
        });

        let (ready_tx, ready_rx) = mpsc::channel();

        let loop_shared = shared.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(loop_shared, pin_cpu, ready_tx))
            .map_err(|e| Error::ThreadSpawn {
                name: name.to_string(),
                source: e,
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Arc::new(Reactor {
                shared,
                thread: Mutex::new(Some(handle)),
            })),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(Error::NotRunning)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Busy estimate of the loop thread, `0..=100`.
    pub fn load(&self) -> u32 {
        self.shared.load.load()
    }

    pub fn is_current_thread(&self) -> bool {
        self.shared
            .tid
            .get()
            .is_some_and(|tid| *tid == thread::current().id())
    }

    /// Submits a callback with normal priority, running it inline when
    /// already on the reactor thread.
    pub fn submit<F>(&self, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_with(Priority::Normal, true, func);
    }

    /// Submits a callback for execution on the reactor thread.
    ///
    /// With `may_sync` set and the caller already on the reactor thread the
    /// callback runs synchronously, which avoids a queue round-trip when a
    /// task re-schedules itself. Otherwise it is queued (front of the queue
    /// for [`Priority::High`]) and the loop is woken.
    ///
    /// Normal-priority submissions from one producer thread execute in
    /// submission order relative to each other.
    pub fn submit_with<F>(&self, priority: Priority, may_sync: bool, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if may_sync && self.is_current_thread() {
            func();
            return;
        }

        {
            let mut tasks = self.shared.tasks.lock();
            match priority {
                Priority::High => tasks.push_front(Box::new(func)),
                Priority::Normal => tasks.push_back(Box::new(func)),
            }
        }
        self.shared.pipe.notify();
    }

    /// Registers a readiness callback for `fd`.
    ///
    /// Applied immediately on the reactor thread; marshaled otherwise, in
    /// which case registration failures are logged rather than returned.
    pub fn add_event<F>(&self, fd: RawFd, interest: Interest, callback: F) -> Result<()>
    where
        F: FnMut(Event) + Send + 'static,
    {
        self.add_event_boxed(fd, interest, Box::new(callback))
    }

    fn add_event_boxed(&self, fd: RawFd, interest: Interest, callback: EventCallback) -> Result<()> {
        if fd < 0 {
            log::warn!("{}: add event with invalid fd {fd}", self.shared.name);
            return Err(Error::InvalidFd(fd));
        }

        if self.is_current_thread() {
            match context::with_current(|state| state.add(fd, interest, callback)) {
                Some(result) => result,
                None => Err(Error::NotRunning),
            }
        } else {
            self.submit_with(Priority::High, false, move || {
                let _ = context::with_current(|state| state.add(fd, interest, callback));
            });
            Ok(())
        }
    }

    /// Replaces the interest set of an existing registration.
    ///
    /// Registrations are exclusive (`EPOLLEXCLUSIVE`), and the kernel does
    /// not allow re-arming such a descriptor with `EPOLL_CTL_MOD`: on a live
    /// registration this fails with `EINVAL`. Remove and re-add the
    /// descriptor to change its interest set.
    pub fn modify_event(&self, fd: RawFd, interest: Interest) -> Result<()> {
        if fd < 0 {
            log::warn!("{}: modify event with invalid fd {fd}", self.shared.name);
            return Err(Error::InvalidFd(fd));
        }

        if self.is_current_thread() {
            match context::with_current(|state| state.modify(fd, interest)) {
                Some(result) => result,
                None => Err(Error::NotRunning),
            }
        } else {
            self.submit_with(Priority::High, false, move || {
                let _ = context::with_current(|state| state.modify(fd, interest));
            });
            Ok(())
        }
    }

    /// Removes the registration for `fd`.
    ///
    /// The removal may be applied asynchronously on the reactor thread, so
    /// success or failure is reported through `done` instead of the return
    /// value; the synchronous `Err` only covers an invalid descriptor.
    pub fn del_event<F>(&self, fd: RawFd, done: F) -> Result<()>
    where
        F: FnOnce(bool) + Send + 'static,
    {
        if fd < 0 {
            log::warn!("{}: del event with invalid fd {fd}", self.shared.name);
            return Err(Error::InvalidFd(fd));
        }

        let done: DelCallback = Box::new(done);
        if self.is_current_thread() {
            if context::with_current(|state| state.del(fd, done)).is_none() {
                return Err(Error::NotRunning);
            }
            Ok(())
        } else {
            self.submit_with(Priority::High, false, move || {
                if context::with_current(|state| state.del(fd, done)).is_none() {
                    log::warn!("del event dropped: reactor loop not running");
                }
            });
            Ok(())
        }
    }

    /// Schedules `func` to run on the reactor thread after `delay_ms`
    /// milliseconds.
    ///
    /// The callback's return value is the next delay: non-zero re-arms the
    /// task that many milliseconds after the current run, zero retires it.
    /// Two tasks scheduled for the same millisecond both fire.
    ///
    /// Returns `None` for a zero delay. The returned handle cancels the task
    /// from any thread; cancellation never interrupts a run already in
    /// progress on the reactor thread.
    pub fn delay_task<F>(&self, delay_ms: u64, func: F) -> Option<Arc<DelayTask>>
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        if delay_ms == 0 {
            return None;
        }

        let task = Arc::new(DelayTask::new(func));
        let deadline = now_millis() + delay_ms;

        let stored = task.clone();
        let shared = self.shared.clone();
        self.submit_with(Priority::High, true, move || {
            if context::with_current(|state| state.insert_delayed(deadline, stored)).is_none() {
                log::warn!("delay task dropped: reactor loop not running");
                return;
            }
            // Nudge the loop so a long blocking wait re-evaluates its timeout.
            shared.pipe.notify();
        });

        Some(task)
    }
}

impl Drop for Reactor {
    /// Signals the loop to stop, wakes it, and joins the thread. Remaining
    /// delayed tasks are force-cancelled by the loop on its way out.
    ///
    /// A callback holding the last handle to its own reactor drops it on the
    /// loop thread itself; joining there would deadlock, so the thread is
    /// detached and left to run its teardown on its own.
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.pipe.notify();

        if self.is_current_thread() {
            let _ = self.thread.lock().take();
            return;
        }

        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

/// Loop body for one reactor thread.
fn run(shared: Arc<Shared>, pin_cpu: Option<usize>, ready: mpsc::Sender<Result<()>>) {
    let _ = shared.tid.set(thread::current().id());

    if let Some(cpu) = pin_cpu {
        crate::affinity::pin_current_to(cpu);
    }

    let poller = match Poller::new() {
        Ok(poller) => poller,
        Err(e) => {
            log::warn!("{}: {e}", shared.name);
            let _ = ready.send(Err(e));
            return;
        }
    };

    let state = Rc::new(RefCell::new(LoopState {
        poller,
        handlers: HashMap::new(),
        delayed: BTreeMap::new(),
    }));

    context::enter(state.clone());

    if let Err(e) = register_wake(&shared) {
        log::warn!("{}: cannot register wake pipe: {e}", shared.name);
        context::exit();
        let _ = ready.send(Err(e));
        return;
    }

    let _ = ready.send(Ok(()));

    let mut events = Vec::with_capacity(64);
    while shared.running.load(Ordering::Acquire) {
        let timeout = {
            let state = state.borrow();
            state.next_timeout(now_millis())
        };

        shared.load.sleep();
        let waited = state.borrow_mut().poller.wait(&mut events, timeout);
        shared.load.wakeup();

        if let Err(e) = waited {
            log::warn!("{}: epoll wait failed: {e}", shared.name);
            continue;
        }

        for event in events.drain(..) {
            let handler = state.borrow().handlers.get(&event.fd).cloned();
            match handler {
                Some(handler) => {
                    // Borrows of the loop state are released here: the
                    // callback may re-enter add/modify/del on this thread.
                    let mut callback = handler.borrow_mut();
                    if catch_unwind(AssertUnwindSafe(|| (&mut *callback)(event))).is_err() {
                        log::error!(
                            "{}: panic in event handler for fd {}",
                            shared.name,
                            event.fd
                        );
                    }
                }
                None => {
                    // Stale readiness for a removed registration.
                    let _ = state.borrow_mut().poller.remove(event.fd);
                }
            }
        }

        flush_delayed(&state, &shared);
    }

    // Teardown: release the tables and force-cancel what is left, so no
    // observer handle outlives this thread with live state behind it.
    context::exit();
    let mut state = state.borrow_mut();
    state.handlers.clear();
    let delayed = mem::take(&mut state.delayed);
    drop(state);

    for task in delayed.into_values().flatten() {
        task.cancel();
    }
}

/// Registers the wake pipe's readable end as an ordinary event.
fn register_wake(shared: &Arc<Shared>) -> Result<()> {
    let owner = shared.clone();
    let fd = shared.pipe.read_fd();

    match context::with_current(|state| {
        state.add(fd, Interest::readable(), Box::new(move |_| on_wake(&owner)))
    }) {
        Some(result) => result,
        None => Err(Error::NotRunning),
    }
}

/// Wake-pipe readiness: drain the pipe, heal it if broken, then run the
/// pending async callbacks.
fn on_wake(shared: &Arc<Shared>) {
    if let Drain::Broken = shared.pipe.drain() {
        heal_pipe(shared);
    }

    let tasks = mem::take(&mut *shared.tasks.lock());
    for task in tasks {
        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            log::error!("{}: panic in async task", shared.name);
        }
    }
}

/// Recreates the wake pipe and re-registers its readable end. The reactor
/// depends on the pipe never failing permanently.
fn heal_pipe(shared: &Arc<Shared>) {
    log::warn!("{}: wake pipe failed, recreating", shared.name);

    let old = shared.pipe.read_fd();
    let _ = context::with_current(|state| {
        state.handlers.remove(&old);
        let _ = state.poller.remove(old);
    });

    match shared.pipe.reset() {
        Ok(()) => {
            if let Err(e) = register_wake(shared) {
                log::warn!("{}: re-register wake pipe failed: {e}", shared.name);
            }
        }
        Err(e) => {
            log::warn!("{}: recreate wake pipe failed: {e}", shared.name);
        }
    }
}

/// Runs every delayed task whose deadline has passed; recurring tasks are
/// re-inserted at `now + returned_delay`.
fn flush_delayed(state: &Rc<RefCell<LoopState>>, shared: &Arc<Shared>) {
    let now = now_millis();

    let due: Vec<Arc<DelayTask>> = {
        let mut st = state.borrow_mut();
        match st.delayed.keys().next() {
            Some(&deadline) if deadline <= now => {}
            _ => return,
        }

        let later = st.delayed.split_off(&(now + 1));
        let due = mem::replace(&mut st.delayed, later);
        due.into_values().flatten().collect()
    };

    for task in due {
        let next = match catch_unwind(AssertUnwindSafe(|| task.call())) {
            Ok(next) => next,
            Err(_) => {
                log::error!("{}: panic in delayed task", shared.name);
                0
            }
        };

        if next > 0 {
            state.borrow_mut().delayed.entry(now + next).or_default().push(task);
        }
    }
}
