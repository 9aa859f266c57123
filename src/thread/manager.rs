//! The kernel: thread table, ready queue, clock and the CPU itself.
//!
//! Each kernel thread is backed by a host thread, but only the one named by
//! [`Core::running`] executes. The others sleep on the CPU condition variable
//! until a switch hands the CPU to them. All kernel state sits behind one
//! mutex, whose guard is the "interrupts disabled" section.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

use crate::config::Config;
use crate::debug::DebugFlags;
use crate::error::{Error, Result};
use crate::sbi::timer::Timer;
use crate::thread::alarm::Alarm;
use crate::thread::imp::Entry;
use crate::thread::scheduler::{QueueId, Schedule};
use crate::thread::{Status, Thread, Tid};

thread_local! {
    static CURRENT: RefCell<Option<(&'static Manager, Arc<Thread>)>> = RefCell::new(None);
}

/// Unwinds a parked thread once the kernel has halted.
pub(crate) struct Halted;

/// Unwinds a thread that called [`crate::thread::exit`].
pub(crate) struct Exit;

pub(crate) struct Tcb {
    thread: Arc<Thread>,
    pub(crate) status: Status,
    /// Threads joining this one. Transferring, held by the thread itself.
    pub(crate) joiners: QueueId,
}

/// What is left of a finished thread while handles to it are alive.
struct Exited {
    thread: Weak<Thread>,
    /// Base priority at exit. A finished thread holds nothing, so this is also
    /// its effective priority.
    priority: u64,
    panic: Option<String>,
}

pub(crate) struct Core {
    pub(crate) sched: Box<dyn Schedule>,
    pub(crate) ready: QueueId,
    pub(crate) running: Option<Tid>,
    threads: BTreeMap<Tid, Tcb>,
    exited: BTreeMap<Tid, Exited>,
    pub(crate) alarm: Alarm,
    pub(crate) timer: Timer,
    pub(crate) halted: bool,
    outcome: Option<Result<()>>,
    main: Option<Tid>,
    pub(crate) debug: DebugFlags,
    next_tid: u64,
}

impl Core {
    fn new(config: &Config) -> Self {
        let mut sched = config.scheduler.build(config.seed, config.debug);
        let ready = sched.new_queue(false);
        Self {
            sched,
            ready,
            running: None,
            threads: BTreeMap::new(),
            exited: BTreeMap::new(),
            alarm: Alarm::new(),
            timer: Timer::new(config.timer_interval),
            halted: false,
            outcome: None,
            main: None,
            debug: config.debug,
            next_tid: 0,
        }
    }

    /// Register a new thread. It is not runnable until [`Core::make_ready`].
    pub(crate) fn create(&mut self, name: String, priority: Option<u64>) -> Arc<Thread> {
        let tid = Tid::from(self.next_tid);
        if let Some(priority) = priority {
            self.sched.set_priority(tid, priority);
        }
        self.next_tid += 1;

        let joiners = self.sched.new_queue(true);
        self.sched.set_holder(joiners, tid);

        let thread = Arc::new(Thread::new(tid, name));
        self.threads.insert(
            tid,
            Tcb {
                thread: thread.clone(),
                status: Status::Ready,
                joiners,
            },
        );
        thread
    }

    /// Undo [`Core::create`] for a thread that never started.
    pub(crate) fn discard(&mut self, tid: Tid) {
        if let Some(tcb) = self.threads.remove(&tid) {
            self.sched.drop_queue(tcb.joiners);
        }
        self.sched.forget(tid);
    }

    pub(crate) fn make_ready(&mut self, tid: Tid) {
        let ready = self.ready;
        self.sched.enqueue(ready, tid);
        self.tcb_mut(tid).status = Status::Ready;
    }

    pub(crate) fn wake_up(&mut self, tid: Tid) {
        let status = self.tcb(tid).status;
        assert_eq!(status, Status::Blocked, "waking {:?}, which is not blocked", tid);
        kdebug!(self.debug, DebugFlags::THREAD, "wake up {:?}", tid);
        self.make_ready(tid);
    }

    pub(crate) fn tcb(&self, tid: Tid) -> &Tcb {
        match self.threads.get(&tid) {
            Some(tcb) => tcb,
            None => panic!("unknown thread {:?}", tid),
        }
    }

    pub(crate) fn tcb_mut(&mut self, tid: Tid) -> &mut Tcb {
        match self.threads.get_mut(&tid) {
            Some(tcb) => tcb,
            None => panic!("unknown thread {:?}", tid),
        }
    }

    pub(crate) fn thread(&self, tid: Tid) -> Arc<Thread> {
        self.tcb(tid).thread.clone()
    }

    pub(crate) fn status(&self, tid: Tid) -> Status {
        if self.exited.contains_key(&tid) {
            Status::Dying
        } else {
            self.tcb(tid).status
        }
    }

    /// Panic message of a finished thread, if it was aborted.
    pub(crate) fn panic_of(&self, tid: Tid) -> Option<&str> {
        self.exited.get(&tid).and_then(|exited| exited.panic.as_deref())
    }

    pub(crate) fn priority(&self, tid: Tid) -> u64 {
        match self.exited.get(&tid) {
            Some(exited) => exited.priority,
            None => self.sched.priority(tid),
        }
    }

    pub(crate) fn effective_priority(&self, tid: Tid) -> u64 {
        match self.exited.get(&tid) {
            Some(exited) => exited.priority,
            None => self.sched.effective_priority(tid),
        }
    }

    pub(crate) fn set_priority(&mut self, tid: Tid, priority: u64) {
        let Some(exited) = self.exited.get_mut(&tid) else {
            self.sched.set_priority(tid, priority);
            return;
        };
        let range = self.sched.range();
        assert!(
            range.contains(&priority),
            "priority {} out of range {}..={}",
            priority,
            range.start(),
            range.end()
        );
        exited.priority = priority;
    }

    /// Advance the clock by one tick, running the timer interrupt when due.
    pub(crate) fn tick(&mut self) {
        if self.timer.tick() {
            self.timer_interrupt();
        }
    }

    fn timer_interrupt(&mut self) {
        let now = self.timer.now();
        for tid in self.alarm.expire(now) {
            kdebug!(self.debug, DebugFlags::ALARM, "{:?} wakes at {}", tid, now);
            self.wake_up(tid);
        }
    }

    /// Nothing is ready: let time pass until the alarm has someone to wake.
    fn idle_until(&mut self, deadline: u64) {
        self.timer.skip_to(deadline);
        kdebug!(self.debug, DebugFlags::ALARM, "idle until {}", self.timer.now());
        self.timer_interrupt();
    }

    fn blocked(&self) -> usize {
        self.threads
            .values()
            .filter(|tcb| tcb.status == Status::Blocked)
            .count()
    }

    fn halt(&mut self, outcome: Result<()>) {
        if self.halted {
            return;
        }
        kdebug!(self.debug, DebugFlags::THREAD, "halt: {:?}", outcome);
        self.halted = true;
        self.outcome = Some(outcome);
        self.running = None;
    }

    /// Tear down a finished thread: wake its joiners, hand every lock it
    /// still holds to the next waiter, and keep only an exit record.
    fn retire(&mut self, tid: Tid, panic: Option<String>) {
        let joiners = self.tcb(tid).joiners;

        while let Some(joiner) = self.sched.next(joiners) {
            self.wake_up(joiner);
        }
        self.sched.drop_queue(joiners);

        for queue in self.sched.held(tid) {
            let next = self.sched.next(queue);
            log::warn!(
                "{:?} exited holding lock {:?}, handed to {:?}",
                self.thread(tid),
                queue,
                next
            );
            if let Some(next) = next {
                self.wake_up(next);
            }
        }

        let priority = self.sched.priority(tid);
        self.sched.forget(tid);
        if let Some(tcb) = self.threads.remove(&tid) {
            let exited = Exited {
                thread: Arc::downgrade(&tcb.thread),
                priority,
                panic,
            };
            self.exited.insert(tid, exited);
        }
        // Nobody can ask about a thread without a handle to it.
        self.exited.retain(|_, exited| exited.thread.strong_count() > 0);
    }
}

pub struct Manager {
    core: Mutex<Core>,
    cpu: Condvar,
    config: Config,
}

impl Manager {
    fn new(config: Config) -> Self {
        Self {
            core: Mutex::new(Core::new(&config)),
            cpu: Condvar::new(),
            config,
        }
    }

    /// The kernel the calling thread belongs to.
    ///
    /// # Panics
    ///
    /// Panics outside a kernel thread.
    pub fn get() -> &'static Self {
        match Self::try_get() {
            Some(manager) => manager,
            None => panic!("not running inside a kernel thread"),
        }
    }

    pub fn try_get() -> Option<&'static Self> {
        CURRENT.with(|current| current.borrow().as_ref().map(|(manager, _)| *manager))
    }

    pub(crate) fn current() -> Option<Arc<Thread>> {
        CURRENT.with(|current| current.borrow().as_ref().map(|(_, thread)| thread.clone()))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A thread that panics while holding the lock leaves it poisoned; the
    /// kernel keeps going.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the host thread backing `thread`. It waits for the CPU before
    /// running `entry`.
    pub(crate) fn start(&'static self, thread: Arc<Thread>, entry: Entry) -> io::Result<()> {
        std::thread::Builder::new()
            .name(thread.name().to_string())
            .spawn(move || self.run(thread, entry))
            .map(drop)
    }

    fn run(&'static self, thread: Arc<Thread>, entry: Entry) {
        let tid = thread.id();
        CURRENT.with(|current| *current.borrow_mut() = Some((self, thread)));

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            drop(self.wait_turn(self.lock(), tid));
            entry()
        }));

        let panic = match result {
            Ok(()) => None,
            Err(payload) if payload.is::<Halted>() => return,
            Err(payload) if payload.is::<Exit>() => None,
            Err(payload) => Some(panic_message(payload.as_ref())),
        };

        CURRENT.with(|current| current.borrow_mut().take());
        let mut core = self.lock();
        if core.halted {
            return;
        }
        let thread = core.thread(tid);
        kdebug!(core.debug, DebugFlags::THREAD, "exit {:?}", thread);
        core.retire(tid, panic.clone());

        if core.main == Some(tid) {
            let outcome = match panic {
                None => Ok(()),
                Some(message) => Err(Error::Panicked {
                    name: thread.name().to_string(),
                    message,
                }),
            };
            core.halt(outcome);
            self.cpu.notify_all();
        } else {
            core.running = None;
            self.dispatch(&mut core);
        }
    }

    /// Give the CPU to the next ready thread and park `current` until it gets
    /// the CPU back.
    pub(crate) fn switch(
        &self,
        mut core: MutexGuard<'static, Core>,
        current: Tid,
    ) -> MutexGuard<'static, Core> {
        self.dispatch(&mut core);
        self.wait_turn(core, current)
    }

    fn dispatch(&self, core: &mut Core) {
        loop {
            let ready = core.ready;
            if let Some(next) = core.sched.next(ready) {
                kdebug!(
                    core.debug,
                    DebugFlags::THREAD,
                    "switch to {:?} at {}",
                    next,
                    core.timer.now()
                );
                core.tcb_mut(next).status = Status::Running;
                core.running = Some(next);
                break;
            }
            match core.alarm.next_deadline() {
                Some(deadline) => core.idle_until(deadline),
                None => {
                    let blocked = core.blocked();
                    log::warn!("deadlock: {} thread(s) blocked, none ready", blocked);
                    core.halt(Err(Error::Deadlock { blocked }));
                    break;
                }
            }
        }
        self.cpu.notify_all();
    }

    fn wait_turn<'a>(
        &self,
        mut core: MutexGuard<'a, Core>,
        current: Tid,
    ) -> MutexGuard<'a, Core> {
        loop {
            if core.halted {
                drop(core);
                panic::resume_unwind(Box::new(Halted));
            }
            if core.running == Some(current) {
                return core;
            }
            core = self.cpu.wait(core).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("Box<dyn Any>")
    }
}

/// Boot a kernel and run `main` as its first thread.
///
/// Returns once `main` finishes; threads still alive at that point are
/// discarded. Fails with [`Error::Deadlock`] if every thread blocks with no
/// alarm pending, and with [`Error::Panicked`] if `main` panics.
pub fn boot<F>(config: Config, main: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    let manager: &'static Manager = Box::leak(Box::new(Manager::new(config)));
    log::info!(
        "boot: {} scheduler, seed {}, timer interval {}",
        manager.config.scheduler,
        manager.config.seed,
        manager.config.timer_interval
    );

    let thread = {
        let mut core = manager.lock();
        let thread = core.create(String::from("main"), None);
        core.main = Some(thread.id());
        thread
    };
    let tid = thread.id();
    manager
        .start(thread, Box::new(main))
        .map_err(|source| Error::Spawn {
            name: String::from("main"),
            source,
        })?;

    let mut core = manager.lock();
    core.tcb_mut(tid).status = Status::Running;
    core.running = Some(tid);
    manager.cpu.notify_all();

    loop {
        if let Some(outcome) = core.outcome.take() {
            return outcome;
        }
        core = manager.cpu.wait(core).unwrap_or_else(PoisonError::into_inner);
    }
}
