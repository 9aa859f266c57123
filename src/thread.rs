//! Kernel Threads

pub mod alarm;
mod imp;
pub mod manager;
pub mod scheduler;

use std::ops::RangeInclusive;
use std::panic;
use std::sync::Arc;

use crate::debug::DebugFlags;
use crate::error::{Error, Result};
use crate::sbi::interrupt::{self, Intr};

pub use self::alarm::wait_until;
pub use self::imp::*;
pub use self::manager::Manager;
pub use self::scheduler::{SchedulerKind, WaitQueue};

use self::manager::Exit;

/// Create a new thread with the default priority.
pub fn spawn<F>(name: &str, f: F) -> Result<Arc<Thread>>
where
    F: FnOnce() + Send + 'static,
{
    Builder::new(f).name(name).spawn()
}

/// Get the current running thread
///
/// # Panics
///
/// Panics outside a kernel thread.
pub fn current() -> Arc<Thread> {
    match Manager::current() {
        Some(thread) => thread,
        None => panic!("not running inside a kernel thread"),
    }
}

/// Yield the CPU to another ready thread, if the scheduler picks one.
///
/// Yielding is what moves the clock: each call advances it by one tick.
pub fn schedule() {
    let intr = interrupt::disable();
    let current = current();
    let (manager, mut core) = intr.into_parts();

    core.tick();
    core.make_ready(current.id());
    drop(manager.switch(core, current.id()));
}

/// Gracefully shut down the current thread, and schedule another one.
///
/// Locals of the current thread are dropped on the way out, so guards it
/// holds are released.
pub fn exit() -> ! {
    panic::resume_unwind(Box::new(Exit))
}

/// Mark the current thread as [`Blocked`](Status::Blocked) and give the CPU
/// away. Returns once someone calls [`wake_up`] on it and it is scheduled
/// again.
///
/// The caller is expected to have recorded the thread somewhere it will be
/// woken from (a wait queue, the alarm) inside the same `intr` section.
pub fn block(intr: Intr) -> Intr {
    let current = current();
    let (manager, mut core) = intr.into_parts();
    assert_eq!(core.running, Some(current.id()), "{:?} is not running", current);

    core.tcb_mut(current.id()).status = Status::Blocked;
    kdebug!(core.debug, DebugFlags::THREAD, "block {:?}", current);

    let core = manager.switch(core, current.id());
    Intr::from_parts(manager, core)
}

/// Wake up a previously blocked thread, mark it as [`Ready`](Status::Ready),
/// and put it on the ready queue. It runs when the scheduler next picks it.
///
/// # Panics
///
/// Panics if `thread` is not blocked.
pub fn wake_up(intr: &mut Intr, thread: &Thread) {
    intr.core().wake_up(thread.id());
}

/// Wait for `thread` to finish.
///
/// While waiting the current thread donates its priority (or tickets) to
/// `thread`. Returns [`Error::Panicked`] if `thread` was aborted by a panic.
///
/// # Panics
///
/// Panics if `thread` is the current thread.
pub fn join(thread: &Thread) -> Result<()> {
    let mut intr = interrupt::disable();
    let current = current();
    assert_ne!(current.id(), thread.id(), "{:?} cannot join itself", current);

    let core = intr.core();
    if core.status(thread.id()) != Status::Dying {
        let joiners = core.tcb(thread.id()).joiners;
        kdebug!(core.debug, DebugFlags::THREAD, "{:?} joins {:?}", current, thread);
        core.sched.enqueue(joiners, current.id());
        intr = block(intr);
    }

    match intr.core_ref().panic_of(thread.id()) {
        None => Ok(()),
        Some(message) => Err(Error::Panicked {
            name: thread.name().to_string(),
            message: message.to_string(),
        }),
    }
}

pub fn status(thread: &Thread) -> Status {
    interrupt::disable().core_ref().status(thread.id())
}

/// Sets the current thread's base priority (ticket count for the lottery
/// scheduler), yielding if a ready thread now outranks it.
pub fn set_priority(priority: u64) {
    set_priority_of(&current(), priority);
    yield_if_outranked();
}

/// Returns the current thread's effective priority.
pub fn get_priority() -> u64 {
    effective_priority_of(&current())
}

/// Base priority of `thread`, ignoring donations. A finished thread keeps the
/// value it had when it exited.
pub fn priority_of(thread: &Thread) -> u64 {
    interrupt::disable().core_ref().priority(thread.id())
}

/// Priority of `thread` after donations.
pub fn effective_priority_of(thread: &Thread) -> u64 {
    interrupt::disable().core_ref().effective_priority(thread.id())
}

/// # Panics
///
/// Panics if `priority` is outside [`priority_range`].
pub fn set_priority_of(thread: &Thread, priority: u64) {
    let mut intr = interrupt::disable();
    let core = intr.core();
    kdebug!(core.debug, DebugFlags::THREAD, "{:?} priority := {}", thread, priority);
    core.set_priority(thread.id(), priority);
}

/// Raise the current thread's base priority by one. Returns `false` at the
/// maximum.
pub fn increase_priority() -> bool {
    let current = current();
    let priority = priority_of(&current);
    if priority >= *priority_range().end() {
        return false;
    }
    set_priority(priority + 1);
    true
}

/// Lower the current thread's base priority by one. Returns `false` at the
/// minimum.
pub fn decrease_priority() -> bool {
    let current = current();
    let priority = priority_of(&current);
    if priority <= *priority_range().start() {
        return false;
    }
    set_priority(priority - 1);
    true
}

/// Valid base priorities of the installed scheduler.
pub fn priority_range() -> RangeInclusive<u64> {
    interrupt::disable().core_ref().sched.range()
}

pub fn scheduler_kind() -> SchedulerKind {
    interrupt::disable().core_ref().sched.kind()
}

/// Make the current thread sleep for the given ticks.
pub fn sleep(ticks: i64) {
    wait_until(ticks)
}

/// Under strict priority, give the CPU away if a ready thread has a higher
/// effective priority than the current one.
fn yield_if_outranked() {
    let intr = interrupt::disable();
    let current = current();
    let core = intr.core_ref();
    let outranked = core.sched.kind() == SchedulerKind::Priority
        && core.sched.aggregate(core.ready) > core.sched.effective_priority(current.id());
    intr.restore();

    if outranked {
        schedule();
    }
}
