//! Interrupt masking.
//!
//! With interrupts disabled no other kernel thread runs and the timer
//! interrupt cannot fire, so the caller has exclusive access to scheduler
//! state. [`Intr`] is the proof of that: every operation that touches a wait
//! queue or the ready queue takes one.

use std::cell::Cell;
use std::fmt;
use std::ptr;
use std::sync::MutexGuard;

use crate::thread::manager::{Core, Manager};

thread_local! {
    static DISABLED: Cell<bool> = Cell::new(false);
}

/// Interrupts are marked off on this host thread while a `Section` lives.
struct Section;

impl Section {
    fn enter() -> Self {
        let nested = DISABLED.with(|disabled| disabled.replace(true));
        assert!(!nested, "interrupts are already disabled on this thread");
        Section
    }
}

impl Drop for Section {
    fn drop(&mut self) {
        DISABLED.with(|disabled| disabled.set(false));
    }
}

/// Whether the calling thread is inside an atomic section.
pub fn disabled() -> bool {
    DISABLED.with(Cell::get)
}

/// Interrupts are off while this value is alive.
///
/// Dropping it (or calling [`Intr::restore`]) turns them back on. Blocking
/// ([`crate::thread::block`]) consumes it and hands a fresh one back when the
/// thread runs again.
pub struct Intr {
    manager: &'static Manager,
    core: MutexGuard<'static, Core>,
    _section: Section,
}

/// Disable interrupts on the kernel of the calling thread.
///
/// # Panics
///
/// Panics when called outside a kernel thread, or when interrupts are already
/// disabled on it. Any kernel operation that disables interrupts itself
/// therefore panics inside a section instead of waiting for it.
pub fn disable() -> Intr {
    Intr::new(Manager::get())
}

impl Intr {
    pub(crate) fn new(manager: &'static Manager) -> Self {
        let section = Section::enter();
        Self {
            manager,
            core: manager.lock(),
            _section: section,
        }
    }

    pub(crate) fn from_parts(manager: &'static Manager, core: MutexGuard<'static, Core>) -> Self {
        Self {
            manager,
            core,
            _section: Section::enter(),
        }
    }

    /// Leave the section but keep the kernel lock, for handing the CPU over.
    pub(crate) fn into_parts(self) -> (&'static Manager, MutexGuard<'static, Core>) {
        let Self { manager, core, .. } = self;
        (manager, core)
    }

    /// Re-enable interrupts.
    pub fn restore(self) {}

    /// Current clock reading, in ticks.
    pub fn now(&self) -> u64 {
        self.core.timer.now()
    }

    /// Whether the kernel has shut down.
    pub fn halted(&self) -> bool {
        self.core.halted
    }

    pub(crate) fn belongs_to(&self, manager: &Manager) -> bool {
        ptr::eq(self.manager, manager)
    }

    pub(crate) fn core(&mut self) -> &mut Core {
        &mut self.core
    }

    pub(crate) fn core_ref(&self) -> &Core {
        &self.core
    }
}

impl fmt::Debug for Intr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Intr").field("now", &self.now()).finish()
    }
}
