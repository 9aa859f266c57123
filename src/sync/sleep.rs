use std::fmt;

use crate::debug::DebugFlags;
use crate::sbi::interrupt::{self, Intr};
use crate::sync::Lock;
use crate::thread::{self, Thread, Tid, WaitQueue};

/// Sleep lock.
///
/// Waiters park on a transferring [`WaitQueue`], so while anyone waits the
/// holder runs with the waiters' priority (or their tickets, under the
/// lottery scheduler). On release the lock is handed directly to the waiter
/// the scheduler picks.
pub struct Sleep {
    queue: WaitQueue,
}

impl Default for Sleep {
    fn default() -> Self {
        Self::new()
    }
}

impl Sleep {
    pub fn new() -> Self {
        Self {
            queue: WaitQueue::new(true),
        }
    }

    pub fn holder(&self) -> Option<Tid> {
        self.queue.holder(&interrupt::disable())
    }

    /// Threads waiting for the lock, next in line first.
    pub fn waiters(&self) -> Vec<std::sync::Arc<Thread>> {
        self.queue.waiters(&interrupt::disable())
    }

    pub(crate) fn is_held_by(&self, intr: &Intr, thread: &Thread) -> bool {
        self.queue.holder(intr) == Some(thread.id())
    }

    /// Acquire with interrupts already disabled. Blocks while the lock is
    /// held by someone else.
    pub(crate) fn acquire_locked(&self, mut intr: Intr, current: &Thread) -> Intr {
        let holder = self.queue.holder(&intr);
        assert_ne!(
            holder,
            Some(current.id()),
            "{:?} acquires a lock it already holds",
            current
        );

        if holder.is_none() {
            self.queue.acquire(&mut intr, current);
            return intr;
        }

        kdebug!(
            intr.core_ref().debug,
            DebugFlags::SYNC,
            "{:?} waits for {:?} held by {:?}",
            current,
            self.queue.id(),
            holder
        );
        self.queue.wait_for_access(&mut intr, current);
        let intr = thread::block(intr);
        debug_assert!(self.is_held_by(&intr, current));
        intr
    }

    /// Release with interrupts already disabled, handing the lock to the next
    /// waiter.
    pub(crate) fn release_locked(&self, intr: &mut Intr, current: &Thread) {
        assert!(
            self.is_held_by(intr, current),
            "{:?} releases a lock it does not hold",
            current
        );
        if let Some(next) = self.queue.next_thread(intr) {
            kdebug!(
                intr.core_ref().debug,
                DebugFlags::SYNC,
                "{:?} hands {:?} to {:?}",
                current,
                self.queue.id(),
                next
            );
            thread::wake_up(intr, &next);
        }
    }
}

impl Lock for Sleep {
    fn acquire(&self) {
        let intr = interrupt::disable();
        self.acquire_locked(intr, &thread::current()).restore();
    }

    fn release(&self) {
        let mut intr = interrupt::disable();
        // Guards dropped while a halted kernel unwinds its threads.
        if intr.halted() {
            return;
        }
        self.release_locked(&mut intr, &thread::current());
    }

    fn is_held_by_current_thread(&self) -> bool {
        self.is_held_by(&interrupt::disable(), &thread::current())
    }
}

impl fmt::Debug for Sleep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sleep").field("queue", &self.queue.id()).finish()
    }
}
