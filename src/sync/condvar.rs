//! # Condition Variable
//!
//! [`Condvar`] blocks a thread so that it consumes no CPU time while waiting
//! for an event. It is bound to one [`Sleep`] lock, which must be held when
//! calling any of its methods; the predicate is always checked under that
//! lock before deciding to wait.
//!
//! ## Usage
//!
//! ```no_run
//! # use schedcore::sync::{Condvar, Mutex};
//! let ready = Mutex::new(false);
//! let cvar = Condvar::new(ready.sleep_lock());
//!
//! // Waiting side
//! let mut guard = ready.lock();
//! while !*guard {
//!     cvar.wait(&mut guard);
//! }
//! # drop(guard);
//!
//! // Signalling side: keep the guard alive across `wake`.
//! let mut guard = ready.lock();
//! *guard = true;
//! cvar.wake();
//! ```

use std::fmt;
use std::sync::Arc;

use crate::debug::DebugFlags;
use crate::sbi::interrupt;
use crate::sync::{MutexGuard, Sleep};
use crate::thread::{self, Thread, WaitQueue};

pub struct Condvar {
    lock: Arc<Sleep>,
    waiters: WaitQueue,
}

impl Condvar {
    pub fn new(lock: Arc<Sleep>) -> Self {
        Self {
            lock,
            waiters: WaitQueue::new(false),
        }
    }

    pub fn lock(&self) -> &Arc<Sleep> {
        &self.lock
    }

    /// Atomically release the lock and go to sleep until woken, then
    /// reacquire the lock before returning.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold the lock.
    pub fn sleep(&self) {
        let mut intr = interrupt::disable();
        let current = thread::current();
        assert!(
            self.lock.is_held_by(&intr, &current),
            "{:?} sleeps on a condition variable without holding its lock",
            current
        );

        kdebug!(
            intr.core_ref().debug,
            DebugFlags::SYNC,
            "{:?} sleeps on {:?}",
            current,
            self.waiters.id()
        );
        self.waiters.wait_for_access(&mut intr, &current);
        self.lock.release_locked(&mut intr, &current);
        let intr = thread::block(intr);

        self.lock.acquire_locked(intr, &current).restore();
    }

    /// [`Condvar::sleep`] for a lock held through a [`MutexGuard`].
    ///
    /// # Panics
    ///
    /// Panics if `guard` does not belong to this condition variable's lock.
    pub fn wait<T>(&self, guard: &mut MutexGuard<'_, T>) {
        assert!(
            Arc::ptr_eq(guard.sleep_lock(), &self.lock),
            "condition variable used with a foreign mutex"
        );
        self.sleep();
    }

    /// Wake the waiter the scheduler picks, if any.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold the lock.
    pub fn wake(&self) {
        let mut intr = interrupt::disable();
        self.assert_held(&intr, &thread::current());
        if let Some(thread) = self.waiters.next_thread(&mut intr) {
            thread::wake_up(&mut intr, &thread);
        }
    }

    /// Wake every waiter, in scheduling order.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold the lock.
    pub fn wake_all(&self) {
        let mut intr = interrupt::disable();
        self.assert_held(&intr, &thread::current());
        while let Some(thread) = self.waiters.next_thread(&mut intr) {
            thread::wake_up(&mut intr, &thread);
        }
    }

    /// Number of sleeping threads.
    pub fn waiters(&self) -> usize {
        self.waiters.len(&interrupt::disable())
    }

    fn assert_held(&self, intr: &interrupt::Intr, current: &Thread) {
        assert!(
            self.lock.is_held_by(intr, current),
            "{:?} wakes a condition variable without holding its lock",
            current
        );
    }
}

impl fmt::Debug for Condvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condvar")
            .field("lock", &self.lock)
            .field("waiters", &self.waiters.id())
            .finish()
    }
}
