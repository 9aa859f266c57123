use std::sync::atomic::{AtomicUsize, Ordering};

use crate::sbi::interrupt;
use crate::thread::{self, WaitQueue};

/// Counting semaphore
///
/// Waiters park on a non-transferring queue: they are woken in scheduling
/// order but donate nothing, since a semaphore has no holder.
///
/// # Examples
/// ```no_run
/// # use schedcore::sync::Semaphore;
/// let sema = Semaphore::new(1);
/// sema.down();
/// sema.up();
/// ```
pub struct Semaphore {
    value: AtomicUsize,
    waiters: WaitQueue,
}

impl Semaphore {
    /// Creates a new semaphore of initial value n.
    pub fn new(n: usize) -> Self {
        Semaphore {
            value: AtomicUsize::new(n),
            waiters: WaitQueue::new(false),
        }
    }

    /// P operation
    pub fn down(&self) {
        let mut intr = interrupt::disable();
        let current = thread::current();

        while self.value() == 0 {
            self.waiters.wait_for_access(&mut intr, &current);
            intr = thread::block(intr);
        }
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    /// V operation
    pub fn up(&self) {
        let mut intr = interrupt::disable();
        self.value.fetch_add(1, Ordering::Relaxed);

        if let Some(thread) = self.waiters.next_thread(&mut intr) {
            thread::wake_up(&mut intr, &thread);
        }
    }

    /// Get the current value of a semaphore
    pub fn value(&self) -> usize {
        self.value.load(Ordering::Relaxed)
    }
}
