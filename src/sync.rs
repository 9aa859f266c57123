//! Synchronization primitives.
//!
//! All of them park threads on [`WaitQueue`](crate::thread::WaitQueue)s of
//! the installed scheduler, so waiters are woken in scheduling order and
//! locks donate priority to their holders.

pub mod communicator;
pub mod condvar;
pub mod mutex;
pub mod sema;
pub mod sleep;

pub use self::communicator::Communicator;
pub use self::condvar::Condvar;
pub use self::mutex::{Mutex, MutexGuard};
pub use self::sema::Semaphore;
pub use self::sleep::Sleep;

/// A lock that blocks the current thread until it is available.
pub trait Lock: Send + Sync {
    /// # Panics
    ///
    /// Panics if the current thread already holds the lock.
    fn acquire(&self);

    /// # Panics
    ///
    /// Panics if the current thread does not hold the lock.
    fn release(&self);

    fn is_held_by_current_thread(&self) -> bool;
}
