use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::sync::{Lock, Sleep};

/// Data protected by a lock.
///
/// The lock is shared through an [`Arc`] so that condition variables can be
/// bound to it (see [`Mutex::sleep_lock`]).
pub struct Mutex<T, L: Lock = Sleep> {
    lock: Arc<L>,
    data: UnsafeCell<T>,
}

// SAFETY: `data` is only reached through a `MutexGuard`, which exists only
// while `lock` is held.
unsafe impl<T: Send, L: Lock> Sync for Mutex<T, L> {}

impl<T> Mutex<T, Sleep> {
    pub fn new(data: T) -> Self {
        Self::with_lock(Arc::new(Sleep::new()), data)
    }

    /// The lock guarding the data, for building a [`Condvar`](super::Condvar).
    pub fn sleep_lock(&self) -> Arc<Sleep> {
        self.lock.clone()
    }
}

impl<T, L: Lock> Mutex<T, L> {
    pub fn with_lock(lock: Arc<L>, data: T) -> Self {
        Self {
            lock,
            data: UnsafeCell::new(data),
        }
    }

    /// Block until the lock is acquired.
    pub fn lock(&self) -> MutexGuard<'_, T, L> {
        self.lock.acquire();
        MutexGuard { mutex: self }
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for Mutex<T, Sleep> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T, L: Lock + fmt::Debug> fmt::Debug for Mutex<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex").field("lock", &self.lock).finish_non_exhaustive()
    }
}

/// Releases the lock when dropped.
pub struct MutexGuard<'a, T, L: Lock = Sleep> {
    mutex: &'a Mutex<T, L>,
}

impl<T, L: Lock> MutexGuard<'_, T, L> {
    /// Give the lock up early, consuming the guard.
    pub fn unlock(self) {}
}

impl<T> MutexGuard<'_, T, Sleep> {
    pub(crate) fn sleep_lock(&self) -> &Arc<Sleep> {
        &self.mutex.lock
    }
}

impl<T, L: Lock> Deref for MutexGuard<'_, T, L> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the lock is held for as long as the guard lives.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T, L: Lock> DerefMut for MutexGuard<'_, T, L> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above, and `&mut self` makes the borrow unique.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T, L: Lock> Drop for MutexGuard<'_, T, L> {
    fn drop(&mut self) {
        self.mutex.lock.release();
    }
}
