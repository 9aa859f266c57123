use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::thread::manager::Manager;

/// Thread identity. Allocated in creation order, so comparing two `Tid`s
/// tells which thread was created first.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tid(u64);

impl Tid {
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for Tid {
    fn from(raw: u64) -> Self {
        Tid(raw)
    }
}

impl fmt::Debug for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ready,
    Running,
    Blocked,
    Dying,
}

/// A kernel thread handle.
///
/// Scheduling state (priority, donations, queue membership) is kept by the
/// installed scheduler, keyed by [`Tid`]; the handle itself is immutable.
pub struct Thread {
    tid: Tid,
    name: String,
}

impl Thread {
    pub(crate) fn new(tid: Tid, name: String) -> Self {
        Self { tid, name }
    }

    pub fn id(&self) -> Tid {
        self.tid
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.name, self.tid)
    }
}

pub(crate) type Entry = Box<dyn FnOnce() + Send + 'static>;

/// Configures a thread before it is forked.
pub struct Builder {
    name: Option<String>,
    priority: Option<u64>,
    function: Entry,
}

impl Builder {
    pub fn new<F>(function: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            name: None,
            priority: None,
            function: Box::new(function),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Base priority (or ticket count) the thread starts with.
    pub fn priority(mut self, priority: u64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Register the thread with the scheduler and put it on the ready queue.
    /// It does not run until the current thread blocks or yields.
    pub fn spawn(self) -> Result<Arc<Thread>> {
        let manager = Manager::get();
        let name = self.name.unwrap_or_else(|| String::from("unnamed"));

        let mut core = manager.lock();
        let thread = core.create(name.clone(), self.priority);

        match manager.start(thread.clone(), self.function) {
            Ok(()) => {
                core.make_ready(thread.id());
                kdebug!(core.debug, crate::DebugFlags::THREAD, "spawn {:?}", thread);
                Ok(thread)
            }
            Err(source) => {
                core.discard(thread.id());
                Err(Error::Spawn { name, source })
            }
        }
    }
}
