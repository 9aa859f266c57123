//! Schedulers and wait queues.
//!
//! Both policies share one donation engine ([`donate::Donate`]); they differ
//! only in how waiters' values are reduced and how the next waiter is chosen.

pub mod donate;
pub mod lottery;
pub mod priority;
pub mod queue;

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::Arc;

use crate::debug::DebugFlags;
use crate::error::{Error, Result};
use crate::sbi::interrupt::{self, Intr};
use crate::thread::{Manager, Thread, Tid};

use self::lottery::LotteryScheduler;
use self::priority::PriorityScheduler;

/// Identity of a wait queue inside the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueId(u64);

impl From<u64> for QueueId {
    fn from(raw: u64) -> Self {
        QueueId(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    Priority,
    Lottery,
}

impl SchedulerKind {
    pub fn build(self, seed: u64, debug: DebugFlags) -> Box<dyn Schedule> {
        match self {
            SchedulerKind::Priority => Box::new(PriorityScheduler::new(seed, debug)),
            SchedulerKind::Lottery => Box::new(LotteryScheduler::new(seed, debug)),
        }
    }
}

impl FromStr for SchedulerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "priority" => Ok(SchedulerKind::Priority),
            "lottery" => Ok(SchedulerKind::Lottery),
            other => Err(Error::UnknownScheduler(other.to_string())),
        }
    }
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SchedulerKind::Priority => "priority",
            SchedulerKind::Lottery => "lottery",
        })
    }
}

/// The contract every scheduler offers to the rest of the kernel.
///
/// "Priority" means the policy value: a priority for the priority scheduler,
/// a ticket count for the lottery scheduler.
pub trait Schedule: Send {
    fn kind(&self) -> SchedulerKind;

    /// Valid base priorities.
    fn range(&self) -> RangeInclusive<u64>;

    fn new_queue(&mut self, transfers: bool) -> QueueId;

    /// Forget a queue. Remaining waiters are detached, a holder loses the
    /// donation.
    fn drop_queue(&mut self, queue: QueueId);

    /// `thread` starts waiting on `queue`.
    fn enqueue(&mut self, queue: QueueId, thread: Tid);

    /// `thread` becomes the holder of `queue` without waiting for it.
    fn set_holder(&mut self, queue: QueueId, thread: Tid);

    /// The holder gives `queue` up, and the next waiter (if any) is removed
    /// and becomes the holder.
    fn next(&mut self, queue: QueueId) -> Option<Tid>;

    fn holder(&self, queue: QueueId) -> Option<Tid>;

    /// Waiters in queue order.
    fn waiters(&self, queue: QueueId) -> Vec<Tid>;

    fn aggregate(&self, queue: QueueId) -> u64;

    fn priority(&self, thread: Tid) -> u64;

    fn effective_priority(&self, thread: Tid) -> u64;

    /// # Panics
    ///
    /// Panics if `priority` is outside [`Schedule::range`].
    fn set_priority(&mut self, thread: Tid, priority: u64);

    fn waiting_on(&self, thread: Tid) -> Option<QueueId>;

    /// Transferring queues held by `thread`.
    fn held(&self, thread: Tid) -> Vec<QueueId>;

    /// Drop the scheduling state of an exiting thread.
    fn forget(&mut self, thread: Tid);

    /// Check every cached value against its definition.
    fn verify(&self) -> Result<()>;
}

/// A queue of threads waiting for one resource.
///
/// A transferring queue donates its waiters' priorities to its holder (used by
/// locks and joins); a non-transferring one only orders its waiters (used by
/// condition variables, semaphores and the ready queue).
///
/// Every operation takes the atomic section ([`Intr`]) as proof that the
/// caller has exclusive access to scheduler state.
pub struct WaitQueue {
    manager: &'static Manager,
    id: QueueId,
    transfers: bool,
}

impl WaitQueue {
    /// Create a queue in the kernel of the calling thread.
    ///
    /// # Panics
    ///
    /// Panics inside an atomic section.
    pub fn new(transfers: bool) -> Self {
        let manager = Manager::get();
        let id = Intr::new(manager).core().sched.new_queue(transfers);
        Self {
            manager,
            id,
            transfers,
        }
    }

    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn transfers(&self) -> bool {
        self.transfers
    }

    /// Put `thread` on the queue. The caller is responsible for blocking it.
    pub fn wait_for_access(&self, intr: &mut Intr, thread: &Thread) {
        debug_assert!(intr.belongs_to(self.manager));
        intr.core().sched.enqueue(self.id, thread.id());
    }

    /// Make `thread` the holder without queueing.
    pub fn acquire(&self, intr: &mut Intr, thread: &Thread) {
        debug_assert!(intr.belongs_to(self.manager));
        intr.core().sched.set_holder(self.id, thread.id());
    }

    /// Release the queue and pick the next holder. `None` when nobody waits.
    pub fn next_thread(&self, intr: &mut Intr) -> Option<Arc<Thread>> {
        debug_assert!(intr.belongs_to(self.manager));
        let core = intr.core();
        let tid = core.sched.next(self.id)?;
        Some(core.thread(tid))
    }

    pub fn holder(&self, intr: &Intr) -> Option<Tid> {
        intr.core_ref().sched.holder(self.id)
    }

    pub fn waiters(&self, intr: &Intr) -> Vec<Arc<Thread>> {
        let core = intr.core_ref();
        core.sched
            .waiters(self.id)
            .into_iter()
            .map(|tid| core.thread(tid))
            .collect()
    }

    pub fn len(&self, intr: &Intr) -> usize {
        intr.core_ref().sched.waiters(self.id).len()
    }

    pub fn is_empty(&self, intr: &Intr) -> bool {
        self.len(intr) == 0
    }

    /// The value this queue currently donates (or would donate) to a holder.
    pub fn aggregate(&self, intr: &Intr) -> u64 {
        intr.core_ref().sched.aggregate(self.id)
    }
}

impl Drop for WaitQueue {
    fn drop(&mut self) {
        // Unwinding out of a section; leak the queue rather than abort.
        if std::thread::panicking() && interrupt::disabled() {
            return;
        }
        let mut intr = Intr::new(self.manager);
        if !intr.halted() {
            intr.core().sched.drop_queue(self.id);
        }
    }
}

impl fmt::Debug for WaitQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitQueue")
            .field("id", &self.id)
            .field("transfers", &self.transfers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_str() {
        assert_eq!(
            "priority".parse::<SchedulerKind>().unwrap(),
            SchedulerKind::Priority
        );
        assert_eq!(
            " Lottery ".parse::<SchedulerKind>().unwrap(),
            SchedulerKind::Lottery
        );
        assert!(matches!(
            "fifo".parse::<SchedulerKind>(),
            Err(Error::UnknownScheduler(name)) if name == "fifo"
        ));
        assert_eq!(SchedulerKind::Lottery.to_string(), "lottery");
    }

    #[test]
    fn build_matches_kind() {
        for kind in [SchedulerKind::Priority, SchedulerKind::Lottery] {
            let sched = kind.build(1, DebugFlags::empty());
            assert_eq!(sched.kind(), kind);
        }
    }
}
