use std::cmp::Reverse;
use std::collections::BTreeSet;

use crate::thread::Tid;

/// Position of a thread inside a wait queue.
///
/// Ordered by effective value (highest first), then by the order in which the
/// threads arrived, so equal values are served first come, first served.
/// The key is a snapshot: a waiter whose effective value changes must be
/// removed and reinserted, never edited in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Waiter {
    value: Reverse<u64>,
    seq: u64,
    tid: Tid,
}

impl Waiter {
    pub fn new(value: u64, seq: u64, tid: Tid) -> Self {
        Self {
            value: Reverse(value),
            seq,
            tid,
        }
    }

    pub fn value(&self) -> u64 {
        self.value.0
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn tid(&self) -> Tid {
        self.tid
    }
}

pub type Waiters = BTreeSet<Waiter>;

/// Scheduler-side state of one wait queue.
#[derive(Debug)]
pub struct QueueState {
    pub(super) transfers: bool,
    pub(super) waiters: Waiters,
    /// Reduction over the waiters' effective values, donated to `holder`
    /// when the queue transfers priority.
    pub(super) aggregate: u64,
    pub(super) holder: Option<Tid>,
    next_seq: u64,
}

impl QueueState {
    pub fn new(transfers: bool, aggregate: u64) -> Self {
        Self {
            transfers,
            waiters: Waiters::new(),
            aggregate,
            holder: None,
            next_seq: 0,
        }
    }

    /// Hand out the next arrival number.
    pub fn ticket(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub fn transfers(&self) -> bool {
        self.transfers
    }

    pub fn waiters(&self) -> &Waiters {
        &self.waiters
    }

    pub fn aggregate(&self) -> u64 {
        self.aggregate
    }

    pub fn holder(&self) -> Option<Tid> {
        self.holder
    }
}
