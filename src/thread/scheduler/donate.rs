//! The donation engine shared by the priority and lottery schedulers.
//!
//! Every thread has a base value and an effective value. The effective value
//! is the policy's reduction over the base value and the aggregates of all
//! transferring queues the thread holds; a queue's aggregate is the reduction
//! over its waiters' effective values. Both are cached and kept exact by
//! propagating every change along the chain
//! `waiter -> queue -> holder -> queue it waits on -> holder ...`
//! until a value stops changing.

use std::collections::{BTreeMap, BTreeSet};
use std::iter;
use std::marker::PhantomData;
use std::ops::RangeInclusive;

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

use super::queue::{QueueState, Waiter, Waiters};
use super::{QueueId, Schedule, SchedulerKind};
use crate::debug::DebugFlags;
use crate::error::{Error, Result};
use crate::thread::Tid;

/// What distinguishes one scheduling policy from another.
pub trait Policy: Send + 'static {
    const KIND: SchedulerKind;
    const MIN: u64;
    const MAX: u64;
    const DEFAULT: u64;

    /// Combine values into one. Used both for a queue's aggregate (over its
    /// waiters) and for a thread's effective value (over its base value and
    /// the aggregates of the queues it holds).
    fn reduce<I: IntoIterator<Item = u64>>(values: I) -> u64;

    /// Choose the waiter to dequeue. `aggregate` is the reduction over
    /// `waiters`.
    fn select(waiters: &Waiters, aggregate: u64, rng: &mut Pcg64Mcg) -> Option<Waiter>;
}

/// Per-thread scheduling state.
#[derive(Debug, Clone)]
pub struct ThreadState {
    base: u64,
    effective: u64,
    waiting_on: Option<QueueId>,
    /// Arrival number inside `waiting_on`.
    seq: u64,
    holds: BTreeSet<QueueId>,
}

impl ThreadState {
    fn new(base: u64) -> Self {
        Self {
            base,
            effective: base,
            waiting_on: None,
            seq: 0,
            holds: BTreeSet::new(),
        }
    }
}

pub struct Donate<P: Policy> {
    threads: BTreeMap<Tid, ThreadState>,
    queues: BTreeMap<QueueId, QueueState>,
    next_queue: u64,
    rng: Pcg64Mcg,
    debug: DebugFlags,
    _policy: PhantomData<fn() -> P>,
}

impl<P: Policy> Donate<P> {
    pub fn new(seed: u64, debug: DebugFlags) -> Self {
        Self {
            threads: BTreeMap::new(),
            queues: BTreeMap::new(),
            next_queue: 0,
            rng: Pcg64Mcg::seed_from_u64(seed),
            debug,
            _policy: PhantomData,
        }
    }

    /// Scheduling state of `tid`, created on first use.
    fn state(&mut self, tid: Tid) -> &mut ThreadState {
        self.threads
            .entry(tid)
            .or_insert_with(|| ThreadState::new(P::DEFAULT))
    }

    fn queue_mut(&mut self, queue: QueueId) -> &mut QueueState {
        match self.queues.get_mut(&queue) {
            Some(state) => state,
            None => panic!("unknown wait queue {:?}", queue),
        }
    }

    fn queue_ref(&self, queue: QueueId) -> &QueueState {
        match self.queues.get(&queue) {
            Some(state) => state,
            None => panic!("unknown wait queue {:?}", queue),
        }
    }

    /// Recompute the aggregate of `queue`. Returns the holder whose effective
    /// value must be recomputed, if the donation changed.
    fn refresh_queue(&mut self, queue: QueueId) -> Option<Tid> {
        let state = self.queue_mut(queue);
        let aggregate = P::reduce(state.waiters.iter().map(Waiter::value));
        if aggregate == state.aggregate {
            return None;
        }
        state.aggregate = aggregate;
        if state.transfers {
            state.holder
        } else {
            None
        }
    }

    /// Recompute the effective value of `tid` and push the change up the
    /// donation chain.
    fn refresh_thread(&mut self, mut tid: Tid) {
        loop {
            let (old, new, waiting_on, seq) = {
                let state = self.state(tid).clone();
                let new = P::reduce(
                    iter::once(state.base)
                        .chain(state.holds.iter().map(|q| self.queue_ref(*q).aggregate)),
                );
                (state.effective, new, state.waiting_on, state.seq)
            };
            if old == new {
                return;
            }
            kdebug!(
                self.debug,
                DebugFlags::DONATE,
                "{:?} effective {} -> {}",
                tid,
                old,
                new
            );

            let Some(queue) = waiting_on else {
                self.state(tid).effective = new;
                return;
            };

            let waiters = &mut self.queue_mut(queue).waiters;
            let removed = waiters.remove(&Waiter::new(old, seq, tid));
            debug_assert!(removed, "{:?} missing from {:?}", tid, queue);
            waiters.insert(Waiter::new(new, seq, tid));
            self.state(tid).effective = new;

            match self.refresh_queue(queue) {
                Some(holder) => tid = holder,
                None => return,
            }
        }
    }

    /// Give up `queue` if `tid` holds it, withdrawing its donation.
    fn relinquish(&mut self, queue: QueueId, tid: Tid) {
        let state = self.state(tid);
        if state.holds.remove(&queue) {
            self.refresh_thread(tid);
        }
    }

    fn check(&self) {
        if self.debug.verifies() {
            if let Err(e) = self.verify() {
                panic!("{}", e);
            }
        }
    }
}

impl<P: Policy> Schedule for Donate<P> {
    fn kind(&self) -> SchedulerKind {
        P::KIND
    }

    fn range(&self) -> RangeInclusive<u64> {
        P::MIN..=P::MAX
    }

    fn new_queue(&mut self, transfers: bool) -> QueueId {
        let id = QueueId::from(self.next_queue);
        self.next_queue += 1;
        self.queues
            .insert(id, QueueState::new(transfers, P::reduce(iter::empty())));
        id
    }

    fn drop_queue(&mut self, queue: QueueId) {
        let Some(state) = self.queues.remove(&queue) else {
            return;
        };
        if !state.waiters.is_empty() {
            log::warn!(
                "wait queue {:?} dropped with {} waiter(s)",
                queue,
                state.waiters.len()
            );
            for waiter in &state.waiters {
                self.state(waiter.tid()).waiting_on = None;
            }
        }
        if let Some(holder) = state.holder {
            self.relinquish(queue, holder);
        }
        self.check();
    }

    fn enqueue(&mut self, queue: QueueId, thread: Tid) {
        let state = self.state(thread);
        assert!(
            state.waiting_on.is_none(),
            "{:?} is already waiting on {:?}",
            thread,
            state.waiting_on
        );
        let effective = state.effective;

        let target = self.queue_mut(queue);
        assert!(
            target.holder != Some(thread),
            "{:?} cannot wait on {:?}, which it holds",
            thread,
            queue
        );
        let seq = target.ticket();
        target.waiters.insert(Waiter::new(effective, seq, thread));

        let state = self.state(thread);
        state.waiting_on = Some(queue);
        state.seq = seq;

        if let Some(holder) = self.refresh_queue(queue) {
            self.refresh_thread(holder);
        }
        self.check();
    }

    fn set_holder(&mut self, queue: QueueId, thread: Tid) {
        assert!(
            self.state(thread).waiting_on != Some(queue),
            "{:?} is waiting on {:?}",
            thread,
            queue
        );
        let target = self.queue_mut(queue);
        if !target.transfers {
            return;
        }
        let previous = target.holder.replace(thread);
        if let Some(previous) = previous.filter(|p| *p != thread) {
            self.relinquish(queue, previous);
        }
        self.state(thread).holds.insert(queue);
        self.refresh_thread(thread);
        self.check();
    }

    fn next(&mut self, queue: QueueId) -> Option<Tid> {
        let previous = self.queue_mut(queue).holder.take();
        if let Some(holder) = previous {
            self.relinquish(queue, holder);
        }

        let target = match self.queues.get_mut(&queue) {
            Some(state) => state,
            None => panic!("unknown wait queue {:?}", queue),
        };
        let Some(chosen) = P::select(&target.waiters, target.aggregate, &mut self.rng) else {
            self.check();
            return None;
        };
        target.waiters.remove(&chosen);
        let transfers = target.transfers;

        let tid = chosen.tid();
        self.state(tid).waiting_on = None;
        // The queue has no holder at this point, so nothing propagates.
        self.refresh_queue(queue);

        if transfers {
            self.queue_mut(queue).holder = Some(tid);
            self.state(tid).holds.insert(queue);
            self.refresh_thread(tid);
        }
        self.check();
        Some(tid)
    }

    fn holder(&self, queue: QueueId) -> Option<Tid> {
        self.queue_ref(queue).holder
    }

    fn waiters(&self, queue: QueueId) -> Vec<Tid> {
        self.queue_ref(queue)
            .waiters
            .iter()
            .map(Waiter::tid)
            .collect()
    }

    fn aggregate(&self, queue: QueueId) -> u64 {
        self.queue_ref(queue).aggregate
    }

    fn priority(&self, thread: Tid) -> u64 {
        self.threads.get(&thread).map_or(P::DEFAULT, |s| s.base)
    }

    fn effective_priority(&self, thread: Tid) -> u64 {
        self.threads.get(&thread).map_or(P::DEFAULT, |s| s.effective)
    }

    fn set_priority(&mut self, thread: Tid, priority: u64) {
        assert!(
            (P::MIN..=P::MAX).contains(&priority),
            "priority {} out of range {}..={}",
            priority,
            P::MIN,
            P::MAX
        );
        let state = self.state(thread);
        if state.base == priority {
            return;
        }
        state.base = priority;
        self.refresh_thread(thread);
        self.check();
    }

    fn waiting_on(&self, thread: Tid) -> Option<QueueId> {
        self.threads.get(&thread).and_then(|s| s.waiting_on)
    }

    fn held(&self, thread: Tid) -> Vec<QueueId> {
        self.threads
            .get(&thread)
            .map(|s| s.holds.iter().copied().collect())
            .unwrap_or_default()
    }

    fn forget(&mut self, thread: Tid) {
        let Some(state) = self.threads.remove(&thread) else {
            return;
        };
        assert!(
            state.waiting_on.is_none(),
            "{:?} exits while waiting on {:?}",
            thread,
            state.waiting_on
        );
        for queue in &state.holds {
            if let Some(target) = self.queues.get_mut(queue) {
                target.holder = None;
            }
        }
    }

    fn verify(&self) -> Result<()> {
        let violation = |message: String| Err(Error::Invariant(message));

        for (id, queue) in &self.queues {
            let aggregate = P::reduce(queue.waiters.iter().map(Waiter::value));
            if aggregate != queue.aggregate {
                return violation(format!(
                    "{:?} caches aggregate {} but its waiters reduce to {}",
                    id, queue.aggregate, aggregate
                ));
            }
            for waiter in &queue.waiters {
                let Some(state) = self.threads.get(&waiter.tid()) else {
                    return violation(format!(
                        "{:?} waits on {:?} without state",
                        waiter.tid(),
                        id
                    ));
                };
                if state.waiting_on != Some(*id) || state.seq != waiter.seq() {
                    return violation(format!(
                        "{:?} is queued on {:?} but waits on {:?}",
                        waiter.tid(),
                        id,
                        state.waiting_on
                    ));
                }
                if state.effective != waiter.value() {
                    return violation(format!(
                        "{:?} is keyed {} on {:?} but its effective value is {}",
                        waiter.tid(),
                        waiter.value(),
                        id,
                        state.effective
                    ));
                }
            }
            if let Some(holder) = queue.holder {
                let held = self
                    .threads
                    .get(&holder)
                    .map_or(false, |s| s.holds.contains(id));
                if !queue.transfers || !held {
                    return violation(format!("{:?} names {:?} as holder", id, holder));
                }
            }
        }

        for (tid, state) in &self.threads {
            let mut aggregates = Vec::with_capacity(state.holds.len());
            for queue in &state.holds {
                match self.queues.get(queue) {
                    Some(q) if q.holder == Some(*tid) => aggregates.push(q.aggregate),
                    _ => {
                        return violation(format!("{:?} claims to hold {:?}", tid, queue));
                    }
                }
            }
            let effective = P::reduce(iter::once(state.base).chain(aggregates));
            if effective != state.effective {
                return violation(format!(
                    "{:?} caches effective {} but should be {}",
                    tid, state.effective, effective
                ));
            }
            if let Some(queue) = state.waiting_on {
                let queued = self.queues.get(&queue).map_or(false, |q| {
                    q.waiters
                        .contains(&Waiter::new(state.effective, state.seq, *tid))
                });
                if !queued {
                    return violation(format!(
                        "{:?} waits on {:?} but is not queued",
                        tid, queue
                    ));
                }
            }
        }
        Ok(())
    }
}
