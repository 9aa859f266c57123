//! Strict priority scheduling with priority donation.

use rand_pcg::Pcg64Mcg;

use super::donate::{Donate, Policy};
use super::queue::{Waiter, Waiters};
use super::SchedulerKind;

pub const PRI_MIN: u64 = 0;
pub const PRI_MAX: u64 = 7;
pub const PRI_DEFAULT: u64 = 1;

/// The highest effective priority is served first; a holder runs at the
/// highest priority of any thread waiting on it.
#[derive(Debug)]
pub enum Priority {}

impl Policy for Priority {
    const KIND: SchedulerKind = SchedulerKind::Priority;
    const MIN: u64 = PRI_MIN;
    const MAX: u64 = PRI_MAX;
    const DEFAULT: u64 = PRI_DEFAULT;

    fn reduce<I: IntoIterator<Item = u64>>(values: I) -> u64 {
        values.into_iter().fold(PRI_MIN, u64::max)
    }

    fn select(waiters: &Waiters, _aggregate: u64, _rng: &mut Pcg64Mcg) -> Option<Waiter> {
        waiters.first().copied()
    }
}

pub type PriorityScheduler = Donate<Priority>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_is_max() {
        assert_eq!(Priority::reduce(std::iter::empty()), 0);
        assert_eq!(Priority::reduce([3, 7, 1]), 7);
        assert_eq!(Priority::reduce([2]), 2);
    }
}
