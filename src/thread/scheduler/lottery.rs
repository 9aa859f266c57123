//! Lottery scheduling with ticket transfer.
//!
//! The next thread is chosen by a weighted draw over the waiters' effective
//! ticket counts. A holder owns its own tickets plus all tickets of the
//! threads waiting on it.

use rand::Rng;
use rand_pcg::Pcg64Mcg;

use super::donate::{Donate, Policy};
use super::queue::{Waiter, Waiters};
use super::SchedulerKind;

pub const TICKETS_MIN: u64 = 1;
pub const TICKETS_MAX: u64 = i32::MAX as u64;
pub const TICKETS_DEFAULT: u64 = 1;

#[derive(Debug)]
pub enum Lottery {}

impl Policy for Lottery {
    const KIND: SchedulerKind = SchedulerKind::Lottery;
    const MIN: u64 = TICKETS_MIN;
    const MAX: u64 = TICKETS_MAX;
    const DEFAULT: u64 = TICKETS_DEFAULT;

    fn reduce<I: IntoIterator<Item = u64>>(values: I) -> u64 {
        values.into_iter().fold(0, u64::saturating_add)
    }

    fn select(waiters: &Waiters, aggregate: u64, rng: &mut Pcg64Mcg) -> Option<Waiter> {
        if waiters.is_empty() {
            return None;
        }
        let mut ticket = rng.gen_range(0..aggregate);
        for waiter in waiters {
            if ticket < waiter.value() {
                return Some(*waiter);
            }
            ticket -= waiter.value();
        }
        unreachable!("ticket drawn past the total of {}", aggregate)
    }
}

pub type LotteryScheduler = Donate<Lottery>;
