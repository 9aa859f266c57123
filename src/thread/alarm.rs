use std::collections::BTreeSet;

use crate::debug::DebugFlags;
use crate::sbi::interrupt;
use crate::thread::{self, Tid};

/// Threads sleeping until a point in time.
///
/// Ordered by wake time, ties broken by thread creation order. Entries are
/// added by [`wait_until`] and removed only by the timer interrupt handler.
#[derive(Debug, Default)]
pub struct Alarm(BTreeSet<(u64, Tid)>);

impl Alarm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, wake: u64, tid: Tid) {
        self.0.insert((wake, tid));
    }

    /// Earliest wake time, if anyone sleeps.
    pub fn next_deadline(&self) -> Option<u64> {
        self.0.first().map(|(wake, _)| *wake)
    }

    /// Remove and return every thread due at `now`, earliest first.
    pub fn expire(&mut self, now: u64) -> Vec<Tid> {
        let mut due = Vec::new();
        while let Some(&(wake, tid)) = self.0.first() {
            if wake > now {
                break;
            }
            self.0.pop_first();
            due.push(tid);
        }
        due
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Put the current thread to sleep until `ticks` ticks from now.
///
/// The thread always blocks and is woken by a timer interrupt, even when
/// `ticks` is zero or negative.
pub fn wait_until(ticks: i64) {
    let mut intr = interrupt::disable();
    let current = thread::current();
    let wake = intr.now().saturating_add(ticks.max(0) as u64);

    let core = intr.core();
    kdebug!(
        core.debug,
        DebugFlags::ALARM,
        "{:?} sleeps until {} (now {})",
        current,
        wake,
        core.timer.now()
    );
    core.alarm.register(wake, current.id());

    thread::block(intr).restore();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_in_time_order() {
        let mut alarm = Alarm::new();
        alarm.register(10, Tid::from(1));
        alarm.register(5, Tid::from(2));
        alarm.register(5, Tid::from(0));
        assert_eq!(alarm.next_deadline(), Some(5));

        assert!(alarm.expire(4).is_empty());
        assert_eq!(alarm.expire(7), vec![Tid::from(0), Tid::from(2)]);
        assert_eq!(alarm.len(), 1);
        assert_eq!(alarm.expire(10), vec![Tid::from(1)]);
        assert!(alarm.is_empty());
        assert_eq!(alarm.next_deadline(), None);
    }
}
