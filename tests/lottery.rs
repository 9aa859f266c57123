use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use schedcore::sync::Semaphore;
use schedcore::thread::{self, Builder};
use schedcore::{Config, SchedulerKind};

fn lottery(seed: u64) -> Config {
    Config::default().scheduler(SchedulerKind::Lottery).seed(seed)
}

/// Run two yielding threads holding `tickets` until they have been scheduled
/// `rounds` times in total; return how often each one ran.
fn share(seed: u64, tickets: [u64; 2], rounds: usize) -> [usize; 2] {
    let runs = Arc::new([AtomicUsize::new(0), AtomicUsize::new(0)]);
    let result = runs.clone();
    schedcore::boot(lottery(seed), move || {
        let total = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(Semaphore::new(0));
        for (i, tickets) in tickets.into_iter().enumerate() {
            let (runs, total, done) = (runs.clone(), total.clone(), done.clone());
            Builder::new(move || {
                while total.fetch_add(1, Ordering::SeqCst) < rounds {
                    runs[i].fetch_add(1, Ordering::SeqCst);
                    thread::schedule();
                }
                done.up();
            })
            .name(&format!("t{}", i))
            .priority(tickets)
            .spawn()
            .unwrap();
        }
        // A semaphore donates nothing, so the two threads compete alone.
        done.down();
        done.down();
    })
    .unwrap();
    [
        result[0].load(Ordering::SeqCst),
        result[1].load(Ordering::SeqCst),
    ]
}

#[test]
fn lottery_share_follows_tickets() {
    let [small, large] = share(199581, [1, 3], 4000);
    assert_eq!(small + large, 4000);
    // Expect about a quarter for the single ticket.
    assert!((800..=1200).contains(&small), "small thread ran {} times", small);
}

#[test]
fn lottery_equal_tickets_split_evenly() {
    let [a, b] = share(7, [5, 5], 2000);
    assert!((800..=1200).contains(&a), "{} vs {}", a, b);
}

#[test]
fn lottery_same_seed_same_schedule() {
    assert_eq!(share(42, [2, 3], 500), share(42, [2, 3], 500));
}

#[test]
fn lottery_ticket_bounds() {
    schedcore::boot(lottery(1), || {
        assert_eq!(thread::priority_range(), 1..=i32::MAX as u64);
        assert_eq!(thread::get_priority(), 1);
        thread::set_priority(1_000_000);
        assert_eq!(thread::get_priority(), 1_000_000);
        assert!(thread::decrease_priority());
        assert_eq!(thread::get_priority(), 999_999);

        let child = thread::spawn("broke", || thread::set_priority(0)).unwrap();
        assert!(thread::join(&child).is_err());
    })
    .unwrap();
}
