use std::sync::{Arc, Mutex};

use schedcore::sbi::timer;
use schedcore::thread::{self, alarm};
use schedcore::Config;

type Log = Arc<Mutex<Vec<(&'static str, u64)>>>;

fn sleeper(log: &Log, name: &'static str, ticks: i64) -> Arc<thread::Thread> {
    let log = log.clone();
    thread::spawn(name, move || {
        alarm::wait_until(ticks);
        log.lock().unwrap().push((name, timer::time()));
    })
    .unwrap()
}

#[test]
fn alarm_wakes_in_deadline_order() {
    let log = Log::default();
    let result = log.clone();
    schedcore::boot(Config::default(), move || {
        let late = sleeper(&log, "late", 10);
        let early = sleeper(&log, "early", 5);
        thread::join(&late).unwrap();
        thread::join(&early).unwrap();
    })
    .unwrap();

    assert_eq!(*result.lock().unwrap(), vec![("early", 5), ("late", 10)]);
}

#[test]
fn alarm_simultaneous_wakes_in_creation_order() {
    let log = Log::default();
    let result = log.clone();
    schedcore::boot(Config::default(), move || {
        let threads: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|name| sleeper(&log, name, 3))
            .collect();
        for t in &threads {
            thread::join(t).unwrap();
        }
    })
    .unwrap();

    assert_eq!(*result.lock().unwrap(), vec![("a", 3), ("b", 3), ("c", 3)]);
}

#[test]
fn alarm_zero_still_parks() {
    let log = Log::default();
    let result = log.clone();
    schedcore::boot(Config::default(), move || {
        let other = {
            let log = log.clone();
            thread::spawn("other", move || log.lock().unwrap().push(("other", timer::time())))
                .unwrap()
        };
        alarm::wait_until(0);
        log.lock().unwrap().push(("main", timer::time()));
        thread::join(&other).unwrap();
    })
    .unwrap();

    // `other` ran while main was parked; main resumed on the next interrupt.
    assert_eq!(*result.lock().unwrap(), vec![("other", 0), ("main", 1)]);
}

#[test]
fn alarm_negative_behaves_like_zero() {
    let now = Arc::new(Mutex::new(0));
    let result = now.clone();
    schedcore::boot(Config::default(), move || {
        thread::sleep(-5);
        *now.lock().unwrap() = timer::time();
    })
    .unwrap();
    assert_eq!(*result.lock().unwrap(), 1);
}

#[test]
fn alarm_waits_for_timer_interrupt() {
    let log = Log::default();
    let result = log.clone();
    let config = Config::default().timer_interval(4);
    schedcore::boot(config, move || {
        let t = sleeper(&log, "t", 5);
        thread::join(&t).unwrap();
    })
    .unwrap();

    // Due at 5, but the interrupt only fires on multiples of 4.
    assert_eq!(*result.lock().unwrap(), vec![("t", 8)]);
}

#[test]
fn alarm_wakes_after_yields_advance_clock() {
    let log = Log::default();
    let result = log.clone();
    schedcore::boot(Config::default(), move || {
        let t = sleeper(&log, "sleeper", 3);
        // Let it register, then burn ticks by yielding.
        thread::schedule();
        for _ in 0..5 {
            thread::schedule();
        }
        log.lock().unwrap().push(("main", timer::time()));
        thread::join(&t).unwrap();
    })
    .unwrap();

    let log = result.lock().unwrap();
    assert_eq!(log[0].0, "sleeper");
    assert!(log[0].1 >= 3);
    assert_eq!(log[1], ("main", 6));
}
