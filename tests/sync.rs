use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use schedcore::sbi::{interrupt, timer};
use schedcore::sync::{Condvar, Lock, Mutex, Semaphore, Sleep};
use schedcore::thread::{self, Status, WaitQueue};
use schedcore::{Config, DebugFlags, Error};

fn verifying() -> Config {
    Config::default().debug(DebugFlags::VERIFY)
}

#[test]
fn sema_ping_pong() {
    let log = Arc::new(StdMutex::new(Vec::new()));
    let result = log.clone();
    schedcore::boot(verifying(), move || {
        let ping = Arc::new(Semaphore::new(0));
        let pong = Arc::new(Semaphore::new(0));
        let child = {
            let (ping, pong, log) = (ping.clone(), pong.clone(), log.clone());
            thread::spawn("pong", move || {
                for i in 0..3 {
                    ping.down();
                    log.lock().unwrap().push(format!("pong {}", i));
                    pong.up();
                }
            })
            .unwrap()
        };
        for i in 0..3 {
            log.lock().unwrap().push(format!("ping {}", i));
            ping.up();
            pong.down();
        }
        thread::join(&child).unwrap();
        assert_eq!(ping.value(), 0);
    })
    .unwrap();

    let expected: Vec<String> = (0..3)
        .flat_map(|i| [format!("ping {}", i), format!("pong {}", i)])
        .collect();
    assert_eq!(*result.lock().unwrap(), expected);
}

#[test]
fn mutex_serializes_yielding_writers() {
    let total = Arc::new(AtomicUsize::new(0));
    let result = total.clone();
    schedcore::boot(verifying(), move || {
        let counter = Arc::new(Mutex::new(0usize));
        let threads: Vec<_> = (0..4)
            .map(|i| {
                let counter = counter.clone();
                thread::spawn(&format!("writer {}", i), move || {
                    for _ in 0..10 {
                        let mut guard = counter.lock();
                        let seen = *guard;
                        // Give others a chance to interleave inside the section.
                        thread::schedule();
                        *guard = seen + 1;
                    }
                })
                .unwrap()
            })
            .collect();
        for t in &threads {
            thread::join(t).unwrap();
        }
        total.store(*counter.lock(), Ordering::SeqCst);
    })
    .unwrap();

    assert_eq!(result.load(Ordering::SeqCst), 40);
}

#[test]
fn condvar_producer_consumer() {
    let consumed = Arc::new(StdMutex::new(Vec::new()));
    let result = consumed.clone();
    schedcore::boot(verifying(), move || {
        let buffer = Arc::new(Mutex::new(Vec::<u32>::new()));
        let not_empty = Arc::new(Condvar::new(buffer.sleep_lock()));
        let not_full = Arc::new(Condvar::new(buffer.sleep_lock()));

        let consumer = {
            let (buffer, not_empty, not_full) =
                (buffer.clone(), not_empty.clone(), not_full.clone());
            thread::spawn("consumer", move || {
                for _ in 0..10 {
                    let mut guard = buffer.lock();
                    while guard.is_empty() {
                        not_empty.wait(&mut guard);
                    }
                    consumed.lock().unwrap().push(guard.remove(0));
                    not_full.wake();
                }
            })
            .unwrap()
        };

        for item in 0..10 {
            let mut guard = buffer.lock();
            while guard.len() == 2 {
                not_full.wait(&mut guard);
            }
            guard.push(item);
            not_empty.wake();
        }
        thread::join(&consumer).unwrap();
    })
    .unwrap();

    assert_eq!(*result.lock().unwrap(), (0..10).collect::<Vec<_>>());
}

#[test]
fn condvar_wake_all() {
    let woken = Arc::new(AtomicUsize::new(0));
    let result = woken.clone();
    schedcore::boot(verifying(), move || {
        let lock = Arc::new(Sleep::new());
        let cvar = Arc::new(Condvar::new(lock.clone()));
        let threads: Vec<_> = (0..3)
            .map(|i| {
                let (lock, cvar, woken) = (lock.clone(), cvar.clone(), woken.clone());
                thread::spawn(&format!("sleeper {}", i), move || {
                    lock.acquire();
                    cvar.sleep();
                    woken.fetch_add(1, Ordering::SeqCst);
                    lock.release();
                })
                .unwrap()
            })
            .collect();

        thread::sleep(1);
        lock.acquire();
        assert_eq!(cvar.waiters(), 3);
        cvar.wake_all();
        assert_eq!(cvar.waiters(), 0);
        lock.release();
        for t in &threads {
            thread::join(t).unwrap();
        }
    })
    .unwrap();

    assert_eq!(result.load(Ordering::SeqCst), 3);
}

fn expect_panic(name: &str, f: impl FnOnce() + Send + 'static, needle: &str) {
    let child = thread::spawn(name, f).unwrap();
    match thread::join(&child) {
        Err(Error::Panicked { message, .. }) => {
            assert!(message.contains(needle), "{}", message)
        }
        other => panic!("{} should have panicked, got {:?}", name, other),
    }
    assert_eq!(thread::status(&child), Status::Dying);
}

#[test]
fn contract_violations_abort_the_thread() {
    schedcore::boot(Config::default(), || {
        let lock = Arc::new(Sleep::new());

        let l = lock.clone();
        expect_panic("release", move || l.release(), "does not hold");

        let l = lock.clone();
        expect_panic(
            "twice",
            move || {
                l.acquire();
                l.acquire();
            },
            "already holds",
        );
        // The second thread died holding the lock; it was released on exit.
        assert_eq!(lock.holder(), None);

        let cvar = Arc::new(Condvar::new(lock.clone()));
        let c = cvar.clone();
        expect_panic("wake", move || c.wake(), "without holding");
        let c = cvar.clone();
        expect_panic("sleep", move || c.sleep(), "without holding");

        // The kernel is still usable.
        lock.acquire();
        cvar.wake_all();
        lock.release();
    })
    .unwrap();
}

#[test]
fn kernel_calls_inside_a_section_are_fatal() {
    schedcore::boot(Config::default(), || {
        expect_panic(
            "query",
            || {
                let intr = interrupt::disable();
                thread::priority_of(&thread::current());
                intr.restore();
            },
            "already disabled",
        );
        expect_panic(
            "clock",
            || {
                let _intr = interrupt::disable();
                timer::time();
            },
            "already disabled",
        );
        expect_panic(
            "queue",
            || {
                let _intr = interrupt::disable();
                WaitQueue::new(false);
            },
            "already disabled",
        );

        let intr = interrupt::disable();
        assert!(interrupt::disabled());
        intr.restore();
        assert!(!interrupt::disabled());
        assert_eq!(thread::priority_of(&thread::current()), 1);
    })
    .unwrap();
}

#[test]
fn deadlock_is_reported() {
    let result = schedcore::boot(Config::default(), || {
        Semaphore::new(0).down();
        unreachable!();
    });
    assert!(matches!(result, Err(Error::Deadlock { blocked: 1 })), "{:?}", result);
}

#[test]
fn lock_cycle_deadlocks() {
    let result = schedcore::boot(Config::default(), || {
        let (a, b) = (Arc::new(Sleep::new()), Arc::new(Sleep::new()));
        let started = Arc::new(Semaphore::new(0));
        a.acquire();
        let child = {
            let (a, b, started) = (a.clone(), b.clone(), started.clone());
            thread::spawn("child", move || {
                b.acquire();
                started.up();
                a.acquire();
            })
            .unwrap()
        };
        started.down();
        b.acquire();
        thread::join(&child).unwrap();
    });
    assert!(matches!(result, Err(Error::Deadlock { blocked: 2 })), "{:?}", result);
}

#[test]
fn main_panic_is_reported() {
    let result = schedcore::boot(Config::default(), || panic!("boom"));
    match result {
        Err(Error::Panicked { name, message }) => {
            assert_eq!(name, "main");
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn exit_stops_the_thread() {
    let reached = Arc::new(AtomicUsize::new(0));
    let result = reached.clone();
    schedcore::boot(Config::default(), move || {
        let child = {
            let reached = reached.clone();
            thread::spawn("quitter", move || {
                reached.fetch_add(1, Ordering::SeqCst);
                thread::exit();
            })
            .unwrap()
        };
        thread::join(&child).unwrap();
        reached.fetch_add(10, Ordering::SeqCst);
        thread::exit();
    })
    .unwrap();

    assert_eq!(result.load(Ordering::SeqCst), 11);
}

#[test]
fn halt_discards_remaining_threads() {
    let ran = Arc::new(AtomicUsize::new(0));
    let result = ran.clone();
    schedcore::boot(Config::default(), move || {
        let lock = Arc::new(Mutex::new(()));
        let guard = lock.lock();
        let l = lock.clone();
        let r = ran.clone();
        thread::spawn("stuck", move || {
            let _guard = l.lock();
            r.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        thread::schedule();
        // Main returns while `stuck` is still waiting for the lock.
        drop(guard);
    })
    .unwrap();

    assert_eq!(result.load(Ordering::SeqCst), 0);
}

#[test]
fn kernel_api_needs_a_kernel_thread() {
    assert!(schedcore::thread::Manager::try_get().is_none());
    assert!(std::panic::catch_unwind(thread::current).is_err());
}
