use std::sync::{Arc, Mutex as StdMutex};

use schedcore::sync::Communicator;
use schedcore::thread;
use schedcore::{Config, DebugFlags};

type Heard = Arc<StdMutex<Vec<u32>>>;

fn listener(comm: &Arc<Communicator>, heard: &Heard, name: &str) -> Arc<thread::Thread> {
    let (comm, heard) = (comm.clone(), heard.clone());
    thread::spawn(name, move || {
        let word = comm.listen();
        heard.lock().unwrap().push(word);
    })
    .unwrap()
}

fn speaker(comm: &Arc<Communicator>, word: u32) -> Arc<thread::Thread> {
    let comm = comm.clone();
    thread::spawn(&format!("speaker {}", word), move || comm.speak(word)).unwrap()
}

#[test]
fn communicator_speak_first() {
    let heard = Heard::default();
    let result = heard.clone();
    schedcore::boot(Config::default(), move || {
        let comm = Arc::new(Communicator::new());
        let s = speaker(&comm, 42);
        thread::schedule();
        assert_eq!(comm.waiting(), (1, 0));
        let l = listener(&comm, &heard, "listener");
        thread::join(&s).unwrap();
        thread::join(&l).unwrap();
    })
    .unwrap();
    assert_eq!(*result.lock().unwrap(), vec![42]);
}

#[test]
fn communicator_listen_first() {
    let heard = Heard::default();
    let result = heard.clone();
    schedcore::boot(Config::default(), move || {
        let comm = Arc::new(Communicator::new());
        let l = listener(&comm, &heard, "listener");
        thread::schedule();
        let s = speaker(&comm, 7);
        thread::join(&l).unwrap();
        thread::join(&s).unwrap();
    })
    .unwrap();
    assert_eq!(*result.lock().unwrap(), vec![7]);
}

#[test]
fn communicator_word_goes_to_one_listener() {
    let heard = Heard::default();
    let result = heard.clone();
    schedcore::boot(Config::default(), move || {
        let comm = Arc::new(Communicator::new());
        let l1 = listener(&comm, &heard, "l1");
        let l2 = listener(&comm, &heard, "l2");
        let s = speaker(&comm, 42);
        thread::join(&s).unwrap();
        for _ in 0..5 {
            thread::schedule();
        }
        assert_eq!(*heard.lock().unwrap(), vec![42]);

        comm.speak(43);
        thread::join(&l1).unwrap();
        thread::join(&l2).unwrap();
    })
    .unwrap();

    assert_eq!(*result.lock().unwrap(), vec![42, 43]);
}

#[test]
fn communicator_many_pairs() {
    let heard = Heard::default();
    let result = heard.clone();
    let config = Config::default().debug(DebugFlags::VERIFY);
    schedcore::boot(config, move || {
        let comm = Arc::new(Communicator::new());
        let mut threads = Vec::new();
        for word in 0..6 {
            threads.push(speaker(&comm, word));
            threads.push(listener(&comm, &heard, &format!("listener {}", word)));
        }
        for t in &threads {
            thread::join(t).unwrap();
        }
    })
    .unwrap();

    let mut heard = result.lock().unwrap().clone();
    heard.sort_unstable();
    assert_eq!(heard, (0..6).collect::<Vec<_>>());
}

#[test]
fn communicator_under_lottery() {
    let heard = Heard::default();
    let result = heard.clone();
    let config = Config::default().scheduler(schedcore::SchedulerKind::Lottery);
    schedcore::boot(config, move || {
        let comm = Arc::new(Communicator::new());
        let listeners: Vec<_> = (0..4)
            .map(|i| listener(&comm, &heard, &format!("listener {}", i)))
            .collect();
        for word in 100..104 {
            comm.speak(word);
        }
        for l in &listeners {
            thread::join(l).unwrap();
        }
    })
    .unwrap();

    let mut heard = result.lock().unwrap().clone();
    heard.sort_unstable();
    assert_eq!(heard, vec![100, 101, 102, 103]);
}
