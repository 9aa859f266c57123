//! Synchronous rendezvous channel.
//!
//! A [`Communicator`] has no buffer: [`Communicator::speak`] returns only
//! after a listener has taken its word, and [`Communicator::listen`] returns
//! only after a speaker has handed it one. At any moment at most one speaker
//! and one listener are paired; everyone else queues behind them.

use std::fmt;

use crate::debug::DebugFlags;
use crate::sync::{Condvar, Mutex};
use crate::thread;

#[derive(Debug, Default)]
struct Channel {
    active_speaker: bool,
    active_listener: bool,
    waiting_speakers: usize,
    waiting_listeners: usize,
    /// Published by the active speaker, taken by the active listener.
    word: Option<u32>,
}

pub struct Communicator {
    channel: Mutex<Channel>,
    /// Speakers waiting for a free slot and a listener.
    to_speak: Condvar,
    /// Listeners waiting for the active listener to finish.
    to_listen: Condvar,
    word_ready: Condvar,
    word_taken: Condvar,
}

impl Default for Communicator {
    fn default() -> Self {
        Self::new()
    }
}

impl Communicator {
    pub fn new() -> Self {
        let channel = Mutex::new(Channel::default());
        let lock = channel.sleep_lock();
        Self {
            to_speak: Condvar::new(lock.clone()),
            to_listen: Condvar::new(lock.clone()),
            word_ready: Condvar::new(lock.clone()),
            word_taken: Condvar::new(lock),
            channel,
        }
    }

    /// Wait for a listener and hand it `word`. Returns once the word has been
    /// taken.
    pub fn speak(&self, word: u32) {
        let mut channel = self.channel.lock();

        while channel.active_speaker || !channel.active_listener {
            channel.waiting_speakers += 1;
            self.to_speak.wait(&mut channel);
            channel.waiting_speakers -= 1;
        }

        channel.active_speaker = true;
        channel.word = Some(word);
        self.word_ready.wake();
        kdebug!(
            thread::Manager::get().config().debug,
            DebugFlags::SYNC,
            "{:?} speaks {}",
            thread::current(),
            word
        );

        while channel.word.is_some() {
            self.word_taken.wait(&mut channel);
        }

        channel.active_speaker = false;
        self.to_speak.wake();
    }

    /// Wait for a speaker and return its word.
    pub fn listen(&self) -> u32 {
        let mut channel = self.channel.lock();

        while channel.active_listener {
            channel.waiting_listeners += 1;
            self.to_listen.wait(&mut channel);
            channel.waiting_listeners -= 1;
        }

        channel.active_listener = true;
        self.to_speak.wake();

        let word = loop {
            if let Some(word) = channel.word.take() {
                break word;
            }
            self.word_ready.wait(&mut channel);
        };
        self.word_taken.wake();
        kdebug!(
            thread::Manager::get().config().debug,
            DebugFlags::SYNC,
            "{:?} hears {}",
            thread::current(),
            word
        );

        channel.active_listener = false;
        self.to_listen.wake();
        word
    }

    /// Speakers and listeners currently queued behind the active pair.
    pub fn waiting(&self) -> (usize, usize) {
        let channel = self.channel.lock();
        (channel.waiting_speakers, channel.waiting_listeners)
    }
}

impl fmt::Debug for Communicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Communicator").finish_non_exhaustive()
    }
}
