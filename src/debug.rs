//! Kernel debug flags.
//!
//! Each flag enables the debug output of one subsystem, in the spirit of the
//! single-character flags passed to a teaching kernel on its command line
//! (`-d tda`). Output goes through the [`log`] facade, one target per flag.

use core::fmt;

bitflags::bitflags! {
    #[derive(Default)]
    pub struct DebugFlags: u8 {
        /// Thread creation, context switches and exits (`t`).
        const THREAD = 0b0000_0001;
        /// Donation bookkeeping inside the scheduler (`d`).
        const DONATE = 0b0000_0010;
        /// Alarm registration and timer wake-ups (`a`).
        const ALARM = 0b0000_0100;
        /// Locks, condition variables, semaphores, communicator (`s`).
        const SYNC = 0b0000_1000;
        /// Re-check every scheduler invariant after each mutation (`v`).
        const VERIFY = 0b0001_0000;
    }
}

impl DebugFlags {
    /// Parse a flag string such as `"tda"`. `+` enables everything.
    pub fn from_chars(s: &str) -> Option<Self> {
        let mut flags = Self::empty();
        for c in s.chars().filter(|c| !c.is_whitespace()) {
            flags |= match c {
                't' => Self::THREAD,
                'd' => Self::DONATE,
                'a' => Self::ALARM,
                's' => Self::SYNC,
                'v' => Self::VERIFY,
                '+' => Self::all(),
                _ => return None,
            };
        }
        Some(flags)
    }

    /// The log target used for messages gated by this (single) flag.
    pub fn target(self) -> &'static str {
        if self.contains(Self::THREAD) {
            "schedcore::thread"
        } else if self.contains(Self::DONATE) {
            "schedcore::donate"
        } else if self.contains(Self::ALARM) {
            "schedcore::alarm"
        } else if self.contains(Self::SYNC) {
            "schedcore::sync"
        } else {
            "schedcore"
        }
    }

    /// Whether whole-engine invariant checks should run.
    pub fn verifies(self) -> bool {
        cfg!(feature = "verify") || self.contains(Self::VERIFY)
    }
}

impl fmt::Display for DebugFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, c) in [
            (Self::THREAD, 't'),
            (Self::DONATE, 'd'),
            (Self::ALARM, 'a'),
            (Self::SYNC, 's'),
            (Self::VERIFY, 'v'),
        ] {
            if self.contains(flag) {
                write!(f, "{}", c)?;
            }
        }
        Ok(())
    }
}

/// Emit a debug message if `$flag` is enabled in `$flags`.
#[macro_export]
macro_rules! kdebug {
    ($flags:expr, $flag:expr, $($arg:tt)+) => {{
        let flag: $crate::debug::DebugFlags = $flag;
        if $flags.contains(flag) {
            log::debug!(target: flag.target(), $($arg)+);
        }
    }};
}
