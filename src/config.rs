//! Kernel configuration.
//!
//! A [`Config`] is built in code, parsed from a small `key = value` file, or
//! read from `SCHED_*` environment variables:
//!
//! ```text
//! # kernel.conf
//! scheduler = lottery
//! seed = 42
//! timer.interval = 10
//! debug = tdv
//! ```

use std::env;
use std::str::FromStr;

use crate::debug::DebugFlags;
use crate::error::{Error, Result};
use crate::thread::scheduler::SchedulerKind;

/// Seed of the lottery draw when none is configured.
pub const DEFAULT_SEED: u64 = 199581;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Scheduler installed at boot.
    pub scheduler: SchedulerKind,
    /// Seed of the scheduler's random generator (lottery draws).
    pub seed: u64,
    /// The timer interrupt fires every `timer_interval` ticks.
    pub timer_interval: u64,
    pub debug: DebugFlags,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerKind::Priority,
            seed: DEFAULT_SEED,
            timer_interval: 1,
            debug: DebugFlags::empty(),
        }
    }
}

impl Config {
    pub fn scheduler(mut self, scheduler: SchedulerKind) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn timer_interval(mut self, interval: u64) -> Self {
        assert!(interval > 0, "timer interval must be positive");
        self.timer_interval = interval;
        self
    }

    pub fn debug(mut self, flags: DebugFlags) -> Self {
        self.debug = flags;
        self
    }

    /// Parse a configuration file. Unset keys keep their defaults.
    pub fn parse(text: &str) -> Result<Self> {
        let mut config = Self::default();
        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let content = raw.split('#').next().unwrap_or("").trim();
            if content.is_empty() {
                continue;
            }
            let (key, value) = content.split_once('=').ok_or_else(|| Error::Config {
                line,
                message: format!("expected `key = value`, found `{}`", content),
            })?;
            config
                .set(key.trim(), value.trim())
                .map_err(|message| Error::Config { line, message })?;
        }
        Ok(config)
    }

    /// Read `SCHED_POLICY`, `SCHED_SEED`, `SCHED_TIMER_INTERVAL` and
    /// `SCHED_DEBUG`, falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|var| env::var(var).ok())
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        for (var, key) in [
            ("SCHED_POLICY", "scheduler"),
            ("SCHED_SEED", "seed"),
            ("SCHED_TIMER_INTERVAL", "timer.interval"),
            ("SCHED_DEBUG", "debug"),
        ] {
            if let Some(value) = lookup(var) {
                config
                    .set(key, value.trim())
                    .map_err(|message| Error::Env {
                        var: var.to_string(),
                        message,
                    })?;
            }
        }
        Ok(config)
    }

    fn set(&mut self, key: &str, value: &str) -> core::result::Result<(), String> {
        match key {
            "scheduler" => {
                self.scheduler = value.parse().map_err(|e: Error| e.to_string())?;
            }
            "seed" => {
                self.seed = value
                    .parse()
                    .map_err(|_| format!("invalid seed `{}`", value))?;
            }
            "timer.interval" => {
                self.timer_interval = match value.parse::<u64>() {
                    Ok(n) if n > 0 => n,
                    _ => return Err(format!("invalid timer interval `{}`", value)),
                };
            }
            "debug" => {
                self.debug = DebugFlags::from_chars(value)
                    .ok_or_else(|| format!("invalid debug flags `{}`", value))?;
            }
            _ => return Err(format!("unknown key `{}`", key)),
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
