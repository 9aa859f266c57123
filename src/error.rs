//! Errors surfaced to the code driving the kernel.
//!
//! Contract violations inside the kernel (releasing a lock one does not hold,
//! out-of-range priorities, ...) are assertions, not values of this type.

use std::io;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Every live thread is blocked and no alarm is pending.
    #[error("kernel deadlocked: {blocked} thread(s) blocked with no pending alarm")]
    Deadlock { blocked: usize },

    /// A kernel thread was aborted by a failed assertion or panic.
    #[error("thread `{name}` panicked: {message}")]
    Panicked { name: String, message: String },

    /// The host refused to create the thread backing a kernel thread.
    #[error("failed to spawn kernel thread `{name}`")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("config line {line}: {message}")]
    Config { line: usize, message: String },

    #[error("environment variable {var}: {message}")]
    Env { var: String, message: String },

    #[error("unknown scheduler `{0}` (expected `priority` or `lottery`)")]
    UnknownScheduler(String),

    /// Scheduler bookkeeping no longer matches its own definition.
    #[error("scheduler invariant violated: {0}")]
    Invariant(String),
}
