//! Scheduling and synchronization core of a cooperative teaching kernel.
//!
//! Kernel threads run one at a time on a simulated CPU. The installed
//! scheduler (strict priority or lottery) orders both the ready queue and every
//! wait queue, and donates priority (or tickets) from waiters to the holder of
//! the resource they wait for, transitively along chains of locks.
//!
//! ```no_run
//! use schedcore::sync::{Lock, Sleep};
//! use schedcore::{thread, Config};
//! use std::sync::Arc;
//!
//! schedcore::boot(Config::default(), || {
//!     let lock = Arc::new(Sleep::new());
//!     let child = {
//!         let lock = lock.clone();
//!         thread::spawn("child", move || {
//!             lock.acquire();
//!             lock.release();
//!         })
//!         .unwrap()
//!     };
//!     thread::join(&child).unwrap();
//! })
//! .unwrap();
//! ```

#[macro_use]
pub mod debug;

pub mod config;
pub mod error;
pub mod sbi;
pub mod sync;
pub mod thread;

pub use self::config::Config;
pub use self::debug::DebugFlags;
pub use self::error::{Error, Result};
pub use self::thread::manager::boot;
pub use self::thread::scheduler::SchedulerKind;
