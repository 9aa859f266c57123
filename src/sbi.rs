//! The simulated machine the kernel runs on: a single CPU, a tick counter
//! driving a periodic timer interrupt, and interrupt masking.

pub mod interrupt;
pub mod timer;
