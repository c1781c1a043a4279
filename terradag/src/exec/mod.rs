// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`process`] runs a single subprocess, teeing its output to in-memory
//!   buffers and an optional combined log file, and forwarding interrupt
//!   signals to the child.
//! - [`parallel`] runs a batch of work units with bounded parallelism.
//! - [`interrupt`] carries the process-wide interrupted state as an
//!   explicit handle instead of hidden global flags.

pub mod interrupt;
pub mod parallel;
pub mod process;

pub use interrupt::Interruptor;
pub use parallel::bounded_parallel;
pub use process::{ProcessConfig, ProcessRunner};
