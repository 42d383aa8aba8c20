pub mod cli;
pub mod config;
pub mod parallel;

pub use parallel::{run_parallel, ParallelError, SubRange, WorkerPool};
