pub mod batch;
pub mod error;
pub mod global;
pub mod pool;

pub use batch::{sub_ranges, SubRange};
pub use error::ParallelError;
pub use global::{global_pool, is_initialized, run_parallel, SharedPool};
pub use pool::{normalize_workers, WorkerPool, WORKER_THREAD_PREFIX};
