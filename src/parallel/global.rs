//! Process-wide worker pool, built on first use and never torn down.
//!
//! The worker count comes from [crate::config::global] and is read once, when
//! the pool is constructed. Process exit reclaims the threads.

use std::sync::{Mutex, OnceLock, PoisonError};

use rayon::ThreadPoolBuildError;
use tracing::debug;

use crate::config;
use crate::parallel::error::ParallelError;
use crate::parallel::pool::WorkerPool;

/// Lazily constructed [WorkerPool] shared by every caller.
///
/// Reads go through the `OnceLock` without locking; construction is serialized
/// by `init` so the worker count is read and the threads spawned exactly once.
/// A failed construction publishes nothing and a later call may retry.
#[derive(Debug)]
pub struct SharedPool {
    cell: OnceLock<WorkerPool>,
    init: Mutex<()>,
}

impl Default for SharedPool {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedPool {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn get(&self) -> Option<&WorkerPool> {
        self.cell.get()
    }

    /// Return the pool, building it with `workers()` threads if this is the first call.
    /// `workers` is not invoked when the pool already exists.
    pub fn get_or_try_init<W>(&self, workers: W) -> Result<&WorkerPool, ThreadPoolBuildError>
    where
        W: FnOnce() -> i64,
    {
        if let Some(pool) = self.cell.get() {
            return Ok(pool);
        }
        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pool) = self.cell.get() {
            return Ok(pool);
        }
        let pool = WorkerPool::new(workers())?;
        Ok(self.cell.get_or_init(|| pool))
    }

    /// Ensure the pool exists, then run `body` over `[lower, upper)` on it.
    pub fn run<W, F, E>(
        &self,
        workers: W,
        body: F,
        lower: usize,
        upper: usize,
    ) -> Result<(), ParallelError<E>>
    where
        W: FnOnce() -> i64,
        F: Fn(usize, usize) -> Result<(), E> + Sync,
        E: Send,
    {
        self.get_or_try_init(workers)
            .map_err(ParallelError::PoolBuild)?
            .run(body, lower, upper)
    }
}

static GLOBAL_POOL: SharedPool = SharedPool::new();

fn configured_workers() -> i64 {
    let workers = config::global().num_worker_threads;
    debug!(workers, "building global worker pool from configuration");
    workers
}

/// The process-wide pool, constructed from the global configuration on first call.
pub fn global_pool() -> Result<&'static WorkerPool, ThreadPoolBuildError> {
    GLOBAL_POOL.get_or_try_init(configured_workers)
}

/// Whether the process-wide pool has been constructed yet.
pub fn is_initialized() -> bool {
    GLOBAL_POOL.is_initialized()
}

/// Run `body(start, end)` over `[lower, upper)` on the process-wide pool.
///
/// Blocks until every sub-range has finished. `lower == upper` is a no-op
/// (the pool is still created). See [WorkerPool::run] for failure reporting.
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let visited = AtomicUsize::new(0);
/// parloop::run_parallel(
///     |start, end| {
///         visited.fetch_add(end - start, Ordering::Relaxed);
///         Ok::<_, std::convert::Infallible>(())
///     },
///     0,
///     100,
/// )
/// .unwrap();
/// assert_eq!(visited.into_inner(), 100);
/// ```
pub fn run_parallel<F, E>(body: F, lower: usize, upper: usize) -> Result<(), ParallelError<E>>
where
    F: Fn(usize, usize) -> Result<(), E> + Sync,
    E: Send,
{
    GLOBAL_POOL.run(configured_workers, body, lower, upper)
}
