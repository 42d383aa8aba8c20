//! Fixed-size Rayon thread pool that runs a loop body over a partitioned index range.
//!
//! Threads are spawned once in [WorkerPool::new] and reused by every call to
//! [WorkerPool::run]; nothing is created or torn down per dispatch.

use std::panic::{self, AssertUnwindSafe};

use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use tracing::{debug, warn};

use crate::parallel::batch::{sub_ranges, SubRange};
use crate::parallel::error::{panic_message, ParallelError};

/// Prefix of every worker thread name; the worker index is appended.
pub const WORKER_THREAD_PREFIX: &str = "parloop-worker-";

/// Clamp a requested worker count to at least one thread.
pub fn normalize_workers(requested: i64) -> usize {
    usize::try_from(requested)
        .ok()
        .filter(|&n| n > 0)
        .unwrap_or(1)
}

enum Failure<E> {
    Body(E),
    Panicked(String),
}

/// Persistent set of worker threads for parallel loops.
pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .finish()
    }
}

impl WorkerPool {
    /// Spawn the worker threads. Counts of zero or below start a single worker.
    pub fn new(requested: i64) -> Result<Self, ThreadPoolBuildError> {
        let workers = normalize_workers(requested);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("{WORKER_THREAD_PREFIX}{i}"))
            .build()?;
        debug!(requested, workers, "worker pool started");
        Ok(Self { pool, workers })
    }

    pub fn num_workers(&self) -> usize {
        self.workers
    }

    /// The split [WorkerPool::run] would use for `[lower, upper)`.
    pub fn partition(&self, lower: usize, upper: usize) -> Vec<SubRange> {
        sub_ranges(lower, upper, self.workers)
    }

    /// Run `body(start, end)` once per sub-range of `[lower, upper)` and block until all finish.
    ///
    /// Sub-range `i` always runs on worker `i` (`parloop-worker-{i}`); workers
    /// past the last sub-range sit the call out. Sub-ranges execute concurrently
    /// and finish in no particular order, so `body` must be safe to call on
    /// disjoint ranges at the same time. A failing or panicking
    /// sub-range does not stop the others; once all are done, the failure of the
    /// lowest-indexed failing sub-range is returned.
    pub fn run<F, E>(&self, body: F, lower: usize, upper: usize) -> Result<(), ParallelError<E>>
    where
        F: Fn(usize, usize) -> Result<(), E> + Sync,
        E: Send,
    {
        let ranges = self.partition(lower, upper);
        if ranges.is_empty() {
            return Ok(());
        }
        debug!(lower, upper, sub_ranges = ranges.len(), "dispatching parallel loop");

        let outcomes: Vec<Option<Failure<E>>> = self.pool.broadcast(|ctx| {
            ranges
                .get(ctx.index())
                .and_then(|range| run_sub_range(&body, *range).err())
        });

        first_failure(&ranges, outcomes)
    }
}

fn run_sub_range<F, E>(body: &F, range: SubRange) -> Result<(), Failure<E>>
where
    F: Fn(usize, usize) -> Result<(), E>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| body(range.start, range.end))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(Failure::Body(err)),
        Err(payload) => Err(Failure::Panicked(panic_message(payload.as_ref()))),
    }
}

fn first_failure<E>(
    ranges: &[SubRange],
    outcomes: Vec<Option<Failure<E>>>,
) -> Result<(), ParallelError<E>> {
    let mut failures = ranges
        .iter()
        .zip(outcomes)
        .filter_map(|(range, outcome)| outcome.map(|failure| (*range, failure)));

    let Some((range, failure)) = failures.next() else {
        return Ok(());
    };
    let suppressed = failures.count();
    if suppressed > 0 {
        warn!(
            start = range.start,
            end = range.end,
            suppressed,
            "multiple sub-ranges failed; reporting the first"
        );
    }

    Err(match failure {
        Failure::Body(source) => ParallelError::Body {
            range,
            source,
            suppressed,
        },
        Failure::Panicked(message) => ParallelError::Panicked {
            range,
            message,
            suppressed,
        },
    })
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    fn recorded_ranges(pool: &WorkerPool, lower: usize, upper: usize) -> Vec<(usize, usize)> {
        let seen = Mutex::new(Vec::new());
        pool.run(
            |start, end| {
                seen.lock().unwrap().push((start, end));
                Ok::<_, Infallible>(())
            },
            lower,
            upper,
        )
        .unwrap();
        let mut seen = seen.into_inner().unwrap();
        seen.sort_unstable();
        seen
    }

    #[test]
    fn normalize_workers_clamps_non_positive() {
        assert_eq!(normalize_workers(-3), 1);
        assert_eq!(normalize_workers(0), 1);
        assert_eq!(normalize_workers(1), 1);
        assert_eq!(normalize_workers(6), 6);
    }

    #[test]
    fn zero_workers_still_runs_the_range() {
        let pool = WorkerPool::new(0).unwrap();
        assert_eq!(pool.num_workers(), 1);
        assert_eq!(recorded_ranges(&pool, 0, 5), vec![(0, 5)]);

        let name = Mutex::new(String::new());
        pool.run(
            |_, _| {
                *name.lock().unwrap() = std::thread::current().name().unwrap_or("").to_string();
                Ok::<_, Infallible>(())
            },
            0,
            5,
        )
        .unwrap();
        assert_eq!(name.into_inner().unwrap(), format!("{WORKER_THREAD_PREFIX}0"));
    }

    #[test]
    fn sub_range_i_runs_on_worker_i() {
        let pool = WorkerPool::new(4).unwrap();
        for _ in 0..50 {
            let seen = Mutex::new(Vec::new());
            pool.run(
                |start, end| {
                    let name = std::thread::current().name().unwrap_or("").to_string();
                    seen.lock().unwrap().push((start, end, name));
                    Ok::<_, Infallible>(())
                },
                0,
                8,
            )
            .unwrap();
            let mut seen = seen.into_inner().unwrap();
            seen.sort_unstable();
            let expected: Vec<(usize, usize, String)> = [(0, 2), (2, 4), (4, 6), (6, 8)]
                .into_iter()
                .enumerate()
                .map(|(i, (start, end))| (start, end, format!("{WORKER_THREAD_PREFIX}{i}")))
                .collect();
            assert_eq!(seen, expected);
        }
    }

    #[test]
    fn short_range_leaves_trailing_workers_idle() {
        let pool = WorkerPool::new(4).unwrap();
        let names = Mutex::new(Vec::new());
        pool.run(
            |_, _| {
                let name = std::thread::current().name().unwrap_or("").to_string();
                names.lock().unwrap().push(name);
                Ok::<_, Infallible>(())
            },
            10,
            12,
        )
        .unwrap();
        let mut names = names.into_inner().unwrap();
        names.sort_unstable();
        assert_eq!(
            names,
            vec![
                format!("{WORKER_THREAD_PREFIX}0"),
                format!("{WORKER_THREAD_PREFIX}1")
            ]
        );
    }

    #[test]
    fn even_division_across_four_workers() {
        let pool = WorkerPool::new(4).unwrap();
        assert_eq!(
            recorded_ranges(&pool, 0, 8),
            vec![(0, 2), (2, 4), (4, 6), (6, 8)]
        );
    }

    #[test]
    fn uneven_division_favours_earlier_workers() {
        let pool = WorkerPool::new(3).unwrap();
        assert_eq!(recorded_ranges(&pool, 0, 10), vec![(0, 4), (4, 7), (7, 10)]);
    }

    #[test]
    fn empty_range_never_calls_body() {
        let pool = WorkerPool::new(2).unwrap();
        let calls = AtomicUsize::new(0);
        pool.run(
            |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(())
            },
            5,
            5,
        )
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn body_runs_on_named_worker_threads() {
        let pool = WorkerPool::new(2).unwrap();
        let names = Mutex::new(Vec::new());
        pool.run(
            |_, _| {
                let name = std::thread::current().name().unwrap_or("").to_string();
                names.lock().unwrap().push(name);
                Ok::<_, Infallible>(())
            },
            0,
            2,
        )
        .unwrap();
        let names = names.into_inner().unwrap();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| n.starts_with(WORKER_THREAD_PREFIX)));
    }

    #[test]
    fn lowest_failing_sub_range_is_reported() {
        let pool = WorkerPool::new(4).unwrap();
        let err = pool
            .run(
                |start, _| if start >= 4 { Err(start) } else { Ok(()) },
                0,
                8,
            )
            .unwrap_err();
        assert_eq!(err.range(), Some(SubRange::new(4, 6)));
        assert_eq!(err.suppressed(), 1);
        assert!(matches!(err, ParallelError::Body { source: 4, .. }));
    }

    #[test]
    fn nested_dispatch_does_not_deadlock() {
        let pool = WorkerPool::new(2).unwrap();
        let total = AtomicUsize::new(0);
        pool.run(
            |start, end| {
                pool.run(
                    |s, e| {
                        total.fetch_add(e - s, Ordering::SeqCst);
                        Ok::<_, Infallible>(())
                    },
                    start * 10,
                    end * 10,
                )
            },
            0,
            4,
        )
        .unwrap();
        assert_eq!(total.load(Ordering::SeqCst), 40);
    }
}
