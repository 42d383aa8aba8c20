//! Run the same reduction once sequentially and once on the worker pool, then print timings and speedup.
//!
//! Usage: cargo run --release --bin benchmark_parallel_speedup [upper] [workers]

use std::convert::Infallible;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parloop::WorkerPool;
use tracing_subscriber::EnvFilter;

/// Deliberately non-trivial per-index work so dispatch overhead does not dominate.
fn weight(i: usize) -> u64 {
    let mut x = i as u64 ^ 0x9e37_79b9_7f4a_7c15;
    for _ in 0..64 {
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
    }
    x % 1_000
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let upper: usize = args.next().and_then(|v| v.parse().ok()).unwrap_or(2_000_000);
    let workers: i64 = args
        .next()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| parloop::config::global().num_worker_threads);

    let pool = match WorkerPool::new(workers) {
        Ok(pool) => pool,
        Err(err) => {
            eprintln!("failed to start worker pool: {err}");
            std::process::exit(1);
        }
    };
    println!("Reduction over [0, {upper}) with {} workers", pool.num_workers());
    println!();

    // Sequential
    let t0 = Instant::now();
    let seq_sum: u64 = (0..upper).map(weight).sum();
    let elapsed_seq = t0.elapsed();
    let seq_ms = elapsed_seq.as_secs_f64() * 1000.0;
    println!("Sequential:  {:.2} ms", seq_ms);

    // Parallel
    let total = AtomicU64::new(0);
    let t0 = Instant::now();
    let outcome = pool.run(
        |start, end| {
            let partial: u64 = (start..end).map(weight).sum();
            total.fetch_add(partial, Ordering::Relaxed);
            Ok::<_, Infallible>(())
        },
        0,
        upper,
    );
    let elapsed_par = t0.elapsed();
    if let Err(err) = outcome {
        eprintln!("parallel run failed: {err}");
        std::process::exit(1);
    }
    let par_ms = elapsed_par.as_secs_f64() * 1000.0;
    println!("Parallel:    {:.2} ms", par_ms);

    println!();
    println!("Speedup:     {:.2}x faster (parallel vs sequential)", seq_ms / par_ms);

    assert_eq!(seq_sum, total.into_inner(), "parallel sum mismatch");
    println!("(Results match sequential vs parallel)");
}
