use std::fmt;
use std::sync::Mutex;

use serde::Serialize;

use crate::config;
use crate::parallel::{global_pool, run_parallel, sub_ranges, SubRange};

const USAGE: &str = "usage: parloop <config|partition <lower> <upper> <workers>|sum <lower> <upper>>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Config,
    Partition,
    Sum,
}

pub fn parse_command(args: &[String]) -> Option<Command> {
    match args.get(1).map(String::as_str) {
        Some("config") => Some(Command::Config),
        Some("partition") => Some(Command::Partition),
        Some("sum") => Some(Command::Sum),
        _ => None,
    }
}

pub fn run_with_args(args: &[String]) -> i32 {
    match parse_command(args) {
        Some(Command::Config) => handle_config(),
        Some(Command::Partition) => handle_partition(args),
        Some(Command::Sum) => handle_sum(args),
        None => {
            eprintln!("{USAGE}");
            2
        }
    }
}

#[derive(Debug, Serialize)]
struct SumReport {
    lower: usize,
    upper: usize,
    workers: usize,
    sum: u64,
}

#[derive(Debug)]
struct SumOverflow {
    range: SubRange,
}

impl fmt::Display for SumOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sum overflows u64 within [{}, {})",
            self.range.start, self.range.end
        )
    }
}

impl std::error::Error for SumOverflow {}

fn handle_config() -> i32 {
    print_json(&config::global())
}

fn handle_partition(args: &[String]) -> i32 {
    let (Some(lower), Some(upper), Some(workers)) = (
        parse_usize_arg(args.get(2), "lower"),
        parse_usize_arg(args.get(3), "upper"),
        parse_usize_arg(args.get(4), "workers"),
    ) else {
        eprintln!("usage: parloop partition <lower> <upper> <workers>");
        return 2;
    };
    print_json(&sub_ranges(lower, upper, workers))
}

fn handle_sum(args: &[String]) -> i32 {
    let (Some(lower), Some(upper)) = (
        parse_usize_arg(args.get(2), "lower"),
        parse_usize_arg(args.get(3), "upper"),
    ) else {
        eprintln!("usage: parloop sum <lower> <upper>");
        return 2;
    };

    let total = Mutex::new(0u64);
    let outcome = run_parallel(
        |start, end| -> Result<(), SumOverflow> {
            let range = SubRange::new(start, end);
            let partial = (start..end)
                .try_fold(0u64, |acc, i| acc.checked_add(i as u64))
                .ok_or(SumOverflow { range })?;
            let mut sum = total.lock().unwrap_or_else(|e| e.into_inner());
            *sum = sum.checked_add(partial).ok_or(SumOverflow { range })?;
            Ok(())
        },
        lower,
        upper,
    );
    if let Err(err) = outcome {
        eprintln!("sum failed: {err}");
        return 1;
    }

    let workers = match global_pool() {
        Ok(pool) => pool.num_workers(),
        Err(err) => {
            eprintln!("sum failed: {err}");
            return 1;
        }
    };
    let sum = total.into_inner().unwrap_or_else(|e| e.into_inner());
    print_json(&SumReport {
        lower,
        upper,
        workers,
        sum,
    })
}

fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(payload) => {
            println!("{payload}");
            0
        }
        Err(err) => {
            eprintln!("failed to serialize output: {err}");
            1
        }
    }
}

fn parse_usize_arg(raw: Option<&String>, name: &str) -> Option<usize> {
    let value = raw?;
    let parsed = value.parse::<usize>().ok();
    if parsed.is_none() {
        eprintln!("invalid {name} '{value}'");
    }
    parsed
}
