//! dff-task: run one benchmark task and print its measurement.
//!
//! One invocation runs exactly one task:
//!
//! ```text
//! dff-task <task_name> <initial_capacity_log2> <element_count|dataset_path>
//! ```
//!
//! On success the process prints a single floating-point number on stdout
//! (seconds elapsed, a rate, or a bit count depending on the task) and exits
//! zero; any failure, including a false negative, exits non-zero. Progress
//! goes to stderr so stdout stays machine readable. The companion
//! `dff-benchmark` driver launches this binary repeatedly and aggregates
//! the samples.

use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{bail, ensure, Context};
use rand::Rng;
use tracing_subscriber::EnvFilter;

use dff::{dataset, DynamicFingerprintFilter, FilterKey, Status, VERSION};

type TaskFn = fn(&TaskArgs) -> anyhow::Result<f64>;

/// Registry of benchmark tasks. `*_fg` twins run the fingerprint-growth
/// variant of the same workload.
const TASKS: &[(&str, TaskFn)] = &[
    ("insert_throughput", insert_throughput::<false>),
    ("insert_throughput_fg", insert_throughput::<true>),
    ("positive_query", positive_query::<false>),
    ("positive_query_fg", positive_query::<true>),
    ("negative_query", negative_query::<false>),
    ("negative_query_fg", negative_query::<true>),
    ("remove_throughput", remove_throughput::<false>),
    ("remove_throughput_fg", remove_throughput::<true>),
    ("mixed_workload", mixed_workload::<false>),
    ("mixed_workload_fg", mixed_workload::<true>),
    ("false_positive_rate", false_positive_rate::<false>),
    ("false_positive_rate_fg", false_positive_rate::<true>),
    ("space_usage", space_usage::<false>),
    ("space_usage_fg", space_usage::<true>),
    ("expansion_time", expansion_time::<false>),
    ("expansion_time_fg", expansion_time::<true>),
    ("positive_addressing_time", positive_addressing_time::<false>),
    ("positive_addressing_time_fg", positive_addressing_time::<true>),
    ("negative_addressing_time", negative_addressing_time::<false>),
    ("negative_addressing_time_fg", negative_addressing_time::<true>),
    ("query_caida", query_caida::<false>),
    ("query_caida_fg", query_caida::<true>),
    ("query_ycsb", query_ycsb::<false>),
    ("query_ycsb_fg", query_ycsb::<true>),
];

/// Fingerprint width used by every task.
const TASK_BITS_PER_ITEM: usize = 16;

struct TaskArgs {
    /// log2 of the nominal initial capacity. Part of the harness contract;
    /// the filter's layout is compile-time, so tasks only validate it.
    #[allow(dead_code)]
    initial_capacity_log2: usize,
    /// Element count or dataset path, depending on the task.
    workload: String,
}

impl TaskArgs {
    fn count(&self) -> anyhow::Result<usize> {
        self.workload
            .parse()
            .with_context(|| format!("element count {:?} is not a number", self.workload))
    }

    fn path(&self) -> &Path {
        Path::new(&self.workload)
    }
}

fn random_keys(n: usize) -> Vec<u64> {
    let mut rng = rand::thread_rng();
    (0..n).map(|_| rng.gen()).collect()
}

fn new_filter<const GROWTH: bool>() -> anyhow::Result<DynamicFingerprintFilter<u64, GROWTH>> {
    Ok(DynamicFingerprintFilter::new(TASK_BITS_PER_ITEM)?)
}

fn insert_all<K: FilterKey, const GROWTH: bool>(
    filter: &mut DynamicFingerprintFilter<K, GROWTH>,
    keys: &[K],
) -> anyhow::Result<()> {
    for (i, key) in keys.iter().enumerate() {
        let status = filter.insert(key);
        ensure!(
            status == Status::Ok,
            "insert failed with {status:?} at index {i}/{}",
            keys.len() - 1
        );
    }
    Ok(())
}

fn query_all<K: FilterKey, const GROWTH: bool>(
    filter: &DynamicFingerprintFilter<K, GROWTH>,
    keys: &[K],
) -> anyhow::Result<()> {
    for (i, key) in keys.iter().enumerate() {
        let status = filter.query(key);
        ensure!(
            status == Status::Ok,
            "false negative at index {i}/{}",
            keys.len() - 1
        );
    }
    Ok(())
}

/// Time `n` inserts, then verify that none of them went missing.
fn insert_throughput<const GROWTH: bool>(args: &TaskArgs) -> anyhow::Result<f64> {
    let keys = random_keys(args.count()?);
    let mut filter = new_filter::<GROWTH>()?;

    let start = Instant::now();
    insert_all(&mut filter, &keys)?;
    let elapsed = start.elapsed();

    query_all(&filter, &keys)?;
    Ok(elapsed.as_secs_f64())
}

/// Time `n` queries for present keys.
fn positive_query<const GROWTH: bool>(args: &TaskArgs) -> anyhow::Result<f64> {
    let keys = random_keys(args.count()?);
    let mut filter = new_filter::<GROWTH>()?;
    insert_all(&mut filter, &keys)?;

    let start = Instant::now();
    query_all(&filter, &keys)?;
    Ok(start.elapsed().as_secs_f64())
}

/// Time `n` queries for keys that were never inserted.
fn negative_query<const GROWTH: bool>(args: &TaskArgs) -> anyhow::Result<f64> {
    let n = args.count()?;
    let keys = random_keys(2 * n);
    let (present, absent) = keys.split_at(n);

    let mut filter = new_filter::<GROWTH>()?;
    insert_all(&mut filter, present)?;

    let start = Instant::now();
    let mut positives = 0usize;
    for key in absent {
        if filter.query(key) == Status::Ok {
            positives += 1;
        }
    }
    let elapsed = start.elapsed();

    tracing::debug!(positives, n, "negative query pass finished");
    Ok(elapsed.as_secs_f64())
}

/// Time `n` removes of present keys.
fn remove_throughput<const GROWTH: bool>(args: &TaskArgs) -> anyhow::Result<f64> {
    let keys = random_keys(args.count()?);
    let mut filter = new_filter::<GROWTH>()?;
    insert_all(&mut filter, &keys)?;

    let start = Instant::now();
    for (i, key) in keys.iter().enumerate() {
        let status = filter.remove(key);
        ensure!(
            status == Status::Ok,
            "remove failed with {status:?} at index {i}/{}",
            keys.len() - 1
        );
    }
    Ok(start.elapsed().as_secs_f64())
}

/// Interleaved workload: every insert is followed by queries of the three
/// most recent keys, and the first tenth of the keys is removed at the end.
fn mixed_workload<const GROWTH: bool>(args: &TaskArgs) -> anyhow::Result<f64> {
    let keys = random_keys(args.count()?);
    let mut filter = new_filter::<GROWTH>()?;

    let start = Instant::now();
    for (i, key) in keys.iter().enumerate() {
        let status = filter.insert(key);
        ensure!(status == Status::Ok, "insert failed with {status:?} at index {i}");
        if i > 3 {
            for back in 0..3 {
                let probe = &keys[i - back];
                ensure!(
                    filter.query(probe) == Status::Ok,
                    "false negative at index {}",
                    i - back
                );
            }
        }
    }
    for (i, key) in keys.iter().take(keys.len() / 10).enumerate() {
        let status = filter.remove(key);
        ensure!(status == Status::Ok, "remove failed with {status:?} at index {i}");
    }
    Ok(start.elapsed().as_secs_f64())
}

/// Fraction of never-inserted keys reported present.
fn false_positive_rate<const GROWTH: bool>(args: &TaskArgs) -> anyhow::Result<f64> {
    let n = args.count()?;
    let keys = random_keys(2 * n);
    let (present, absent) = keys.split_at(n);

    let mut filter = new_filter::<GROWTH>()?;
    insert_all(&mut filter, present)?;

    let positives = absent
        .iter()
        .filter(|&key| filter.query(key) == Status::Ok)
        .count();
    Ok(positives as f64 / n as f64)
}

/// Logical table size in bits after `n` inserts.
fn space_usage<const GROWTH: bool>(args: &TaskArgs) -> anyhow::Result<f64> {
    let keys = random_keys(args.count()?);
    let mut filter = new_filter::<GROWTH>()?;
    insert_all(&mut filter, &keys)?;
    Ok(filter.stats().table_bits as f64)
}

/// Cumulative seconds spent splitting segments while inserting `n` keys.
fn expansion_time<const GROWTH: bool>(args: &TaskArgs) -> anyhow::Result<f64> {
    let keys = random_keys(args.count()?);
    let mut filter = new_filter::<GROWTH>()?;
    insert_all(&mut filter, &keys)?;
    Ok(filter.stats().expansion_time.as_secs_f64())
}

/// Cumulative seconds spent hashing and addressing across `n` positive
/// queries.
fn positive_addressing_time<const GROWTH: bool>(args: &TaskArgs) -> anyhow::Result<f64> {
    let keys = random_keys(args.count()?);
    let mut filter = new_filter::<GROWTH>()?;
    insert_all(&mut filter, &keys)?;

    filter.enable_addressing_timer();
    query_all(&filter, &keys)?;
    Ok(filter.stats().addressing_time.as_secs_f64())
}

/// Cumulative seconds spent hashing and addressing across `n` queries for
/// keys that were never inserted. The pass must see at least one false
/// positive at these scales.
fn negative_addressing_time<const GROWTH: bool>(args: &TaskArgs) -> anyhow::Result<f64> {
    let n = args.count()?;
    let keys = random_keys(2 * n);
    let (present, absent) = keys.split_at(n);

    let mut filter = new_filter::<GROWTH>()?;
    insert_all(&mut filter, present)?;
    query_all(&filter, present)?;

    filter.enable_addressing_timer();
    let positives = absent
        .iter()
        .filter(|&key| filter.query(key) == Status::Ok)
        .count();
    ensure!(positives > 0, "expected some false positives, found none");

    Ok(filter.stats().addressing_time.as_secs_f64())
}

/// CAIDA trace: insert every packet key, then time positive queries.
fn query_caida<const GROWTH: bool>(args: &TaskArgs) -> anyhow::Result<f64> {
    let keys = dataset::read_caida(args.path())
        .with_context(|| format!("loading {}", args.path().display()))?;
    ensure!(!keys.is_empty(), "dataset is empty");

    let mut filter = new_filter::<GROWTH>()?;
    insert_all(&mut filter, &keys)?;

    let start = Instant::now();
    query_all(&filter, &keys)?;
    Ok(start.elapsed().as_secs_f64())
}

/// YCSB workload: insert every line as a string key, then time positive
/// queries.
fn query_ycsb<const GROWTH: bool>(args: &TaskArgs) -> anyhow::Result<f64> {
    let lines = dataset::read_ycsb(args.path())
        .with_context(|| format!("loading {}", args.path().display()))?;
    ensure!(!lines.is_empty(), "dataset is empty");

    let mut filter: DynamicFingerprintFilter<String, GROWTH> =
        DynamicFingerprintFilter::new(TASK_BITS_PER_ITEM)?;
    insert_all(&mut filter, &lines)?;

    let start = Instant::now();
    query_all(&filter, &lines)?;
    Ok(start.elapsed().as_secs_f64())
}

fn usage(program: &str) -> String {
    let names: Vec<&str> = TASKS.iter().map(|(name, _)| *name).collect();
    format!(
        "Usage: {program} <task> <initial_capacity_log2> <element_count|dataset_path>\n\
         Tasks: {}",
        names.join(", ")
    )
}

fn run(args: &[String]) -> anyhow::Result<f64> {
    ensure!(args.len() >= 4, "{}", usage(&args[0]));

    let name = args[1].as_str();
    let Some(&(_, task)) = TASKS.iter().find(|(task_name, _)| *task_name == name) else {
        bail!("unknown task {name:?}\n{}", usage(&args[0]));
    };

    let initial_capacity_log2: usize = args[2]
        .parse()
        .with_context(|| format!("initial_capacity_log2 {:?} is not a number", args[2]))?;
    ensure!(
        initial_capacity_log2 < 64,
        "initial_capacity_log2 {initial_capacity_log2} is out of range"
    );

    let task_args = TaskArgs {
        initial_capacity_log2,
        workload: args[3].clone(),
    };
    task(&task_args)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        eprintln!("{}", usage(&args[0]));
        return ExitCode::SUCCESS;
    }
    if args.iter().any(|arg| arg == "--version") {
        eprintln!("dff-task {VERSION}");
        return ExitCode::SUCCESS;
    }

    match run(&args) {
        Ok(value) => {
            println!("{value}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
